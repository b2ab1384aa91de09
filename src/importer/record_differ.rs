// ==========================================
// 物料主数据同步系统 - 记录比对/校验器
// ==========================================
// 职责: 上传行 → 增强记录 (ParsedRecord)
// 每行顺序: 结构校验 → 批内重名 → 现存物料比对 → 分类解析 → 用途分类
// 红线: 校验从不抛错，失败全部写入 validation_errors
// 红线: 一行输入对应一条输出，保持顺序与行号
// ==========================================

use crate::domain::item::{ItemRecord, ItemUploadRow, ParsedRecord, RawRecord};
use crate::domain::types::{RecordAction, RuleStage};
use crate::importer::error::ImportResult;
use crate::importer::field_mapper::FieldMapper;
use crate::importer::reference_resolver::ReferenceResolver;
use crate::importer::usage_classifier::{validate_category_usage_type_logic, UsageClassifier};
use crate::repository::master_data_repo::{CategoryRepository, ItemRepository};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 名称比较键（大小写、首尾空白不敏感）
fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// 解析非负数值字段
fn parse_non_negative(field: &str, value: Option<&str>, errors: &mut Vec<String>) -> Option<f64> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Some(v),
        Ok(_) => {
            errors.push(format!("{} 必须为非负数: {}", field, raw));
            None
        }
        Err(_) => {
            errors.push(format!("{} 必须为数字: {}", field, raw));
            None
        }
    }
}

/// 现存物料查询结果（按名称键）
type ExistingLookup = Result<HashMap<String, ItemRecord>, String>;

// ==========================================
// RecordDiffer
// ==========================================
pub struct RecordDiffer<I>
where
    I: ItemRepository + ?Sized,
{
    item_repo: Arc<I>,
    classifier: UsageClassifier,
    field_mapper: FieldMapper,
}

impl<I> RecordDiffer<I>
where
    I: ItemRepository + ?Sized,
{
    pub fn new(item_repo: Arc<I>) -> Self {
        Self {
            item_repo,
            classifier: UsageClassifier::new(),
            field_mapper: FieldMapper,
        }
    }

    /// 替换分类器（例如使用配置中的兜底类型）
    pub fn with_classifier(mut self, classifier: UsageClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// 一次性查询现存物料；失败转为文本，由每行记录
    async fn lookup_existing(&self, names: Vec<String>) -> ExistingLookup {
        if names.is_empty() {
            return Ok(HashMap::new());
        }

        match self.item_repo.find_items_by_names(&names).await {
            Ok(items) => Ok(items
                .into_iter()
                .map(|item| (name_key(&item.item_name), item))
                .collect()),
            Err(e) => {
                warn!(error = %e, "现存物料查询失败");
                Err(format!("现存物料查询失败: {}", e))
            }
        }
    }

    /// 校验整批原始行
    ///
    /// # 返回
    /// - Ok(records): 与输入一一对应
    /// - Err(NotInitialized): 解析器未初始化（唯一的致命错误）
    #[instrument(skip(self, resolver, rows), fields(rows = rows.len()))]
    pub async fn validate_batch<C>(
        &self,
        resolver: &ReferenceResolver<C>,
        rows: &[RawRecord],
    ) -> ImportResult<Vec<ParsedRecord>>
    where
        C: CategoryRepository + ?Sized,
    {
        // 先确认解析器可用，避免无谓查询
        resolver.ensure_initialized()?;

        let mapped: Vec<(usize, ItemUploadRow)> = rows
            .iter()
            .map(|row| (row.row_number, self.field_mapper.map_to_item_row(row)))
            .collect();

        let mut names: Vec<String> = Vec::new();
        for (_, data) in &mapped {
            if let Some(name) = data.item_name.as_deref() {
                if !names.iter().any(|n| name_key(n) == name_key(name)) {
                    names.push(name.trim().to_string());
                }
            }
        }
        let existing = self.lookup_existing(names).await;

        let mut first_seen: HashMap<String, usize> = HashMap::new();
        let mut records = Vec::with_capacity(mapped.len());

        for (row_number, data) in mapped {
            let duplicate_of = match data.item_name.as_deref() {
                Some(name) => {
                    let key = name_key(name);
                    match first_seen.get(&key) {
                        Some(first) => Some(*first),
                        None => {
                            first_seen.insert(key, row_number);
                            None
                        }
                    }
                }
                None => None,
            };

            let record = self.enrich(resolver, row_number, data, &existing, duplicate_of)?;
            if !record.can_process {
                debug!(row_number = row_number, errors = ?record.validation_errors, "行校验未通过");
            }
            records.push(record);
        }

        let invalid = records.iter().filter(|r| !r.can_process).count();
        info!(total = records.len(), invalid = invalid, "批次校验完成");
        Ok(records)
    }

    /// 人工修正单行后重新增强
    ///
    /// 保留原 row_number 与原始数据，修正值写入 corrected_data；
    /// batch 为同批次全部记录，修正后的名称与其他可处理行重名时记为重复
    pub async fn apply_correction<C>(
        &self,
        resolver: &ReferenceResolver<C>,
        record: &ParsedRecord,
        corrected: ItemUploadRow,
        batch: &[ParsedRecord],
    ) -> ImportResult<ParsedRecord>
    where
        C: CategoryRepository + ?Sized,
    {
        resolver.ensure_initialized()?;

        let duplicate_of = corrected.item_name.as_deref().and_then(|name| {
            let key = name_key(name);
            batch
                .iter()
                .filter(|other| other.row_number != record.row_number && other.can_process)
                .filter(|other| name_key(other.item_name()) == key)
                .map(|other| other.row_number)
                .min()
        });

        let names: Vec<String> = corrected
            .item_name
            .iter()
            .map(|n| n.trim().to_string())
            .collect();
        let existing = self.lookup_existing(names).await;

        let mut enriched =
            self.enrich(resolver, record.row_number, corrected, &existing, duplicate_of)?;
        enriched.corrected_data = Some(enriched.data.clone());
        enriched.data = record.data.clone();

        debug!(
            row_number = enriched.row_number,
            can_process = enriched.can_process,
            "修正后重新校验"
        );
        Ok(enriched)
    }

    /// 单行增强
    fn enrich<C>(
        &self,
        resolver: &ReferenceResolver<C>,
        row_number: usize,
        data: ItemUploadRow,
        existing: &ExistingLookup,
        duplicate_of: Option<usize>,
    ) -> ImportResult<ParsedRecord>
    where
        C: CategoryRepository + ?Sized,
    {
        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        // === 1. 结构校验 ===
        if data.item_name.is_none() {
            errors.push("缺少物料名称 (item_name)".to_string());
        }
        if data.category_name.is_none() {
            errors.push("缺少分类名称 (category_name)".to_string());
        }
        let gsm = parse_non_negative("gsm", data.gsm.as_deref(), &mut errors);
        let size_mm = parse_non_negative("size_mm", data.size_mm.as_deref(), &mut errors);

        // === 2. 批内重名 ===
        if let Some(first) = duplicate_of {
            errors.push(format!(
                "物料名称与第 {} 行重复: {}",
                first,
                data.item_name.as_deref().unwrap_or("")
            ));
        }

        // === 3. 现存物料比对 ===
        let existing_item = match (existing, data.item_name.as_deref()) {
            (Ok(items), Some(name)) => items.get(&name_key(name)).cloned(),
            (Err(message), _) => {
                errors.push(message.clone());
                None
            }
            _ => None,
        };
        let action = if existing_item.is_some() {
            RecordAction::Update
        } else {
            RecordAction::Insert
        };

        // === 4. 分类解析 ===
        let mut category_error = false;
        let category_id = match data.category_name.as_deref() {
            Some(name) => {
                let resolved = resolver.resolve_category_id(name)?;
                if resolved.is_none() {
                    category_error = true;
                    errors.push(format!("分类未找到: {}", name));
                }
                resolved
            }
            None => None,
        };

        // === 5. 用途分类 ===
        let classification = self.classifier.classify_detailed(
            data.usage_type.as_deref().unwrap_or(""),
            data.category_name.as_deref(),
            data.item_name.as_deref(),
        );
        if let Some(category_name) = data.category_name.as_deref() {
            if let Some(warning) = validate_category_usage_type_logic(
                category_name,
                classification.usage_type,
                data.item_name.as_deref(),
            ) {
                warn!(row_number = row_number, warning = %warning, "分类与用途类型不一致");
                warnings.push(warning);
            }
        }
        if classification.stage == RuleStage::Fallback {
            warnings.push(format!(
                "未命中任何分类规则，用途类型按兜底值 {} 处理",
                classification.usage_type
            ));
        }

        Ok(ParsedRecord {
            row_number,
            data,
            corrected_data: None,
            action,
            existing_item,
            category_id,
            usage_type: classification.usage_type,
            classified_by: classification.stage,
            gsm,
            size_mm,
            can_process: errors.is_empty(),
            validation_errors: errors,
            warnings,
            category_error,
        })
    }
}
