// ==========================================
// 物料主数据同步系统 - 物料上传流程
// ==========================================
// 职责: 整合上传流程，从文件到记录库
// 流程: 解析 → 映射 → 分类解析 → 比对/校验 → (人工修正) → 批处理写入
// 红线: prepare 不写入；commit 只处理 can_process 记录
// ==========================================

use crate::config::ImportConfigReader;
use crate::domain::item::{BatchOutcome, ItemUploadRow, ParsedRecord, RawRecord, UpsertSummary};
use crate::importer::batch_processor::{BatchProcessor, ItemStore};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::FieldMapper;
use crate::importer::file_parser::{FileParser, UniversalFileParser};
use crate::importer::progress::ProgressSink;
use crate::importer::record_differ::RecordDiffer;
use crate::importer::reference_resolver::ReferenceResolver;
use crate::importer::usage_classifier::UsageClassifier;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// 上传预览（未写入）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadPreview {
    pub records: Vec<ParsedRecord>,
    pub unmapped_categories: Vec<String>,
    pub summary: UpsertSummary,
}

impl UploadPreview {
    pub fn processable(&self) -> Vec<ParsedRecord> {
        self.records.iter().filter(|r| r.can_process).cloned().collect()
    }
}

/// 提交结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadCommit {
    pub outcome: BatchOutcome,
    pub summary: UpsertSummary,
}

// ==========================================
// ItemUploadPipeline
// ==========================================
pub struct ItemUploadPipeline<R>
where
    R: ItemStore + ?Sized,
{
    file_parser: Box<dyn FileParser>,
    field_mapper: FieldMapper,
    resolver: ReferenceResolver<R>,
    differ: RecordDiffer<R>,
    processor: BatchProcessor<R>,
}

impl<R> ItemUploadPipeline<R>
where
    R: ItemStore + ?Sized,
{
    /// 使用默认解析器与默认分类器
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            file_parser: Box::new(UniversalFileParser),
            field_mapper: FieldMapper,
            resolver: ReferenceResolver::new(repo.clone()),
            differ: RecordDiffer::new(repo.clone()),
            processor: BatchProcessor::new(repo),
        }
    }

    /// 按配置构建（兜底用途类型）
    pub async fn from_config<C>(repo: Arc<R>, config: &C) -> ImportResult<Self>
    where
        C: ImportConfigReader + ?Sized,
    {
        let fallback = config
            .get_fallback_usage_type()
            .await
            .map_err(|e| ImportError::ConfigReadError(e.to_string()))?;
        debug!(fallback = %fallback, "分类兜底用途类型");

        Ok(Self::new(repo).with_classifier(UsageClassifier::new().with_fallback(fallback)))
    }

    pub fn with_parser(mut self, file_parser: Box<dyn FileParser>) -> Self {
        self.file_parser = file_parser;
        self
    }

    pub fn with_classifier(mut self, classifier: UsageClassifier) -> Self {
        self.differ = self.differ.with_classifier(classifier);
        self
    }

    /// 加载参考数据（幂等）
    pub async fn initialize(&mut self) -> ImportResult<()> {
        self.resolver.initialize().await?;
        self.processor.initialize().await?;
        Ok(())
    }

    /// 解析文件并生成预览
    #[instrument(skip(self, file_path))]
    pub async fn prepare(&mut self, file_path: &Path) -> ImportResult<UploadPreview> {
        let start_time = Instant::now();
        info!(file_path = %file_path.display(), "开始物料上传预处理");

        // === 步骤 1: 解析文件 ===
        debug!("步骤 1: 解析文件");
        let raw_records = self
            .file_parser
            .parse_to_raw_records(file_path)
            .map_err(|e| {
                error!(error = %e, "文件解析失败");
                e
            })?;
        info!(total_rows = raw_records.len(), "文件解析完成");

        let preview = self.prepare_records(&raw_records).await?;

        info!(
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "物料上传预处理完成"
        );
        Ok(preview)
    }

    /// 从已解析的原始行生成预览
    pub async fn prepare_records(&mut self, raw_records: &[RawRecord]) -> ImportResult<UploadPreview> {
        // === 步骤 2: 加载参考数据 ===
        debug!("步骤 2: 加载参考数据");
        self.initialize().await?;

        // === 步骤 3: 未映射分类（写入前提前反馈）===
        debug!("步骤 3: 检查未映射分类");
        let mut category_names: Vec<String> = Vec::new();
        for raw in raw_records {
            if let Some(name) = self.field_mapper.map_to_item_row(raw).category_name {
                if !category_names.contains(&name) {
                    category_names.push(name);
                }
            }
        }
        let unmapped_categories = self.resolver.get_unmapped_categories(&category_names)?;

        // === 步骤 4: 比对/校验 ===
        debug!("步骤 4: 比对/校验");
        let records = self.differ.validate_batch(&self.resolver, raw_records).await?;
        let summary = UpsertSummary::from_records(&records);

        info!(
            total = summary.total,
            inserts = summary.inserts,
            updates = summary.updates,
            validation_errors = summary.validation_errors,
            unmapped_categories = unmapped_categories.len(),
            "上传预览生成完成"
        );

        Ok(UploadPreview {
            records,
            unmapped_categories,
            summary,
        })
    }

    /// 人工修正预览中的某一行（按 row_number）
    pub async fn apply_correction(
        &self,
        preview: &mut UploadPreview,
        row_number: usize,
        corrected: ItemUploadRow,
    ) -> ImportResult<()> {
        let index = preview
            .records
            .iter()
            .position(|r| r.row_number == row_number)
            .ok_or_else(|| ImportError::InternalError(format!("预览中不存在第 {} 行", row_number)))?;

        let updated = self
            .differ
            .apply_correction(
                &self.resolver,
                &preview.records[index],
                corrected,
                &preview.records,
            )
            .await?;
        preview.records[index] = updated;
        preview.summary = UpsertSummary::from_records(&preview.records);
        Ok(())
    }

    /// 写入可处理记录
    #[instrument(skip(self, preview, sink))]
    pub async fn commit<S>(&self, preview: &UploadPreview, sink: &mut S) -> ImportResult<UploadCommit>
    where
        S: ProgressSink + ?Sized,
    {
        // === 步骤 5: 批处理写入 ===
        let processable = preview.processable();
        info!(
            processable = processable.len(),
            skipped = preview.records.len() - processable.len(),
            "开始写入物料"
        );

        let outcome = self.processor.process_records(&processable, sink).await?;

        let mut summary = preview.summary.clone();
        for _ in 0..outcome.success {
            summary.record_outcome(true);
        }
        for _ in 0..outcome.errors.len() {
            summary.record_outcome(false);
        }

        info!(
            processed = summary.processed,
            errors = summary.errors,
            "物料写入完成"
        );
        Ok(UploadCommit { outcome, summary })
    }
}
