// ==========================================
// 物料主数据同步系统 - 批处理器
// ==========================================
// 职责: 逐行写入可处理记录（INSERT 生成编码 / UPDATE 按现存编码）
// 红线: 单行失败只记录为 "Row N: 错误"，不中断批次
// 红线: 每行写入前发出一次进度事件；行与行严格顺序执行
// ==========================================

use crate::domain::item::{BatchOutcome, ItemCodeRequest, ParsedRecord};
use crate::domain::types::{ProgressStage, RecordAction};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::progress::{ProgressEvent, ProgressSink};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::master_data_repo::{CategoryRepository, ItemCodeGenerator, ItemRepository};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 批处理器所需的记录库能力
pub trait ItemStore: CategoryRepository + ItemRepository + ItemCodeGenerator {}

impl<T> ItemStore for T where T: CategoryRepository + ItemRepository + ItemCodeGenerator + ?Sized {}

pub struct BatchProcessor<R>
where
    R: ItemStore + ?Sized,
{
    repo: Arc<R>,
    // category_id → category_name（编码生成使用）
    category_names: Option<HashMap<String, String>>,
}

impl<R> BatchProcessor<R>
where
    R: ItemStore + ?Sized,
{
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            category_names: None,
        }
    }

    /// 加载分类名（幂等）
    pub async fn initialize(&mut self) -> ImportResult<()> {
        if self.category_names.is_some() {
            return Ok(());
        }

        let categories = self
            .repo
            .list_active_categories()
            .await
            .map_err(|e| ImportError::InitializationError(format!("加载分类失败: {}", e)))?;

        self.category_names = Some(
            categories
                .into_iter()
                .map(|c| (c.id, c.category_name))
                .collect(),
        );
        debug!("BatchProcessor 初始化完成");
        Ok(())
    }

    /// 逐行处理记录
    ///
    /// 调用方应先过滤 can_process；混入的不可处理记录按失败计入
    ///
    /// # 返回
    /// - Ok(outcome): success + errors.len() == records.len()
    /// - Err(NotInitialized): 未调用 initialize()
    #[instrument(skip(self, records, sink), fields(total = records.len()))]
    pub async fn process_records<S>(
        &self,
        records: &[ParsedRecord],
        sink: &mut S,
    ) -> ImportResult<BatchOutcome>
    where
        S: ProgressSink + ?Sized,
    {
        let category_names = self
            .category_names
            .as_ref()
            .ok_or_else(|| ImportError::NotInitialized {
                component: "BatchProcessor".to_string(),
            })?;

        let total = records.len();
        let mut outcome = BatchOutcome::default();

        for (idx, record) in records.iter().enumerate() {
            sink.on_progress(&ProgressEvent {
                current: idx + 1,
                total,
                stage: ProgressStage::Processing,
                current_record: Some(record.item_name().to_string()),
            });

            match self.process_one(record, category_names).await {
                Ok(generated) => {
                    outcome.success += 1;
                    if let Some(code) = generated {
                        debug!(row_number = record.row_number, item_code = %code, "新物料已写入");
                        outcome.generated_codes.push((record.row_number, code));
                    }
                }
                Err(e) => {
                    warn!(row_number = record.row_number, error = %e, "行写入失败");
                    outcome.errors.push(format!("Row {}: {}", record.row_number, e));
                }
            }
        }

        info!(
            success = outcome.success,
            errors = outcome.errors.len(),
            "批处理完成"
        );
        Ok(outcome)
    }

    /// 单行写入，INSERT 时返回新编码
    async fn process_one(
        &self,
        record: &ParsedRecord,
        category_names: &HashMap<String, String>,
    ) -> RepositoryResult<Option<String>> {
        if !record.can_process {
            return Err(RepositoryError::ValidationError(format!(
                "记录未通过校验: {}",
                record.validation_errors.join("; ")
            )));
        }

        let fields = record.to_item_fields().ok_or_else(|| {
            RepositoryError::ValidationError("缺少物料名称或分类".to_string())
        })?;

        match record.action {
            RecordAction::Insert => {
                let category_name = category_names
                    .get(&fields.category_id)
                    .cloned()
                    .or_else(|| record.effective_data().category_name.clone())
                    .unwrap_or_default();

                let request = ItemCodeRequest {
                    category_name,
                    qualifier: fields.qualifier.clone(),
                    size_mm: fields.size_mm,
                    gsm: fields.gsm,
                };
                let item_code = self.repo.generate_item_code(&request).await?;
                self.repo.insert_item(&item_code, &fields).await?;
                Ok(Some(item_code))
            }
            RecordAction::Update => {
                let item_code = record
                    .existing_item
                    .as_ref()
                    .map(|item| item.item_code.clone())
                    .ok_or_else(|| {
                        RepositoryError::ValidationError("UPDATE 记录缺少现存物料".to_string())
                    })?;
                self.repo.update_item(&item_code, &fields).await?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::item::{CategoryRecord, ItemFields, ItemRecord, ItemUploadRow};
    use crate::domain::types::{RuleStage, UsageType};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        fail_on: Option<String>,
        writes: Mutex<Vec<String>>,
        code_requests: Mutex<Vec<ItemCodeRequest>>,
    }

    #[async_trait]
    impl CategoryRepository for FakeStore {
        async fn list_active_categories(&self) -> RepositoryResult<Vec<CategoryRecord>> {
            Ok(vec![CategoryRecord {
                id: "cat-raw".to_string(),
                category_name: "Raw Materials".to_string(),
            }])
        }
    }

    #[async_trait]
    impl ItemRepository for FakeStore {
        async fn find_items_by_names(&self, _names: &[String]) -> RepositoryResult<Vec<ItemRecord>> {
            Ok(vec![])
        }

        async fn insert_item(&self, item_code: &str, fields: &ItemFields) -> RepositoryResult<()> {
            if self.fail_on.as_deref() == Some(fields.item_name.as_str()) {
                return Err(RepositoryError::UniqueConstraintViolation(
                    "item_master.item_name".to_string(),
                ));
            }
            self.writes
                .lock()
                .unwrap()
                .push(format!("insert {} {}", item_code, fields.item_name));
            Ok(())
        }

        async fn update_item(&self, item_code: &str, fields: &ItemFields) -> RepositoryResult<()> {
            self.writes
                .lock()
                .unwrap()
                .push(format!("update {} {}", item_code, fields.item_name));
            Ok(())
        }
    }

    #[async_trait]
    impl ItemCodeGenerator for FakeStore {
        async fn generate_item_code(&self, request: &ItemCodeRequest) -> RepositoryResult<String> {
            let mut requests = self.code_requests.lock().unwrap();
            requests.push(request.clone());
            Ok(format!("RAW-{:04}", requests.len()))
        }
    }

    fn record(row_number: usize, name: &str, action: RecordAction) -> ParsedRecord {
        let existing_item = match action {
            RecordAction::Update => Some(ItemRecord {
                item_code: format!("OLD-{}", row_number),
                item_name: name.to_string(),
                category_id: Some("cat-raw".to_string()),
                qualifier: None,
                gsm: None,
                size_mm: None,
                uom: None,
                usage_type: UsageType::RawMaterial,
                specifications: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }),
            RecordAction::Insert => None,
        };

        ParsedRecord {
            row_number,
            data: ItemUploadRow {
                item_name: Some(name.to_string()),
                category_name: Some("raw materials".to_string()),
                qualifier: Some("PET".to_string()),
                ..Default::default()
            },
            corrected_data: None,
            action,
            existing_item,
            category_id: Some("cat-raw".to_string()),
            usage_type: UsageType::RawMaterial,
            classified_by: RuleStage::Category,
            gsm: Some(12.0),
            size_mm: Some(1000.0),
            validation_errors: vec![],
            warnings: vec![],
            category_error: false,
            can_process: true,
        }
    }

    async fn processor(store: Arc<FakeStore>) -> BatchProcessor<FakeStore> {
        let mut processor = BatchProcessor::new(store);
        processor.initialize().await.unwrap();
        processor
    }

    #[tokio::test]
    async fn test_process_requires_initialize() {
        let processor = BatchProcessor::new(Arc::new(FakeStore::default()));
        let mut sink = |_: &ProgressEvent| {};
        let result = processor.process_records(&[], &mut sink).await;
        assert!(matches!(result, Err(ImportError::NotInitialized { .. })));
    }

    #[tokio::test]
    async fn test_failure_in_middle_row_is_isolated() {
        let store = Arc::new(FakeStore {
            fail_on: Some("B".to_string()),
            ..Default::default()
        });
        let processor = processor(store.clone()).await;
        let records = vec![
            record(1, "A", RecordAction::Insert),
            record(2, "B", RecordAction::Insert),
            record(3, "C", RecordAction::Update),
        ];

        let mut events = Vec::new();
        let mut sink = |e: &ProgressEvent| events.push(e.clone());
        let outcome = processor.process_records(&records, &mut sink).await.unwrap();

        assert_eq!(outcome.success, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("Row 2: "));
        assert_eq!(
            *store.writes.lock().unwrap(),
            vec!["insert RAW-0001 A".to_string(), "update OLD-3 C".to_string()]
        );

        // 每行一次事件，写入前发出
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].current, 2);
        assert_eq!(events[1].total, 3);
        assert_eq!(events[1].stage, ProgressStage::Processing);
        assert_eq!(events[1].current_record.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn test_code_request_uses_loaded_category_name() {
        let store = Arc::new(FakeStore::default());
        let processor = processor(store.clone()).await;
        let mut sink = |_: &ProgressEvent| {};

        let outcome = processor
            .process_records(&[record(7, "A", RecordAction::Insert)], &mut sink)
            .await
            .unwrap();

        assert_eq!(outcome.generated_codes, vec![(7, "RAW-0001".to_string())]);
        let requests = store.code_requests.lock().unwrap();
        assert_eq!(requests[0].category_name, "Raw Materials");
        assert_eq!(requests[0].qualifier.as_deref(), Some("PET"));
        assert_eq!(requests[0].size_mm, Some(1000.0));
        assert_eq!(requests[0].gsm, Some(12.0));
    }

    #[tokio::test]
    async fn test_every_record_accounted_for() {
        let store = Arc::new(FakeStore {
            fail_on: Some("X3".to_string()),
            ..Default::default()
        });
        let processor = processor(store).await;

        let mut records: Vec<ParsedRecord> = (1..=6)
            .map(|i| record(i, &format!("X{}", i), RecordAction::Insert))
            .collect();
        records[4].can_process = false;
        records[4].validation_errors = vec!["分类未找到: Foo".to_string()];

        let mut sink = |_: &ProgressEvent| {};
        let outcome = processor.process_records(&records, &mut sink).await.unwrap();

        assert_eq!(outcome.success + outcome.errors.len(), records.len());
        assert_eq!(outcome.success, 4);
        assert!(outcome.errors.iter().any(|e| e.starts_with("Row 5: ")));
    }
}
