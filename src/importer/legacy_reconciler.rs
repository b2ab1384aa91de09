// ==========================================
// 物料主数据同步系统 - 历史库存对账器
// ==========================================
// 职责: 历史期初库存 vs 当前库存 → missing / conflicts / identical
// 流程: UPLOAD → ANALYSIS → IMPORT → RESULTS（reset 回到 UPLOAD）
// 导入模式: SAFE（仅 missing）/ FORCED（missing + conflicts，以历史数量覆盖）
// 红线: 分区对同一快照互斥且完整；identical 从不写入
// 红线: 单行失败只写入明细，不中断批次
// ==========================================

use crate::config::ImportConfigReader;
use crate::domain::legacy::{
    ConflictAnalysis, ImportDetail, LegacyImportResult, LegacyRow, StockConflict, StockTransaction,
};
use crate::domain::types::{DetailStatus, ImportMode, ProgressStage, ReconcileStage};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::progress::{ProgressEvent, ProgressSink};
use crate::repository::master_data_repo::StockRepository;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 数量相等判定容差
pub const QTY_EPSILON: f64 = 1e-9;

fn same_qty(a: f64, b: f64) -> bool {
    (a - b).abs() < QTY_EPSILON
}

// ==========================================
// ReconcileSettings - 导入参数（来自配置）
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileSettings {
    pub transaction_type: String,
    pub source: String,
    pub transaction_prefix: String,
    pub recheck_before_write: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        use crate::config::config_defaults;
        Self {
            transaction_type: config_defaults::LEGACY_TRANSACTION_TYPE.to_string(),
            source: config_defaults::LEGACY_SOURCE.to_string(),
            transaction_prefix: config_defaults::LEGACY_TRANSACTION_PREFIX.to_string(),
            recheck_before_write: false,
        }
    }
}

impl ReconcileSettings {
    /// 运行前一次性读取配置
    pub async fn load<C>(config: &C) -> ImportResult<Self>
    where
        C: ImportConfigReader + ?Sized,
    {
        let read_err = |e: Box<dyn std::error::Error + Send + Sync>| {
            ImportError::ConfigReadError(e.to_string())
        };

        Ok(Self {
            transaction_type: config.get_legacy_transaction_type().await.map_err(read_err)?,
            source: config.get_legacy_source().await.map_err(read_err)?,
            transaction_prefix: config
                .get_legacy_transaction_prefix()
                .await
                .map_err(read_err)?,
            recheck_before_write: config.get_recheck_before_write().await.map_err(read_err)?,
        })
    }
}

/// 待写入行 + 分析时看到的库存
struct PlannedWrite {
    row: LegacyRow,
    snapshot_qty: Option<f64>,
}

// ==========================================
// LegacyReconciler
// ==========================================
pub struct LegacyReconciler<S>
where
    S: StockRepository + ?Sized,
{
    stock_repo: Arc<S>,
    settings: ReconcileSettings,
    stage: ReconcileStage,
    analysis: Option<ConflictAnalysis>,
    result: Option<LegacyImportResult>,
}

impl<S> LegacyReconciler<S>
where
    S: StockRepository + ?Sized,
{
    pub fn new(stock_repo: Arc<S>, settings: ReconcileSettings) -> Self {
        Self {
            stock_repo,
            settings,
            stage: ReconcileStage::Upload,
            analysis: None,
            result: None,
        }
    }

    pub fn stage(&self) -> ReconcileStage {
        self.stage
    }

    pub fn analysis(&self) -> Option<&ConflictAnalysis> {
        self.analysis.as_ref()
    }

    pub fn result(&self) -> Option<&LegacyImportResult> {
        self.result.as_ref()
    }

    /// 回到 UPLOAD（重新上传）
    pub fn reset(&mut self) {
        debug!(from = %self.stage, "对账流程重置");
        self.stage = ReconcileStage::Upload;
        self.analysis = None;
        self.result = None;
    }

    fn expect_stage(&self, expected: ReconcileStage, to: ReconcileStage) -> ImportResult<()> {
        if self.stage != expected {
            return Err(ImportError::InvalidStageTransition {
                from: self.stage,
                to,
            });
        }
        Ok(())
    }

    /// 冲突分析（UPLOAD → ANALYSIS）
    ///
    /// 一次查询构建 item_code → 数量快照，每行恰好落入一个分区
    #[instrument(skip(self, rows, sink), fields(rows = rows.len()))]
    pub async fn analyze<P>(
        &mut self,
        rows: Vec<LegacyRow>,
        sink: &mut P,
    ) -> ImportResult<ConflictAnalysis>
    where
        P: ProgressSink + ?Sized,
    {
        self.expect_stage(ReconcileStage::Upload, ReconcileStage::Analysis)?;

        let live = self.stock_repo.stock_levels().await?;

        let total = rows.len();
        let mut analysis = ConflictAnalysis {
            missing: Vec::new(),
            conflicts: Vec::new(),
            identical: Vec::new(),
            analyzed_at: Utc::now(),
        };

        for (idx, row) in rows.into_iter().enumerate() {
            sink.on_progress(&ProgressEvent {
                current: idx + 1,
                total,
                stage: ProgressStage::Analyzing,
                current_record: Some(row.item_code.clone()),
            });

            match live.get(&row.item_code) {
                None => analysis.missing.push(row),
                Some(existing) if same_qty(*existing, row.current_qty) => {
                    analysis.identical.push(row)
                }
                Some(existing) => analysis.conflicts.push(StockConflict {
                    row_number: row.row_number,
                    difference: row.current_qty - existing,
                    legacy_qty: row.current_qty,
                    existing_qty: *existing,
                    item_code: row.item_code,
                    remarks: row.remarks,
                }),
            }
        }

        info!(
            missing = analysis.missing.len(),
            conflicts = analysis.conflicts.len(),
            identical = analysis.identical.len(),
            "历史库存冲突分析完成"
        );

        self.stage = ReconcileStage::Analysis;
        self.analysis = Some(analysis.clone());
        Ok(analysis)
    }

    /// 执行导入（ANALYSIS → IMPORT → RESULTS）
    ///
    /// 使用分析时的分区；开启 recheck_before_write 时逐行复核库存
    #[instrument(skip(self, mode, sink), fields(mode = %mode, batch_id))]
    pub async fn import<P>(&mut self, mode: ImportMode, sink: &mut P) -> ImportResult<LegacyImportResult>
    where
        P: ProgressSink + ?Sized,
    {
        self.expect_stage(ReconcileStage::Analysis, ReconcileStage::Import)?;
        let analysis = self.analysis.clone().ok_or_else(|| {
            ImportError::InternalError("ANALYSIS 阶段缺少分析结果".to_string())
        })?;
        self.stage = ReconcileStage::Import;

        let batch_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("batch_id", batch_id.as_str());
        info!(batch_id = %batch_id, mode = %mode, "开始导入历史库存");

        let mut planned: Vec<PlannedWrite> = analysis
            .missing
            .iter()
            .map(|row| PlannedWrite {
                row: row.clone(),
                snapshot_qty: None,
            })
            .collect();
        if mode == ImportMode::Forced {
            planned.extend(analysis.conflicts.iter().map(|conflict| PlannedWrite {
                row: conflict.to_legacy_row(),
                snapshot_qty: Some(conflict.existing_qty),
            }));
        }

        let total = planned.len();
        let mut details = Vec::with_capacity(total);

        for (idx, write) in planned.into_iter().enumerate() {
            sink.on_progress(&ProgressEvent {
                current: idx + 1,
                total,
                stage: ProgressStage::Processing,
                current_record: Some(write.row.item_code.clone()),
            });

            let detail = match self.write_row(&batch_id, &write).await {
                Ok(reference) => ImportDetail {
                    row_number: write.row.row_number,
                    item_code: write.row.item_code,
                    qty: write.row.current_qty,
                    status: DetailStatus::Imported,
                    error: None,
                    generated_reference: Some(reference),
                },
                Err(message) => {
                    warn!(
                        row_number = write.row.row_number,
                        item_code = %write.row.item_code,
                        error = %message,
                        "历史库存行导入失败"
                    );
                    ImportDetail {
                        row_number: write.row.row_number,
                        item_code: write.row.item_code,
                        qty: write.row.current_qty,
                        status: DetailStatus::Failed,
                        error: Some(message),
                        generated_reference: None,
                    }
                }
            };
            details.push(detail);
        }

        let result = LegacyImportResult {
            batch_id,
            mode,
            imported: details
                .iter()
                .filter(|d| d.status == DetailStatus::Imported)
                .count(),
            skipped: analysis.identical.len(),
            conflicts: match mode {
                ImportMode::Safe => analysis.conflicts.len(),
                ImportMode::Forced => 0,
            },
            details,
        };

        info!(
            batch_id = %result.batch_id,
            imported = result.imported,
            failed = result.failed(),
            skipped = result.skipped,
            conflicts = result.conflicts,
            "历史库存导入完成"
        );

        self.stage = ReconcileStage::Results;
        self.result = Some(result.clone());
        Ok(result)
    }

    /// 单行写入: 流水 + 余额；返回流水号
    async fn write_row(&self, batch_id: &str, write: &PlannedWrite) -> Result<String, String> {
        let row = &write.row;

        if self.settings.recheck_before_write {
            let current = self
                .stock_repo
                .stock_level(&row.item_code)
                .await
                .map_err(|e| e.to_string())?;
            let unchanged = match (current, write.snapshot_qty) {
                (None, None) => true,
                (Some(a), Some(b)) => same_qty(a, b),
                _ => false,
            };
            if !unchanged {
                return Err(format!(
                    "分析后库存已变化（分析时: {}，当前: {}），请重新分析",
                    describe_qty(write.snapshot_qty),
                    describe_qty(current)
                ));
            }
        }

        let now = Utc::now();
        let transaction_id = format!(
            "{}-{}-{}-{}-{}",
            self.settings.transaction_prefix,
            batch_id,
            now.timestamp_millis(),
            row.item_code,
            row.row_number
        );

        let transaction = StockTransaction {
            transaction_id: transaction_id.clone(),
            batch_id: batch_id.to_string(),
            item_code: row.item_code.clone(),
            transaction_type: self.settings.transaction_type.clone(),
            qty: row.current_qty,
            source: self.settings.source.clone(),
            remarks: row.remarks.clone(),
            created_at: now,
        };

        self.stock_repo
            .record_opening_stock(&transaction)
            .await
            .map_err(|e| e.to_string())?;

        Ok(transaction_id)
    }
}

fn describe_qty(qty: Option<f64>) -> String {
    qty.map(|q| q.to_string()).unwrap_or_else(|| "无记录".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::error::{RepositoryError, RepositoryResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStock {
        levels: Mutex<HashMap<String, f64>>,
        transactions: Mutex<Vec<StockTransaction>>,
        reject: Option<String>,
        reject_balance: Option<String>,
    }

    impl FakeStock {
        fn with_levels(levels: &[(&str, f64)]) -> Arc<Self> {
            Arc::new(Self {
                levels: Mutex::new(levels.iter().map(|(k, v)| (k.to_string(), *v)).collect()),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl StockRepository for FakeStock {
        async fn stock_levels(&self) -> RepositoryResult<HashMap<String, f64>> {
            Ok(self.levels.lock().unwrap().clone())
        }

        async fn stock_level(&self, item_code: &str) -> RepositoryResult<Option<f64>> {
            Ok(self.levels.lock().unwrap().get(item_code).copied())
        }

        async fn record_opening_stock(&self, transaction: &StockTransaction) -> RepositoryResult<()> {
            let code = Some(transaction.item_code.as_str());
            if self.reject.as_deref() == code {
                return Err(RepositoryError::ForeignKeyViolation(
                    "stock_transaction.item_code".to_string(),
                ));
            }

            // 与 SQLite 实现一致: 余额失败时流水一并撤销
            let mut transactions = self.transactions.lock().unwrap();
            transactions.push(transaction.clone());
            if self.reject_balance.as_deref() == code {
                transactions.pop();
                return Err(RepositoryError::DatabaseQueryError(
                    "stock_balance write rejected".to_string(),
                ));
            }
            self.levels
                .lock()
                .unwrap()
                .insert(transaction.item_code.clone(), transaction.qty);
            Ok(())
        }

        async fn transactions_by_batch(
            &self,
            batch_id: &str,
        ) -> RepositoryResult<Vec<StockTransaction>> {
            Ok(self
                .transactions
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.batch_id == batch_id)
                .cloned()
                .collect())
        }
    }

    fn row(row_number: usize, code: &str, qty: f64) -> LegacyRow {
        LegacyRow {
            row_number,
            item_code: code.to_string(),
            current_qty: qty,
            remarks: None,
        }
    }

    fn reconciler(stock: Arc<FakeStock>) -> LegacyReconciler<FakeStock> {
        LegacyReconciler::new(stock, ReconcileSettings::default())
    }

    fn quiet() -> impl FnMut(&ProgressEvent) {
        |_: &ProgressEvent| {}
    }

    #[tokio::test]
    async fn test_missing_row_safe_import() {
        let stock = FakeStock::with_levels(&[]);
        let mut reconciler = reconciler(stock.clone());

        let analysis = reconciler
            .analyze(vec![row(1, "X1", 100.0)], &mut quiet())
            .await
            .unwrap();
        assert_eq!(analysis.missing.len(), 1);

        let result = reconciler
            .import(ImportMode::Safe, &mut quiet())
            .await
            .unwrap();
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.conflicts, 0);
        assert_eq!(result.mode, ImportMode::Safe);

        let transactions = stock.transactions.lock().unwrap().clone();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].transaction_type, "OPENING_STOCK");
        assert_eq!(transactions[0].source, "LEGACY_IMPORT");
        assert!(transactions[0]
            .transaction_id
            .starts_with(&format!("LEGACY-{}-", result.batch_id)));
        assert_eq!(
            result.details[0].generated_reference.as_deref(),
            Some(transactions[0].transaction_id.as_str())
        );
        assert_eq!(stock.levels.lock().unwrap().get("X1"), Some(&100.0));
        assert_eq!(reconciler.stage(), ReconcileStage::Results);
    }

    #[tokio::test]
    async fn test_conflict_safe_vs_forced() {
        let stock = FakeStock::with_levels(&[("X2", 100.0)]);

        let mut safe = reconciler(stock.clone());
        let analysis = safe
            .analyze(vec![row(1, "X2", 150.0)], &mut quiet())
            .await
            .unwrap();
        assert_eq!(analysis.conflicts.len(), 1);
        assert_eq!(analysis.conflicts[0].difference, 50.0);
        assert_eq!(analysis.conflicts[0].existing_qty, 100.0);

        let result = safe.import(ImportMode::Safe, &mut quiet()).await.unwrap();
        assert_eq!(result.conflicts, 1);
        assert_eq!(result.imported, 0);
        assert_eq!(stock.levels.lock().unwrap().get("X2"), Some(&100.0));

        let mut forced = reconciler(stock.clone());
        forced
            .analyze(vec![row(1, "X2", 150.0)], &mut quiet())
            .await
            .unwrap();
        let result = forced
            .import(ImportMode::Forced, &mut quiet())
            .await
            .unwrap();
        assert_eq!(result.conflicts, 0);
        assert_eq!(result.imported, 1);
        assert_eq!(result.details[0].status, DetailStatus::Imported);
        assert_eq!(stock.levels.lock().unwrap().get("X2"), Some(&150.0));
    }

    #[tokio::test]
    async fn test_partition_is_total() {
        let stock = FakeStock::with_levels(&[("A", 1.0), ("B", 2.0), ("C", 3.0)]);
        let rows = vec![
            row(1, "A", 1.0),
            row(2, "B", 5.0),
            row(3, "D", 4.0),
            row(4, "C", 3.0),
            row(5, "E", 0.0),
        ];
        let mut reconciler = reconciler(stock);

        let mut events = Vec::new();
        let mut sink = |e: &ProgressEvent| events.push(e.stage);
        let analysis = reconciler.analyze(rows.clone(), &mut sink).await.unwrap();

        assert_eq!(analysis.total(), rows.len());
        assert_eq!(analysis.missing.len(), 2);
        assert_eq!(analysis.conflicts.len(), 1);
        assert_eq!(analysis.identical.len(), 2);
        assert_eq!(events, vec![ProgressStage::Analyzing; 5]);
    }

    #[tokio::test]
    async fn test_safe_import_twice_is_idempotent() {
        let stock = FakeStock::with_levels(&[("A", 1.0)]);
        let rows = vec![row(1, "A", 1.0), row(2, "N1", 10.0), row(3, "N2", 20.0)];

        let mut first = reconciler(stock.clone());
        first.analyze(rows.clone(), &mut quiet()).await.unwrap();
        let result = first.import(ImportMode::Safe, &mut quiet()).await.unwrap();
        assert_eq!(result.imported, 2);
        assert_eq!(result.skipped, 1);

        let mut second = reconciler(stock.clone());
        let analysis = second.analyze(rows, &mut quiet()).await.unwrap();
        assert!(analysis.missing.is_empty());
        assert_eq!(analysis.identical.len(), 3);
        let result = second.import(ImportMode::Safe, &mut quiet()).await.unwrap();
        assert_eq!(result.imported, 0);
        assert_eq!(stock.transactions.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_row_failure_is_isolated() {
        let stock = Arc::new(FakeStock {
            reject: Some("BAD".to_string()),
            ..Default::default()
        });
        let mut reconciler = reconciler(stock.clone());
        reconciler
            .analyze(
                vec![row(1, "OK1", 1.0), row(2, "BAD", 2.0), row(3, "OK2", 3.0)],
                &mut quiet(),
            )
            .await
            .unwrap();

        let result = reconciler
            .import(ImportMode::Safe, &mut quiet())
            .await
            .unwrap();

        assert_eq!(result.imported, 2);
        assert_eq!(result.failed(), 1);
        let failed = &result.details[1];
        assert_eq!(failed.item_code, "BAD");
        assert_eq!(failed.status, DetailStatus::Failed);
        assert!(failed.error.is_some());
        assert!(failed.generated_reference.is_none());

        let audit = stock.transactions_by_batch(&result.batch_id).await.unwrap();
        assert_eq!(audit.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_balance_write_leaves_no_audit_entry() {
        let stock = Arc::new(FakeStock {
            reject_balance: Some("X2".to_string()),
            ..Default::default()
        });
        let mut reconciler = reconciler(stock.clone());
        reconciler
            .analyze(vec![row(1, "X1", 10.0), row(2, "X2", 20.0)], &mut quiet())
            .await
            .unwrap();

        let result = reconciler
            .import(ImportMode::Safe, &mut quiet())
            .await
            .unwrap();

        assert_eq!(result.imported, 1);
        assert_eq!(result.details[1].status, DetailStatus::Failed);

        let audit = stock.transactions_by_batch(&result.batch_id).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].item_code, "X1");
        assert_eq!(stock.stock_level("X2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stage_transitions() {
        let stock = FakeStock::with_levels(&[]);
        let mut reconciler = reconciler(stock);

        let early = reconciler.import(ImportMode::Safe, &mut quiet()).await;
        assert!(matches!(
            early,
            Err(ImportError::InvalidStageTransition {
                from: ReconcileStage::Upload,
                to: ReconcileStage::Import
            })
        ));

        reconciler.analyze(vec![], &mut quiet()).await.unwrap();
        let again = reconciler.analyze(vec![], &mut quiet()).await;
        assert!(matches!(again, Err(ImportError::InvalidStageTransition { .. })));

        reconciler
            .import(ImportMode::Safe, &mut quiet())
            .await
            .unwrap();
        assert_eq!(reconciler.stage(), ReconcileStage::Results);
        assert!(reconciler.result().is_some());

        reconciler.reset();
        assert_eq!(reconciler.stage(), ReconcileStage::Upload);
        assert!(reconciler.analysis().is_none());
        assert!(reconciler.analyze(vec![], &mut quiet()).await.is_ok());
    }

    #[tokio::test]
    async fn test_recheck_detects_stale_partition() {
        let stock = FakeStock::with_levels(&[]);
        let settings = ReconcileSettings {
            recheck_before_write: true,
            ..Default::default()
        };
        let mut reconciler = LegacyReconciler::new(stock.clone(), settings);
        reconciler
            .analyze(vec![row(1, "X1", 100.0), row(2, "X3", 7.0)], &mut quiet())
            .await
            .unwrap();

        // 分析后有其他写入者
        stock.levels.lock().unwrap().insert("X1".to_string(), 80.0);

        let result = reconciler
            .import(ImportMode::Safe, &mut quiet())
            .await
            .unwrap();
        assert_eq!(result.imported, 1);
        assert_eq!(result.details[0].status, DetailStatus::Failed);
        assert!(result.details[0]
            .error
            .as_deref()
            .unwrap()
            .contains("重新分析"));
        assert_eq!(stock.levels.lock().unwrap().get("X1"), Some(&80.0));
    }
}
