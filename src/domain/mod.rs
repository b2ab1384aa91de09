// ==========================================
// 物料主数据同步系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、封闭枚举
// 红线: 不含数据访问逻辑，不含导入流程逻辑
// ==========================================

pub mod item;
pub mod legacy;
pub mod types;

// 重导出核心类型
pub use item::{
    BatchOutcome, CategoryRecord, ItemCodeRequest, ItemFields, ItemRecord, ItemUploadRow,
    ParsedRecord, RawRecord, UpsertSummary,
};
pub use legacy::{
    ConflictAnalysis, ImportDetail, LegacyImportResult, LegacyRow, MappedLegacyRows,
    RowRejection, StockConflict, StockTransaction,
};
pub use types::{
    DetailStatus, ImportMode, ProgressStage, ReconcileStage, RecordAction, RuleStage, UsageType,
};
