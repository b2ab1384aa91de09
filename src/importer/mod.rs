// ==========================================
// 物料主数据同步系统 - 导入层
// ==========================================
// 职责: 外部表格导入、主数据对账与分类
// 支持: Excel, CSV
// ==========================================
// 依赖顺序: 参考数据解析 / 用途分类 → 比对校验 → 批处理
//           历史库存: 映射 → 冲突分析 → 两种模式导入
// ==========================================

// 模块声明
pub mod batch_processor;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod item_upload_impl;
pub mod legacy_reconciler;
pub mod progress;
pub mod record_differ;
pub mod reference_resolver;
pub mod report;
pub mod usage_classifier;

// 重导出核心类型
pub use batch_processor::{BatchProcessor, ItemStore};
pub use error::{ImportError, ImportResult};
pub use field_mapper::FieldMapper;
pub use file_parser::{CsvParser, ExcelParser, FileParser, UniversalFileParser};
pub use item_upload_impl::{ItemUploadPipeline, UploadCommit, UploadPreview};
pub use legacy_reconciler::{LegacyReconciler, ReconcileSettings};
pub use progress::{NoOpProgressSink, ProgressEvent, ProgressSink};
pub use record_differ::RecordDiffer;
pub use reference_resolver::ReferenceResolver;
pub use usage_classifier::{
    classify, validate_category_usage_type_logic, Classification, ClassificationRule,
    RuleMatcher, UsageClassifier,
};
