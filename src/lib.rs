// ==========================================
// 物料主数据同步系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 外部表格 → 记录库的主数据对账与分类引擎
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 解析、分类、比对、写入、对账
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    DetailStatus, ImportMode, ProgressStage, ReconcileStage, RecordAction, RuleStage, UsageType,
};

// 领域实体
pub use domain::{
    ConflictAnalysis, ItemUploadRow, LegacyImportResult, LegacyRow, ParsedRecord, RawRecord,
    UpsertSummary,
};

// 导入层
pub use importer::{
    classify, ImportError, ItemUploadPipeline, LegacyReconciler, ReferenceResolver,
    UsageClassifier,
};

// 仓储
pub use repository::SqliteMasterDataRepository;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "物料主数据同步系统";
