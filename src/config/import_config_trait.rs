// ==========================================
// 物料主数据同步系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::UsageType;
use async_trait::async_trait;
use std::error::Error;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入模块所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 分类器配置 =====

    /// 没有任何规则命中时的兜底用途类型
    ///
    /// # 默认值
    /// - RAW_MATERIAL
    async fn get_fallback_usage_type(&self) -> Result<UsageType, Box<dyn Error + Send + Sync>>;

    // ===== 历史库存导入配置 =====

    /// 期初流水的交易类型
    ///
    /// # 默认值
    /// - OPENING_STOCK
    async fn get_legacy_transaction_type(&self) -> Result<String, Box<dyn Error + Send + Sync>>;

    /// 流水来源标识
    ///
    /// # 默认值
    /// - LEGACY_IMPORT
    async fn get_legacy_source(&self) -> Result<String, Box<dyn Error + Send + Sync>>;

    /// 流水号前缀
    ///
    /// # 默认值
    /// - LEGACY
    async fn get_legacy_transaction_prefix(&self) -> Result<String, Box<dyn Error + Send + Sync>>;

    /// 写入前是否重新读取当前库存（检测分析后的并发修改）
    ///
    /// # 默认值
    /// - false
    async fn get_recheck_before_write(&self) -> Result<bool, Box<dyn Error + Send + Sync>>;
}
