// ==========================================
// Mock 配置实现 - 用于集成测试
// ==========================================

use async_trait::async_trait;
use master_data_sync::config::ImportConfigReader;
use master_data_sync::domain::types::UsageType;
use std::error::Error;

/// Mock 配置结构
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub fallback_usage_type: UsageType,
    pub transaction_type: String,
    pub source: String,
    pub transaction_prefix: String,
    pub recheck_before_write: bool,
    pub fail: bool,
}

impl MockConfig {
    /// 创建默认配置
    pub fn default() -> Self {
        Self {
            fallback_usage_type: UsageType::RawMaterial,
            transaction_type: "OPENING_STOCK".to_string(),
            source: "LEGACY_IMPORT".to_string(),
            transaction_prefix: "LEGACY".to_string(),
            recheck_before_write: false,
            fail: false,
        }
    }

    /// 兜底用途类型
    pub fn with_fallback(fallback: UsageType) -> Self {
        let mut config = Self::default();
        config.fallback_usage_type = fallback;
        config
    }

    /// 写入前复核库存
    pub fn with_recheck() -> Self {
        let mut config = Self::default();
        config.recheck_before_write = true;
        config
    }

    /// 所有读取均失败
    pub fn broken() -> Self {
        let mut config = Self::default();
        config.fail = true;
        config
    }

    fn check(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.fail {
            return Err("mock config unavailable".into());
        }
        Ok(())
    }
}

#[async_trait]
impl ImportConfigReader for MockConfig {
    async fn get_fallback_usage_type(&self) -> Result<UsageType, Box<dyn Error + Send + Sync>> {
        self.check()?;
        Ok(self.fallback_usage_type)
    }

    async fn get_legacy_transaction_type(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        self.check()?;
        Ok(self.transaction_type.clone())
    }

    async fn get_legacy_source(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        self.check()?;
        Ok(self.source.clone())
    }

    async fn get_legacy_transaction_prefix(&self) -> Result<String, Box<dyn Error + Send + Sync>> {
        self.check()?;
        Ok(self.transaction_prefix.clone())
    }

    async fn get_recheck_before_write(&self) -> Result<bool, Box<dyn Error + Send + Sync>> {
        self.check()?;
        Ok(self.recheck_before_write)
    }
}
