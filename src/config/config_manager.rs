// ==========================================
// 物料主数据同步系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value)
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::domain::types::UsageType;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// 配置键
pub mod config_keys {
    pub const FALLBACK_USAGE_TYPE: &str = "classifier.fallback_usage_type";
    pub const LEGACY_TRANSACTION_TYPE: &str = "legacy.transaction_type";
    pub const LEGACY_SOURCE: &str = "legacy.source";
    pub const LEGACY_TRANSACTION_PREFIX: &str = "legacy.transaction_prefix";
    pub const LEGACY_RECHECK_BEFORE_WRITE: &str = "legacy.recheck_before_write";

    /// 全部已知键与默认值
    pub const ALL: &[(&str, &str)] = &[
        (FALLBACK_USAGE_TYPE, super::config_defaults::FALLBACK_USAGE_TYPE),
        (LEGACY_TRANSACTION_TYPE, super::config_defaults::LEGACY_TRANSACTION_TYPE),
        (LEGACY_SOURCE, super::config_defaults::LEGACY_SOURCE),
        (LEGACY_TRANSACTION_PREFIX, super::config_defaults::LEGACY_TRANSACTION_PREFIX),
        (LEGACY_RECHECK_BEFORE_WRITE, super::config_defaults::LEGACY_RECHECK_BEFORE_WRITE),
    ];
}

/// 默认值
pub mod config_defaults {
    pub const FALLBACK_USAGE_TYPE: &str = "RAW_MATERIAL";
    pub const LEGACY_TRANSACTION_TYPE: &str = "OPENING_STOCK";
    pub const LEGACY_SOURCE: &str = "LEGACY_IMPORT";
    pub const LEGACY_TRANSACTION_PREFIX: &str = "LEGACY";
    pub const LEGACY_RECHECK_BEFORE_WRITE: &str = "false";
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> ConfigResult<String> {
        Ok(self
            .get_config_value(key)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入配置值（UPSERT）
    ///
    /// 只接受已知键；值的格式在读取时校验
    pub fn set_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        if !config_keys::ALL.iter().any(|(known, _)| *known == key) {
            return Err(format!("未知配置键: {}", key).into());
        }

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 生效配置快照（JSON格式，缺省键取默认值）
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let mut config_map: BTreeMap<&str, String> = BTreeMap::new();
        for &(key, default) in config_keys::ALL {
            config_map.insert(key, self.get_config_or_default(key, default)?);
        }

        Ok(serde_json::to_string_pretty(&json!(config_map))?)
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_fallback_usage_type(&self) -> ConfigResult<UsageType> {
        let raw = self.get_config_or_default(
            config_keys::FALLBACK_USAGE_TYPE,
            config_defaults::FALLBACK_USAGE_TYPE,
        )?;
        Ok(raw.parse::<UsageType>()?)
    }

    async fn get_legacy_transaction_type(&self) -> ConfigResult<String> {
        self.get_config_or_default(
            config_keys::LEGACY_TRANSACTION_TYPE,
            config_defaults::LEGACY_TRANSACTION_TYPE,
        )
    }

    async fn get_legacy_source(&self) -> ConfigResult<String> {
        self.get_config_or_default(config_keys::LEGACY_SOURCE, config_defaults::LEGACY_SOURCE)
    }

    async fn get_legacy_transaction_prefix(&self) -> ConfigResult<String> {
        self.get_config_or_default(
            config_keys::LEGACY_TRANSACTION_PREFIX,
            config_defaults::LEGACY_TRANSACTION_PREFIX,
        )
    }

    async fn get_recheck_before_write(&self) -> ConfigResult<bool> {
        let raw = self.get_config_or_default(
            config_keys::LEGACY_RECHECK_BEFORE_WRITE,
            config_defaults::LEGACY_RECHECK_BEFORE_WRITE,
        )?;
        match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(format!(
                "配置值格式错误 (key: {}, value: {})",
                config_keys::LEGACY_RECHECK_BEFORE_WRITE,
                other
            )
            .into()),
        }
    }
}
