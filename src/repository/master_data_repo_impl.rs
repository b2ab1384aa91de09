// ==========================================
// 物料主数据同步系统 - 主数据 Repository 实现
// ==========================================
// 职责: 实现记录库访问（使用 rusqlite）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::item::{CategoryRecord, ItemCodeRequest, ItemFields, ItemRecord};
use crate::domain::legacy::StockTransaction;
use crate::domain::types::UsageType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::master_data_repo::{
    CategoryRepository, ItemCodeGenerator, ItemRepository, StockRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// 名称批量查询每块的参数个数
const NAME_LOOKUP_CHUNK: usize = 500;

const ITEM_COLUMNS: &str = "item_code, item_name, category_id, qualifier, gsm, size_mm, uom, \
                            usage_type, specifications, created_at, updated_at";

fn map_item_row(row: &Row<'_>) -> rusqlite::Result<ItemRecord> {
    let usage_raw: String = row.get(7)?;
    let usage_type = usage_raw.parse::<UsageType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, Type::Text, e.into())
    })?;

    Ok(ItemRecord {
        item_code: row.get(0)?,
        item_name: row.get(1)?,
        category_id: row.get(2)?,
        qualifier: row.get(3)?,
        gsm: row.get(4)?,
        size_mm: row.get(5)?,
        uom: row.get(6)?,
        usage_type,
        specifications: row.get(8)?,
        created_at: row.get::<_, DateTime<Utc>>(9)?,
        updated_at: row.get::<_, DateTime<Utc>>(10)?,
    })
}

fn map_transaction_row(row: &Row<'_>) -> rusqlite::Result<StockTransaction> {
    Ok(StockTransaction {
        transaction_id: row.get(0)?,
        batch_id: row.get(1)?,
        item_code: row.get(2)?,
        transaction_type: row.get(3)?,
        qty: row.get(4)?,
        source: row.get(5)?,
        remarks: row.get(6)?,
        created_at: row.get::<_, DateTime<Utc>>(7)?,
    })
}

/// 取文本中的字母数字并转大写，最多 max_len 个字符
fn code_segment(value: &str, max_len: usize) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .take(max_len)
        .collect()
}

fn format_dimension(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// 物料编码前缀: {CAT}-{QUALIFIER}-{SIZE}X{GSM}（缺失段省略）
pub fn item_code_prefix(request: &ItemCodeRequest) -> String {
    let mut segments = Vec::new();

    let category = code_segment(&request.category_name, 3);
    segments.push(if category.is_empty() {
        "GEN".to_string()
    } else {
        category
    });

    if let Some(qualifier) = request.qualifier.as_deref() {
        let qualifier = code_segment(qualifier, 6);
        if !qualifier.is_empty() {
            segments.push(qualifier);
        }
    }

    let dimension = match (request.size_mm, request.gsm) {
        (Some(size), Some(gsm)) => Some(format!("{}X{}", format_dimension(size), format_dimension(gsm))),
        (Some(size), None) => Some(format_dimension(size)),
        (None, Some(gsm)) => Some(format!("G{}", format_dimension(gsm))),
        (None, None) => None,
    };
    if let Some(dimension) = dimension {
        segments.push(dimension);
    }

    segments.join("-")
}

// ==========================================
// SqliteMasterDataRepository
// ==========================================
pub struct SqliteMasterDataRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMasterDataRepository {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径（需已建表）
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入/覆盖分类参考数据（初始化与测试使用）
    pub fn upsert_category(&self, id: &str, category_name: &str, is_active: bool) -> RepositoryResult<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO item_category (id, category_name, is_active) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET category_name = ?2, is_active = ?3
            "#,
            params![id, category_name, is_active as i32],
        )?;
        Ok(())
    }
}

#[async_trait]
impl CategoryRepository for SqliteMasterDataRepository {
    async fn list_active_categories(&self) -> RepositoryResult<Vec<CategoryRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, category_name FROM item_category WHERE is_active = 1 ORDER BY category_name",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(CategoryRecord {
                id: row.get(0)?,
                category_name: row.get(1)?,
            })
        })?;

        let mut categories = Vec::new();
        for row in rows {
            categories.push(row?);
        }
        Ok(categories)
    }
}

#[async_trait]
impl ItemRepository for SqliteMasterDataRepository {
    async fn find_items_by_names(&self, names: &[String]) -> RepositoryResult<Vec<ItemRecord>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let lowered: Vec<String> = names.iter().map(|n| n.trim().to_lowercase()).collect();

        let conn = self.lock()?;
        let mut items = Vec::new();
        // SQLite 单条语句的参数个数有上限，按块查询
        for chunk in lowered.chunks(NAME_LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {} FROM item_master WHERE lower(item_name) IN ({})",
                ITEM_COLUMNS, placeholders
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), map_item_row)?;
            for row in rows {
                items.push(row?);
            }
        }
        Ok(items)
    }

    async fn insert_item(&self, item_code: &str, fields: &ItemFields) -> RepositoryResult<()> {
        let now = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO item_master ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                ITEM_COLUMNS
            ),
            params![
                item_code,
                fields.item_name,
                fields.category_id,
                fields.qualifier,
                fields.gsm,
                fields.size_mm,
                fields.uom,
                fields.usage_type.as_str(),
                fields.specifications,
                now,
                now,
            ],
        )?;
        Ok(())
    }

    async fn update_item(&self, item_code: &str, fields: &ItemFields) -> RepositoryResult<()> {
        let conn = self.lock()?;
        let affected = conn.execute(
            r#"
            UPDATE item_master SET
                item_name = ?2, category_id = ?3, qualifier = ?4, gsm = ?5, size_mm = ?6,
                uom = ?7, usage_type = ?8, specifications = ?9, updated_at = ?10
            WHERE item_code = ?1
            "#,
            params![
                item_code,
                fields.item_name,
                fields.category_id,
                fields.qualifier,
                fields.gsm,
                fields.size_mm,
                fields.uom,
                fields.usage_type.as_str(),
                fields.specifications,
                Utc::now(),
            ],
        )?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "item_master".to_string(),
                id: item_code.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ItemCodeGenerator for SqliteMasterDataRepository {
    async fn generate_item_code(&self, request: &ItemCodeRequest) -> RepositoryResult<String> {
        let prefix = item_code_prefix(request);

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let next: i64 = tx
            .query_row(
                "SELECT next_value FROM item_code_sequence WHERE prefix = ?1",
                params![prefix],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(1);

        tx.execute(
            r#"
            INSERT INTO item_code_sequence (prefix, next_value) VALUES (?1, ?2)
            ON CONFLICT(prefix) DO UPDATE SET next_value = ?2
            "#,
            params![prefix, next + 1],
        )?;
        tx.commit()?;

        Ok(format!("{}-{:04}", prefix, next))
    }
}

#[async_trait]
impl StockRepository for SqliteMasterDataRepository {
    async fn stock_levels(&self) -> RepositoryResult<HashMap<String, f64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT item_code, current_qty FROM stock_balance")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?;

        let mut levels = HashMap::new();
        for row in rows {
            let (item_code, qty) = row?;
            levels.insert(item_code, qty);
        }
        Ok(levels)
    }

    async fn stock_level(&self, item_code: &str) -> RepositoryResult<Option<f64>> {
        let conn = self.lock()?;
        let qty = conn
            .query_row(
                "SELECT current_qty FROM stock_balance WHERE item_code = ?1",
                params![item_code],
                |row| row.get(0),
            )
            .optional()?;
        Ok(qty)
    }

    async fn record_opening_stock(&self, transaction: &StockTransaction) -> RepositoryResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO stock_transaction (
                transaction_id, batch_id, item_code, transaction_type, qty, source, remarks, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                transaction.transaction_id,
                transaction.batch_id,
                transaction.item_code,
                transaction.transaction_type,
                transaction.qty,
                transaction.source,
                transaction.remarks,
                transaction.created_at,
            ],
        )?;

        tx.execute(
            r#"
            INSERT INTO stock_balance (item_code, current_qty, last_batch_id, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(item_code) DO UPDATE SET
                current_qty = excluded.current_qty,
                last_batch_id = excluded.last_batch_id,
                updated_at = excluded.updated_at
            "#,
            params![
                transaction.item_code,
                transaction.qty,
                transaction.batch_id,
                transaction.created_at
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    async fn transactions_by_batch(
        &self,
        batch_id: &str,
    ) -> RepositoryResult<Vec<StockTransaction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT transaction_id, batch_id, item_code, transaction_type, qty, source, remarks, created_at
            FROM stock_transaction WHERE batch_id = ?1 ORDER BY created_at, transaction_id
            "#,
        )?;
        let rows = stmt.query_map(params![batch_id], map_transaction_row)?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row?);
        }
        Ok(transactions)
    }
}
