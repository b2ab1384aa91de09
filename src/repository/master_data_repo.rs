// ==========================================
// 物料主数据同步系统 - 主数据 Repository Trait
// ==========================================
// 职责: 定义记录库访问接口（不包含实现）
// 红线: Repository 不含业务规则，只做数据 CRUD
// 约定: 每次调用独立原子，失败不影响其他调用
// ==========================================

use crate::domain::item::{CategoryRecord, ItemCodeRequest, ItemFields, ItemRecord};
use crate::domain::legacy::StockTransaction;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use std::collections::HashMap;

// ==========================================
// CategoryRepository Trait
// ==========================================
// 用途: 参考数据查询（分类名 → 分类 ID）
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// 列出全部启用分类
    async fn list_active_categories(&self) -> RepositoryResult<Vec<CategoryRecord>>;
}

// ==========================================
// ItemRepository Trait
// ==========================================
// 用途: 现存物料查询 + 写入
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// 按名称查找物料（名称大小写不敏感）
    ///
    /// # 参数
    /// - names: 物料名称列表（一次查询）
    async fn find_items_by_names(&self, names: &[String]) -> RepositoryResult<Vec<ItemRecord>>;

    /// 新增物料
    ///
    /// # 返回
    /// - Err(UniqueConstraintViolation): 编码或名称重复
    async fn insert_item(&self, item_code: &str, fields: &ItemFields) -> RepositoryResult<()>;

    /// 按编码更新物料
    ///
    /// # 返回
    /// - Err(NotFound): 编码不存在
    async fn update_item(&self, item_code: &str, fields: &ItemFields) -> RepositoryResult<()>;
}

// ==========================================
// ItemCodeGenerator Trait
// ==========================================
// 用途: 物料编码生成（每次 INSERT 调用一次，编码不可复用）
#[async_trait]
pub trait ItemCodeGenerator: Send + Sync {
    async fn generate_item_code(&self, request: &ItemCodeRequest) -> RepositoryResult<String>;
}

// ==========================================
// StockRepository Trait
// ==========================================
// 用途: 库存余额 + 库存流水
#[async_trait]
pub trait StockRepository: Send + Sync {
    /// 全量库存快照: item_code → current_qty（一次查询）
    async fn stock_levels(&self) -> RepositoryResult<HashMap<String, f64>>;

    /// 单个物料当前库存
    async fn stock_level(&self, item_code: &str) -> RepositoryResult<Option<f64>>;

    /// 期初库存: 写流水 + 按 item_code 插入或覆盖余额（同一事务）
    ///
    /// 任一步失败时两者都不落库
    async fn record_opening_stock(&self, transaction: &StockTransaction) -> RepositoryResult<()>;

    /// 查询指定批次写入的全部流水（审计/回滚）
    async fn transactions_by_batch(&self, batch_id: &str)
        -> RepositoryResult<Vec<StockTransaction>>;
}
