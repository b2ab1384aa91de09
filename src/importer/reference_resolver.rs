// ==========================================
// 物料主数据同步系统 - 参考数据解析器
// ==========================================
// 职责: 分类名（自由文本）→ 分类 ID
// 生命周期: 每次上传会话新建实例，initialize() 一次性加载，之后只读
// 红线: initialize() 之后不再访问记录库
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::repository::master_data_repo::CategoryRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 分类映射（只读）
///
/// 每个分类登记三种写法: 原样 / 小写去空白 / 大写
#[derive(Debug, Default)]
struct CategoryMapping {
    ids_by_name: HashMap<String, String>,
}

impl CategoryMapping {
    fn insert(&mut self, id: &str, category_name: &str) {
        let variants = [
            category_name.to_string(),
            category_name.trim().to_lowercase(),
            category_name.trim().to_uppercase(),
        ];
        for key in variants {
            // 先登记者胜，名称冲突时不覆盖
            self.ids_by_name.entry(key).or_insert_with(|| id.to_string());
        }
    }

    fn resolve(&self, name: &str) -> Option<&String> {
        self.ids_by_name
            .get(name)
            .or_else(|| self.ids_by_name.get(&name.trim().to_lowercase()))
    }
}

// ==========================================
// ReferenceResolver
// ==========================================
pub struct ReferenceResolver<C>
where
    C: CategoryRepository + ?Sized,
{
    category_repo: Arc<C>,
    mapping: Option<CategoryMapping>,
}

impl<C> ReferenceResolver<C>
where
    C: CategoryRepository + ?Sized,
{
    pub fn new(category_repo: Arc<C>) -> Self {
        Self {
            category_repo,
            mapping: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.mapping.is_some()
    }

    /// 加载全部启用分类（幂等）
    ///
    /// # 返回
    /// - Err(InitializationError): 查询失败
    #[instrument(skip(self))]
    pub async fn initialize(&mut self) -> ImportResult<()> {
        if self.mapping.is_some() {
            return Ok(());
        }

        let categories = self
            .category_repo
            .list_active_categories()
            .await
            .map_err(|e| ImportError::InitializationError(format!("加载分类失败: {}", e)))?;

        let mut mapping = CategoryMapping::default();
        for category in &categories {
            mapping.insert(&category.id, &category.category_name);
        }

        info!(categories = categories.len(), "分类参考数据加载完成");
        self.mapping = Some(mapping);
        Ok(())
    }

    /// 未初始化时返回 NotInitialized
    pub fn ensure_initialized(&self) -> ImportResult<()> {
        self.mapping().map(|_| ())
    }

    fn mapping(&self) -> ImportResult<&CategoryMapping> {
        self.mapping.as_ref().ok_or_else(|| ImportError::NotInitialized {
            component: "ReferenceResolver".to_string(),
        })
    }

    /// 分类名 → 分类 ID
    ///
    /// 先精确匹配，再小写去空白匹配
    pub fn resolve_category_id(&self, name: &str) -> ImportResult<Option<String>> {
        Ok(self.mapping()?.resolve(name).cloned())
    }

    /// 返回无法解析的分类名（保持输入顺序，去重）
    pub fn get_unmapped_categories(&self, names: &[String]) -> ImportResult<Vec<String>> {
        let mapping = self.mapping()?;

        let mut unmapped: Vec<String> = Vec::new();
        for name in names {
            if mapping.resolve(name).is_none() && !unmapped.contains(name) {
                unmapped.push(name.clone());
            }
        }

        if !unmapped.is_empty() {
            warn!(count = unmapped.len(), unmapped = ?unmapped, "存在未映射的分类");
        }
        Ok(unmapped)
    }
}
