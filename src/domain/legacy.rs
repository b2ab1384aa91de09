// ==========================================
// 物料主数据同步系统 - 历史库存领域模型
// ==========================================
// 职责: 历史期初库存行 / 冲突分析 / 导入结果 / 库存流水
// 键: item_code
// ==========================================

use crate::domain::types::{DetailStatus, ImportMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// LegacyRow - 历史库存行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyRow {
    pub row_number: usize,
    pub item_code: String,
    pub current_qty: f64,
    pub remarks: Option<String>,
}

// ==========================================
// RowRejection - 无法映射的行（不静默丢弃）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRejection {
    pub row_number: usize,
    pub message: String,
}

/// 历史库存行映射结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappedLegacyRows {
    pub rows: Vec<LegacyRow>,
    pub rejected: Vec<RowRejection>,
}

// ==========================================
// StockConflict - 数量冲突
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockConflict {
    pub row_number: usize,
    pub item_code: String,
    pub legacy_qty: f64,
    pub existing_qty: f64,
    pub difference: f64, // legacy_qty - existing_qty
    pub remarks: Option<String>,
}

impl StockConflict {
    /// 以历史数量为准还原为待导入行（强制导入使用）
    pub fn to_legacy_row(&self) -> LegacyRow {
        LegacyRow {
            row_number: self.row_number,
            item_code: self.item_code.clone(),
            current_qty: self.legacy_qty,
            remarks: self.remarks.clone(),
        }
    }
}

// ==========================================
// ConflictAnalysis - 冲突分析结果
// ==========================================
// 红线: 对同一快照，三个集合互斥且覆盖全部历史行
// 注意: 时点快照，导入前记录库变化会使其过期
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictAnalysis {
    pub missing: Vec<LegacyRow>,
    pub conflicts: Vec<StockConflict>,
    pub identical: Vec<LegacyRow>,
    pub analyzed_at: DateTime<Utc>,
}

impl ConflictAnalysis {
    pub fn total(&self) -> usize {
        self.missing.len() + self.conflicts.len() + self.identical.len()
    }
}

// ==========================================
// ImportDetail - 单行导入明细（审计）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDetail {
    pub row_number: usize,
    pub item_code: String,
    pub qty: f64,
    pub status: DetailStatus,
    pub error: Option<String>,
    pub generated_reference: Option<String>, // 流水号
}

// ==========================================
// LegacyImportResult - 导入结果
// ==========================================
// 生成后不可变，作为审计记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyImportResult {
    pub batch_id: String,
    pub mode: ImportMode,
    pub imported: usize,
    pub skipped: usize,   // identical 行数（从不写入）
    pub conflicts: usize, // 未导入的冲突行数（强制模式为 0）
    pub details: Vec<ImportDetail>,
}

impl LegacyImportResult {
    pub fn failed(&self) -> usize {
        self.details
            .iter()
            .filter(|d| d.status == DetailStatus::Failed)
            .count()
    }
}

// ==========================================
// StockTransaction - 库存流水
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub transaction_id: String,
    pub batch_id: String,
    pub item_code: String,
    pub transaction_type: String, // 期初: OPENING_STOCK
    pub qty: f64,
    pub source: String, // LEGACY_IMPORT
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
}
