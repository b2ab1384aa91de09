// ==========================================
// 物料主数据同步系统 - 物料领域模型
// ==========================================
// 职责: 原始行 / 上传行 / 现存物料 / 增强记录 / 汇总统计
// 生命周期: RawRecord 与 ParsedRecord 仅存在于一次上传会话
// ==========================================

use crate::domain::types::{RecordAction, RuleStage, UsageType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// RawRecord - 原始行
// ==========================================
// 用途: 文件解析产物，按表头顺序保存单元格
// 红线: row_number 在解析时分配（1 起，不含表头），之后不再变化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub row_number: usize,
    pub cells: Vec<(String, String)>, // (表头, 值)，值已 TRIM
}

impl RawRecord {
    pub fn new(row_number: usize, cells: Vec<(String, String)>) -> Self {
        Self { row_number, cells }
    }

    /// 按原始表头精确取值
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    /// 所有单元格均为空
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.trim().is_empty())
    }
}

// ==========================================
// ItemUploadRow - 物料上传行（字段映射后）
// ==========================================
// 说明: 全部保留文本，数值解析放到 Differ 中以便报告错误
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemUploadRow {
    pub item_name: Option<String>,
    pub category_name: Option<String>,
    pub qualifier: Option<String>,
    pub gsm: Option<String>,
    pub size_mm: Option<String>,
    pub uom: Option<String>,
    pub usage_type: Option<String>, // 源文件中的自由文本标签
    pub specifications: Option<String>,
}

// ==========================================
// CategoryRecord - 分类参考数据
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: String,
    pub category_name: String,
}

// ==========================================
// ItemRecord - 现存物料（记录库中的 item_master）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_code: String,
    pub item_name: String,
    pub category_id: Option<String>,
    pub qualifier: Option<String>,
    pub gsm: Option<f64>,
    pub size_mm: Option<f64>,
    pub uom: Option<String>,
    pub usage_type: UsageType,
    pub specifications: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// ItemFields - 物料写入载荷（INSERT / UPDATE 共用）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFields {
    pub item_name: String,
    pub category_id: String,
    pub qualifier: Option<String>,
    pub gsm: Option<f64>,
    pub size_mm: Option<f64>,
    pub uom: Option<String>,
    pub usage_type: UsageType,
    pub specifications: Option<String>,
}

// ==========================================
// ItemCodeRequest - 物料编码生成请求
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCodeRequest {
    pub category_name: String,
    pub qualifier: Option<String>,
    pub size_mm: Option<f64>,
    pub gsm: Option<f64>,
}

// ==========================================
// ParsedRecord - 增强记录
// ==========================================
// 红线: 生成后不再修改；人工修正产生新记录（同一 row_number + corrected_data）
// 红线: can_process == validation_errors.is_empty()
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecord {
    pub row_number: usize,
    pub data: ItemUploadRow,
    pub corrected_data: Option<ItemUploadRow>,

    // ===== 比对结果 =====
    pub action: RecordAction,
    pub existing_item: Option<ItemRecord>,
    pub category_id: Option<String>,

    // ===== 分类结果 =====
    pub usage_type: UsageType,
    pub classified_by: RuleStage,

    // ===== 数值字段（已解析）=====
    pub gsm: Option<f64>,
    pub size_mm: Option<f64>,

    // ===== 校验结果 =====
    pub validation_errors: Vec<String>,
    pub warnings: Vec<String>, // 非阻断提示
    pub category_error: bool,
    pub can_process: bool,
}

impl ParsedRecord {
    /// 实际生效的数据（有修正时取修正值）
    pub fn effective_data(&self) -> &ItemUploadRow {
        self.corrected_data.as_ref().unwrap_or(&self.data)
    }

    pub fn item_name(&self) -> &str {
        self.effective_data().item_name.as_deref().unwrap_or("")
    }

    /// 错误报告行: "Row N: err1; err2"
    pub fn error_line(&self) -> String {
        format!(
            "Row {}: {}",
            self.row_number,
            self.validation_errors.join("; ")
        )
    }

    /// 构造写入载荷（仅可处理记录有意义）
    pub fn to_item_fields(&self) -> Option<ItemFields> {
        let data = self.effective_data();
        Some(ItemFields {
            item_name: data.item_name.clone()?,
            category_id: self.category_id.clone()?,
            qualifier: data.qualifier.clone(),
            gsm: self.gsm,
            size_mm: self.size_mm,
            uom: data.uom.clone(),
            usage_type: self.usage_type,
            specifications: data.specifications.clone(),
        })
    }
}

// ==========================================
// UpsertSummary - 批次汇总
// ==========================================
// 红线: 计数只增不减
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub total: usize,
    pub updates: usize,           // 可处理记录中的 UPDATE
    pub inserts: usize,           // 可处理记录中的 INSERT
    pub errors: usize,            // 写入失败
    pub category_errors: usize,   // 分类无法解析
    pub validation_errors: usize, // 存在校验错误的行
    pub processed: usize,         // 写入成功
    pub classification_fallbacks: usize,
}

impl UpsertSummary {
    pub fn from_records(records: &[ParsedRecord]) -> Self {
        let mut summary = UpsertSummary {
            total: records.len(),
            ..Default::default()
        };

        for record in records {
            if record.can_process {
                match record.action {
                    RecordAction::Insert => summary.inserts += 1,
                    RecordAction::Update => summary.updates += 1,
                }
            } else {
                summary.validation_errors += 1;
            }
            if record.category_error {
                summary.category_errors += 1;
            }
            if record.classified_by == RuleStage::Fallback {
                summary.classification_fallbacks += 1;
            }
        }

        summary
    }

    /// 记录单行写入结果
    pub fn record_outcome(&mut self, success: bool) {
        if success {
            self.processed += 1;
        } else {
            self.errors += 1;
        }
    }
}

// ==========================================
// BatchOutcome - 批处理结果
// ==========================================
// 红线: success + errors.len() == 传入的可处理记录数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub success: usize,
    pub errors: Vec<String>, // "Row N: message"
    pub generated_codes: Vec<(usize, String)>, // (行号, 新物料编码)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(row_number: usize, action: RecordAction, errors: Vec<&str>) -> ParsedRecord {
        let validation_errors: Vec<String> = errors.into_iter().map(String::from).collect();
        ParsedRecord {
            row_number,
            data: ItemUploadRow {
                item_name: Some(format!("ITEM_{}", row_number)),
                ..Default::default()
            },
            corrected_data: None,
            action,
            existing_item: None,
            category_id: Some("cat-1".to_string()),
            usage_type: UsageType::RawMaterial,
            classified_by: RuleStage::Category,
            gsm: None,
            size_mm: None,
            can_process: validation_errors.is_empty(),
            validation_errors,
            warnings: Vec::new(),
            category_error: false,
        }
    }

    #[test]
    fn test_raw_record_lookup_and_blank() {
        let row = RawRecord::new(
            3,
            vec![
                ("Item Name".to_string(), "BOPP".to_string()),
                ("GSM".to_string(), "".to_string()),
            ],
        );
        assert_eq!(row.get("Item Name"), Some("BOPP"));
        assert_eq!(row.get("item name"), None);
        assert!(!row.is_blank());

        let blank = RawRecord::new(4, vec![("A".to_string(), "  ".to_string())]);
        assert!(blank.is_blank());
    }

    #[test]
    fn test_error_line_format() {
        let r = record(7, RecordAction::Insert, vec!["缺少物料名称", "分类未找到: Foo"]);
        assert_eq!(r.error_line(), "Row 7: 缺少物料名称; 分类未找到: Foo");
    }

    #[test]
    fn test_effective_data_prefers_correction() {
        let mut r = record(1, RecordAction::Insert, vec![]);
        assert_eq!(r.item_name(), "ITEM_1");
        r.corrected_data = Some(ItemUploadRow {
            item_name: Some("FIXED".to_string()),
            ..Default::default()
        });
        assert_eq!(r.item_name(), "FIXED");
    }

    #[test]
    fn test_summary_from_records() {
        let records = vec![
            record(1, RecordAction::Insert, vec![]),
            record(2, RecordAction::Update, vec![]),
            record(3, RecordAction::Insert, vec!["bad"]),
        ];
        let mut summary = UpsertSummary::from_records(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.inserts, 1);
        assert_eq!(summary.updates, 1);
        assert_eq!(summary.validation_errors, 1);
        assert_eq!(summary.processed, 0);

        summary.record_outcome(true);
        summary.record_outcome(false);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.errors, 1);
    }
}
