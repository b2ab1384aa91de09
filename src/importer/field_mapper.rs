// ==========================================
// 物料主数据同步系统 - 字段映射器实现
// ==========================================
// 职责: 源列名 → 标准字段（大小写/标点不敏感 + 别名）
// 输出: ItemUploadRow（物料上传）/ LegacyRow（历史库存）
// ==========================================

use crate::domain::item::{ItemUploadRow, RawRecord};
use crate::domain::legacy::{LegacyRow, MappedLegacyRows, RowRejection};
use tracing::{debug, warn};

// ==========================================
// 标准字段与别名表
// ==========================================
// 别名以归一化形式书写（小写、去掉空格和标点）
const ITEM_NAME_ALIASES: &[&str] = &["itemname", "name", "item", "materialname", "description"];
const CATEGORY_NAME_ALIASES: &[&str] = &["categoryname", "category", "itemcategory"];
const QUALIFIER_ALIASES: &[&str] = &["qualifier", "grade", "variant"];
const GSM_ALIASES: &[&str] = &["gsm", "grammage", "gsmgm2"];
const SIZE_MM_ALIASES: &[&str] = &["sizemm", "size", "width", "widthmm"];
const UOM_ALIASES: &[&str] = &["uom", "unit", "unitofmeasure", "units"];
const USAGE_TYPE_ALIASES: &[&str] = &["usagetype", "usage", "type", "itemtype"];
const SPECIFICATIONS_ALIASES: &[&str] = &["specifications", "specification", "specs", "spec"];

const ITEM_CODE_ALIASES: &[&str] = &["itemcode", "code", "itemid", "sku", "materialcode"];
const CURRENT_QTY_ALIASES: &[&str] = &[
    "currentqty",
    "qty",
    "quantity",
    "currentquantity",
    "currentstock",
    "stock",
    "balance",
    "openingqty",
];
const REMARKS_ALIASES: &[&str] = &["remarks", "remark", "notes", "note", "comments", "comment"];

/// 列名归一化: 小写 + 仅保留字母数字
///
/// "Current Qty" / "current_qty" / "CURRENT-QTY" → "currentqty"
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// 解析数量（允许千分位逗号）
pub fn parse_quantity(value: &str) -> Option<f64> {
    let cleaned: String = value.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub struct FieldMapper;

impl FieldMapper {
    /// 按别名顺序取第一个非空值
    ///
    /// 别名顺序即优先级：同一行同时有 "Item Name" 与 "Name" 时取前者
    fn get_string(&self, row: &RawRecord, aliases: &[&str]) -> Option<String> {
        for alias in aliases {
            let hit = row
                .cells
                .iter()
                .filter(|(header, _)| normalize_header(header) == *alias)
                .map(|(_, value)| value.trim())
                .find(|value| !value.is_empty());

            if let Some(value) = hit {
                return Some(value.to_string());
            }
        }
        None
    }

    /// RawRecord → ItemUploadRow
    pub fn map_to_item_row(&self, row: &RawRecord) -> ItemUploadRow {
        ItemUploadRow {
            item_name: self.get_string(row, ITEM_NAME_ALIASES),
            category_name: self.get_string(row, CATEGORY_NAME_ALIASES),
            qualifier: self.get_string(row, QUALIFIER_ALIASES),
            gsm: self.get_string(row, GSM_ALIASES),
            size_mm: self.get_string(row, SIZE_MM_ALIASES),
            uom: self.get_string(row, UOM_ALIASES),
            usage_type: self.get_string(row, USAGE_TYPE_ALIASES),
            specifications: self.get_string(row, SPECIFICATIONS_ALIASES),
        }
    }

    /// RawRecord → LegacyRow
    ///
    /// # 返回
    /// - Err(message): 缺少 item_code 或数量无法解析
    pub fn map_to_legacy_row(&self, row: &RawRecord) -> Result<LegacyRow, String> {
        let item_code = self
            .get_string(row, ITEM_CODE_ALIASES)
            .ok_or_else(|| "缺少物料编码 (item_code)".to_string())?;

        let raw_qty = self
            .get_string(row, CURRENT_QTY_ALIASES)
            .ok_or_else(|| format!("物料 {} 缺少数量 (current_qty)", item_code))?;

        let current_qty = parse_quantity(&raw_qty)
            .ok_or_else(|| format!("物料 {} 的数量无法解析为数字: {}", item_code, raw_qty))?;

        Ok(LegacyRow {
            row_number: row.row_number,
            item_code,
            current_qty,
            remarks: self.get_string(row, REMARKS_ALIASES),
        })
    }

    /// 批量映射历史库存行，失败行进入 rejected（不静默丢弃）
    pub fn map_legacy_rows(&self, rows: &[RawRecord]) -> MappedLegacyRows {
        let mut mapped = MappedLegacyRows::default();

        for row in rows {
            match self.map_to_legacy_row(row) {
                Ok(legacy) => mapped.rows.push(legacy),
                Err(message) => {
                    warn!(row_number = row.row_number, error = %message, "历史库存行映射失败");
                    mapped.rejected.push(RowRejection {
                        row_number: row.row_number,
                        message,
                    });
                }
            }
        }

        debug!(
            accepted = mapped.rows.len(),
            rejected = mapped.rejected.len(),
            "历史库存行映射完成"
        );
        mapped
    }
}
