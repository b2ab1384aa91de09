// ==========================================
// 物料主数据同步系统 - 报告生成
// ==========================================
// 职责: 校验报告 / 冲突报告 / 导入审计 (纯文本) + 行错误 CSV
// 约定: 每个失败行必须包含行号与错误列表
// ==========================================

use crate::domain::item::{BatchOutcome, ParsedRecord, UpsertSummary};
use crate::domain::legacy::{ConflictAnalysis, LegacyImportResult, RowRejection};
use crate::domain::types::DetailStatus;
use crate::importer::error::{ImportError, ImportResult};
use std::fmt::Write as _;

/// 物料上传校验报告
pub fn validation_report(
    records: &[ParsedRecord],
    summary: &UpsertSummary,
    unmapped_categories: &[String],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== 物料上传校验报告 ===");
    let _ = writeln!(out, "总行数: {}", summary.total);
    let _ = writeln!(
        out,
        "新增: {}  更新: {}  校验失败: {}  分类错误: {}  兜底分类: {}",
        summary.inserts,
        summary.updates,
        summary.validation_errors,
        summary.category_errors,
        summary.classification_fallbacks
    );
    if summary.processed + summary.errors > 0 {
        let _ = writeln!(
            out,
            "已写入: {}  写入失败: {}",
            summary.processed, summary.errors
        );
    }

    if !unmapped_categories.is_empty() {
        let _ = writeln!(out, "未映射分类: {}", unmapped_categories.join(", "));
    }

    let failing: Vec<&ParsedRecord> = records.iter().filter(|r| !r.can_process).collect();
    if !failing.is_empty() {
        let _ = writeln!(out, "\n--- 校验错误 ---");
        for record in failing {
            let _ = writeln!(out, "{}", record.error_line());
        }
    }

    let warned: Vec<&ParsedRecord> = records.iter().filter(|r| !r.warnings.is_empty()).collect();
    if !warned.is_empty() {
        let _ = writeln!(out, "\n--- 提示 ---");
        for record in warned {
            let _ = writeln!(
                out,
                "Row {}: {}",
                record.row_number,
                record.warnings.join("; ")
            );
        }
    }

    out
}

/// 批处理结果报告
pub fn batch_report(outcome: &BatchOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== 批处理结果 ===");
    let _ = writeln!(
        out,
        "成功: {}  失败: {}",
        outcome.success,
        outcome.errors.len()
    );
    for (row_number, code) in &outcome.generated_codes {
        let _ = writeln!(out, "Row {}: 新物料编码 {}", row_number, code);
    }
    for error in &outcome.errors {
        let _ = writeln!(out, "{}", error);
    }
    out
}

/// 历史库存冲突报告
pub fn conflict_report(analysis: &ConflictAnalysis, rejected: &[RowRejection]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== 历史库存冲突分析 ===");
    let _ = writeln!(
        out,
        "分析时间: {}",
        analysis.analyzed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(
        out,
        "可导入(missing): {}  冲突(conflicts): {}  一致(identical): {}  无法解析: {}",
        analysis.missing.len(),
        analysis.conflicts.len(),
        analysis.identical.len(),
        rejected.len()
    );

    if !analysis.conflicts.is_empty() {
        let _ = writeln!(out, "\n--- 冲突明细 ---");
        for conflict in &analysis.conflicts {
            let _ = writeln!(
                out,
                "Row {}: {} 历史={} 当前={} 差异={:+}",
                conflict.row_number,
                conflict.item_code,
                conflict.legacy_qty,
                conflict.existing_qty,
                conflict.difference
            );
        }
    }

    if !rejected.is_empty() {
        let _ = writeln!(out, "\n--- 无法解析的行 ---");
        for rejection in rejected {
            let _ = writeln!(out, "Row {}: {}", rejection.row_number, rejection.message);
        }
    }

    out
}

/// 导入审计记录
pub fn import_audit_report(result: &LegacyImportResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== 历史库存导入审计 ===");
    let _ = writeln!(out, "批次: {}", result.batch_id);
    let _ = writeln!(out, "模式: {}", result.mode);
    let _ = writeln!(
        out,
        "导入: {}  失败: {}  跳过(一致): {}  未导入冲突: {}",
        result.imported,
        result.failed(),
        result.skipped,
        result.conflicts
    );

    if !result.details.is_empty() {
        let _ = writeln!(out, "\n--- 明细 ---");
    }
    for detail in &result.details {
        match detail.status {
            DetailStatus::Imported => {
                let _ = writeln!(
                    out,
                    "Row {}: {} qty={} {} {}",
                    detail.row_number,
                    detail.item_code,
                    detail.qty,
                    detail.status,
                    detail.generated_reference.as_deref().unwrap_or("-")
                );
            }
            DetailStatus::Failed => {
                let _ = writeln!(
                    out,
                    "Row {}: {} qty={} {} {}",
                    detail.row_number,
                    detail.item_code,
                    detail.qty,
                    detail.status,
                    detail.error.as_deref().unwrap_or("未知错误")
                );
            }
        }
    }
    out
}

fn csv_error(e: impl std::fmt::Display) -> ImportError {
    ImportError::InternalError(format!("CSV 报告生成失败: {}", e))
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> ImportResult<String> {
    let bytes = writer.into_inner().map_err(csv_error)?;
    String::from_utf8(bytes).map_err(csv_error)
}

/// 行错误 CSV（row_number, item_name, errors）
pub fn row_errors_csv(records: &[ParsedRecord]) -> ImportResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["row_number", "item_name", "errors"])?;

    for record in records.iter().filter(|r| !r.can_process) {
        writer.write_record([
            record.row_number.to_string(),
            record.item_name().to_string(),
            record.validation_errors.join("; "),
        ])?;
    }

    finish_csv(writer)
}

/// 导入明细 CSV（审计留档）
pub fn import_details_csv(result: &LegacyImportResult) -> ImportResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "batch_id",
        "row_number",
        "item_code",
        "qty",
        "status",
        "reference",
        "error",
    ])?;

    for detail in &result.details {
        writer.write_record([
            result.batch_id.clone(),
            detail.row_number.to_string(),
            detail.item_code.clone(),
            detail.qty.to_string(),
            detail.status.to_string(),
            detail.generated_reference.clone().unwrap_or_default(),
            detail.error.clone().unwrap_or_default(),
        ])?;
    }

    finish_csv(writer)
}
