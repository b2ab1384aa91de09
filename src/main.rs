// ==========================================
// 物料主数据同步系统 - 命令行入口
// ==========================================
// 用法:
//   master-data-sync upload <file> [--dry-run] [--errors-csv <path>]
//   master-data-sync legacy <file> [--force] [--dry-run] [--audit-csv <path>]
//   master-data-sync classify <label> [category] [item_name]
//   master-data-sync config show | set <key> <value>
//
// 数据库: MASTER_DATA_SYNC_DB_PATH 或用户数据目录
// ==========================================

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use master_data_sync::config::ConfigManager;
use master_data_sync::db::{default_db_path, init_schema, open_sqlite_connection, read_schema_version};
use master_data_sync::domain::types::ImportMode;
use master_data_sync::importer::report;
use master_data_sync::importer::{
    validate_category_usage_type_logic, FieldMapper, FileParser, ItemUploadPipeline,
    LegacyReconciler, ProgressEvent, ReconcileSettings, UniversalFileParser, UsageClassifier,
};
use master_data_sync::logging;
use master_data_sync::repository::SqliteMasterDataRepository;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// 物料主数据同步: 物料上传 / 历史库存对账 / 用途分类
#[derive(Debug, Parser)]
#[command(name = "master-data-sync")]
#[command(about = "物料主数据对账与分类引擎")]
#[command(version)]
struct Cli {
    /// 以 JSON 格式输出日志
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 上传物料主数据（校验、分类、新增/更新）
    Upload {
        /// 表格文件（.csv/.xlsx/.xls）
        file: PathBuf,

        /// 只生成校验报告，不写入
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// 行错误 CSV 输出路径
        #[arg(long)]
        errors_csv: Option<PathBuf>,
    },

    /// 导入历史库存（冲突分析 + 安全/强制导入）
    Legacy {
        /// 表格文件（.csv/.xlsx/.xls）
        file: PathBuf,

        /// 强制导入：冲突行以历史数量覆盖
        #[arg(long, default_value_t = false)]
        force: bool,

        /// 只生成冲突报告，不写入
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// 导入明细 CSV 输出路径
        #[arg(long)]
        audit_csv: Option<PathBuf>,
    },

    /// 对单个标签做用途分类
    Classify {
        /// 源文件中的用途标签
        label: String,

        /// 分类名称
        category: Option<String>,

        /// 物料名称
        item_name: Option<String>,
    },

    /// 查看或修改导入配置
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// 输出生效配置（JSON）
    Show,

    /// 写入一个配置键
    Set { key: String, value: String },
}

/// 打开记录库（共享一个连接）
fn open_store() -> Result<(Arc<SqliteMasterDataRepository>, ConfigManager)> {
    let db_path = default_db_path();
    info!(db_path = %db_path, "使用数据库");

    let conn = open_sqlite_connection(&db_path)
        .with_context(|| format!("无法打开数据库: {}", db_path))?;
    init_schema(&conn)?;
    debug!(schema_version = ?read_schema_version(&conn)?, "schema 就绪");

    let conn = Arc::new(Mutex::new(conn));
    let repo = Arc::new(SqliteMasterDataRepository::from_connection(conn.clone()));
    let config = ConfigManager::from_connection(conn).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok((repo, config))
}

fn log_progress(event: &ProgressEvent) {
    debug!(
        current = event.current,
        total = event.total,
        stage = %event.stage,
        record = ?event.current_record,
        "进度"
    );
}

async fn run_upload(file: &Path, dry_run: bool, errors_csv: Option<&Path>) -> Result<()> {
    let (repo, config) = open_store()?;

    let mut pipeline = ItemUploadPipeline::from_config(repo, &config).await?;
    let preview = pipeline.prepare(file).await?;
    print!(
        "{}",
        report::validation_report(
            &preview.records,
            &preview.summary,
            &preview.unmapped_categories
        )
    );

    if let Some(path) = errors_csv {
        std::fs::write(path, report::row_errors_csv(&preview.records)?)
            .with_context(|| format!("无法写入 {}", path.display()))?;
        info!(path = %path.display(), "行错误 CSV 已写出");
    }

    if dry_run {
        info!("dry-run: 不写入记录库");
        return Ok(());
    }

    let mut sink = log_progress;
    let commit = pipeline.commit(&preview, &mut sink).await?;
    println!();
    print!("{}", report::batch_report(&commit.outcome));
    println!(
        "\n已写入: {}  写入失败: {}  校验失败: {}",
        commit.summary.processed, commit.summary.errors, commit.summary.validation_errors
    );
    Ok(())
}

async fn run_legacy(file: &Path, force: bool, dry_run: bool, audit_csv: Option<&Path>) -> Result<()> {
    let (repo, config) = open_store()?;

    let raw_records = UniversalFileParser.parse_to_raw_records(file)?;
    let mapped = FieldMapper.map_legacy_rows(&raw_records);

    let settings = ReconcileSettings::load(&config).await?;
    let mut reconciler = LegacyReconciler::new(repo, settings);

    let mut sink = log_progress;
    let analysis = reconciler.analyze(mapped.rows, &mut sink).await?;
    print!("{}", report::conflict_report(&analysis, &mapped.rejected));

    if dry_run {
        info!("dry-run: 不写入记录库");
        return Ok(());
    }

    let mode = if force {
        ImportMode::Forced
    } else {
        ImportMode::Safe
    };
    let result = reconciler.import(mode, &mut sink).await?;
    println!();
    print!("{}", report::import_audit_report(&result));

    if let Some(path) = audit_csv {
        std::fs::write(path, report::import_details_csv(&result)?)
            .with_context(|| format!("无法写入 {}", path.display()))?;
        info!(path = %path.display(), "导入明细 CSV 已写出");
    }
    Ok(())
}

fn run_classify(label: &str, category: Option<&str>, item_name: Option<&str>) -> Result<()> {
    let category = category.filter(|s| !s.trim().is_empty());
    let item_name = item_name.filter(|s| !s.trim().is_empty());

    let result = UsageClassifier::new().classify_detailed(label, category, item_name);
    println!(
        "{}\t{}\t{}",
        result.usage_type,
        result.stage,
        result.rule.unwrap_or("-")
    );

    if let Some(category) = category {
        if let Some(warning) = validate_category_usage_type_logic(category, result.usage_type, item_name) {
            println!("提示: {}", warning);
        }
    }
    Ok(())
}

fn run_config(action: ConfigAction) -> Result<()> {
    let (_, config) = open_store()?;
    match action {
        ConfigAction::Show => {}
        ConfigAction::Set { key, value } => {
            config
                .set_config_value(&key, &value)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            info!(key = %key, value = %value, "配置已写入");
        }
    }

    let snapshot = config
        .get_config_snapshot()
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    println!("{}", snapshot);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }
    debug!("{} v{}", master_data_sync::APP_NAME, master_data_sync::VERSION);

    match cli.command {
        Commands::Upload {
            file,
            dry_run,
            errors_csv,
        } => run_upload(&file, dry_run, errors_csv.as_deref()).await,
        Commands::Legacy {
            file,
            force,
            dry_run,
            audit_csv,
        } => run_legacy(&file, force, dry_run, audit_csv.as_deref()).await,
        Commands::Classify {
            label,
            category,
            item_name,
        } => run_classify(&label, category.as_deref(), item_name.as_deref()),
        Commands::Config { action } => run_config(action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_legacy_flags_parse() {
        let cli = Cli::try_parse_from(["master-data-sync", "legacy", "stock.csv", "--force", "--audit-csv", "out.csv"])
            .unwrap();
        match cli.command {
            Commands::Legacy {
                file,
                force,
                dry_run,
                audit_csv,
            } => {
                assert_eq!(file, PathBuf::from("stock.csv"));
                assert!(force);
                assert!(!dry_run);
                assert_eq!(audit_csv, Some(PathBuf::from("out.csv")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_misspelled_flag_is_rejected() {
        // 拼错的开关不能被静默忽略
        assert!(Cli::try_parse_from(["master-data-sync", "legacy", "stock.csv", "--dry-rnu"]).is_err());
        assert!(Cli::try_parse_from(["master-data-sync", "legacy", "stock.csv", "--froce"]).is_err());
        assert!(Cli::try_parse_from(["master-data-sync", "upload"]).is_err());
    }

    #[test]
    fn test_classify_optional_positionals() {
        let cli = Cli::try_parse_from(["master-data-sync", "classify", "wrapper", "BOPP Stock", "--json-logs"]).unwrap();
        assert!(cli.json_logs);
        match cli.command {
            Commands::Classify {
                label,
                category,
                item_name,
            } => {
                assert_eq!(label, "wrapper");
                assert_eq!(category.as_deref(), Some("BOPP Stock"));
                assert_eq!(item_name, None);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_config_set_takes_key_and_value() {
        let cli = Cli::try_parse_from(["master-data-sync", "config", "set", "legacy.source", "MIGRATION"]).unwrap();
        match cli.command {
            Commands::Config {
                action: ConfigAction::Set { key, value },
            } => {
                assert_eq!(key, "legacy.source");
                assert_eq!(value, "MIGRATION");
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(Cli::try_parse_from(["master-data-sync", "config", "set", "legacy.source"]).is_err());
    }
}
