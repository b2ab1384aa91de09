// ==========================================
// 物料上传流程集成测试
// ==========================================
// 测试范围: 文件 → 预览 → 人工修正 → 写入 SQLite
// ==========================================

mod helpers;

use helpers::mock_config::MockConfig;
use master_data_sync::domain::item::ItemUploadRow;
use master_data_sync::domain::types::{ProgressStage, RecordAction, RuleStage, UsageType};
use master_data_sync::importer::{ImportError, ItemUploadPipeline, NoOpProgressSink, ProgressEvent};
use master_data_sync::logging;
use master_data_sync::repository::ItemRepository;
use test_helpers::{create_test_db, insert_existing_item, open_seeded_repo, write_csv};

const UPLOAD_CSV: &[&str] = &[
    "Item Name,Category,Qualifier,GSM,Size (mm),UOM,Usage Type",
    "BOPP Film 20mic,Raw Materials,,20,1000,KG,RM",
    "Choco Wrapper,Finished Goods,,,,PCS,finished",
    "Old Roll,Retired Stock,,,,KG,",
    "Cyan Ink,Inks,,,,KG,ink",
];

#[tokio::test]
async fn test_prepare_builds_preview_without_writing() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let repo = open_seeded_repo(&db_path).unwrap();
    insert_existing_item(&repo, "FIN-0001", "choco wrapper", "cat-fg")
        .await
        .unwrap();

    let csv = write_csv(UPLOAD_CSV).unwrap();
    let mut pipeline = ItemUploadPipeline::new(repo.clone());
    let preview = pipeline.prepare(csv.path()).await.unwrap();

    assert_eq!(preview.summary.total, 4);
    assert_eq!(preview.summary.inserts, 1);
    assert_eq!(preview.summary.updates, 1);
    assert_eq!(preview.summary.validation_errors, 2);
    assert_eq!(preview.summary.category_errors, 2);
    assert_eq!(
        preview.unmapped_categories,
        vec!["Retired Stock".to_string(), "Inks".to_string()]
    );

    let film = &preview.records[0];
    assert_eq!(film.row_number, 1);
    assert_eq!(film.action, RecordAction::Insert);
    assert_eq!(film.usage_type, UsageType::RawMaterial);
    assert_eq!(film.classified_by, RuleStage::Category);
    assert_eq!(film.gsm, Some(20.0));

    // 名称匹配不区分大小写
    let wrapper = &preview.records[1];
    assert_eq!(wrapper.action, RecordAction::Update);
    assert_eq!(
        wrapper.existing_item.as_ref().map(|i| i.item_code.as_str()),
        Some("FIN-0001")
    );

    let ink = &preview.records[3];
    assert!(!ink.can_process);
    assert!(ink.category_error);
    assert!(ink.validation_errors.iter().any(|e| e == "分类未找到: Inks"));

    // prepare 不写入
    let found = repo
        .find_items_by_names(&["BOPP Film 20mic".to_string()])
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_commit_writes_only_processable_records() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let repo = open_seeded_repo(&db_path).unwrap();
    insert_existing_item(&repo, "FIN-0001", "Choco Wrapper", "cat-fg")
        .await
        .unwrap();

    let csv = write_csv(UPLOAD_CSV).unwrap();
    let mut pipeline = ItemUploadPipeline::new(repo.clone());
    let preview = pipeline.prepare(csv.path()).await.unwrap();

    let mut events: Vec<ProgressEvent> = Vec::new();
    let mut sink = |event: &ProgressEvent| events.push(event.clone());
    let commit = pipeline.commit(&preview, &mut sink).await.unwrap();

    assert_eq!(commit.outcome.success, 2);
    assert!(commit.outcome.errors.is_empty());
    assert_eq!(
        commit.outcome.generated_codes,
        vec![(1, "RAW-1000X20-0001".to_string())]
    );
    assert_eq!(commit.summary.processed, 2);
    assert_eq!(commit.summary.errors, 0);
    assert_eq!(commit.summary.validation_errors, 2);

    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.stage == ProgressStage::Processing && e.total == 2));

    let names = vec![
        "BOPP Film 20mic".to_string(),
        "Choco Wrapper".to_string(),
        "Old Roll".to_string(),
        "Cyan Ink".to_string(),
    ];
    let mut stored = repo.find_items_by_names(&names).await.unwrap();
    stored.sort_by(|a, b| a.item_code.cmp(&b.item_code));

    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].item_code, "FIN-0001");
    assert_eq!(stored[0].usage_type, UsageType::FinishedGood);
    assert_eq!(stored[0].uom.as_deref(), Some("PCS"));
    assert_eq!(stored[1].item_code, "RAW-1000X20-0001");
    assert_eq!(stored[1].size_mm, Some(1000.0));
}

#[tokio::test]
async fn test_correction_makes_row_processable() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let repo = open_seeded_repo(&db_path).unwrap();

    let csv = write_csv(UPLOAD_CSV).unwrap();
    let mut pipeline = ItemUploadPipeline::new(repo.clone());
    let mut preview = pipeline.prepare(csv.path()).await.unwrap();
    assert_eq!(preview.summary.validation_errors, 2);

    let corrected = ItemUploadRow {
        item_name: Some("Cyan Ink".to_string()),
        category_name: Some("Raw Materials".to_string()),
        uom: Some("KG".to_string()),
        usage_type: Some("ink".to_string()),
        ..Default::default()
    };
    pipeline
        .apply_correction(&mut preview, 4, corrected)
        .await
        .unwrap();

    let ink = &preview.records[3];
    assert!(ink.can_process);
    assert_eq!(ink.row_number, 4);
    assert_eq!(ink.data.category_name.as_deref(), Some("Inks"));
    assert_eq!(
        ink.corrected_data.as_ref().and_then(|d| d.category_name.as_deref()),
        Some("Raw Materials")
    );
    assert_eq!(preview.summary.validation_errors, 1);
    assert_eq!(preview.summary.inserts, 3);

    let commit = pipeline.commit(&preview, &mut NoOpProgressSink).await.unwrap();
    assert_eq!(commit.outcome.success, 3);
    assert!(commit
        .outcome
        .generated_codes
        .iter()
        .any(|(row, code)| *row == 4 && code == "RAW-0001"));
}

#[tokio::test]
async fn test_correction_cannot_duplicate_another_row() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let repo = open_seeded_repo(&db_path).unwrap();

    let csv = write_csv(UPLOAD_CSV).unwrap();
    let mut pipeline = ItemUploadPipeline::new(repo.clone());
    let mut preview = pipeline.prepare(csv.path()).await.unwrap();

    // 第 4 行改名为第 1 行的物料
    let corrected = ItemUploadRow {
        item_name: Some("bopp film 20MIC".to_string()),
        category_name: Some("Raw Materials".to_string()),
        ..Default::default()
    };
    pipeline
        .apply_correction(&mut preview, 4, corrected)
        .await
        .unwrap();

    let renamed = &preview.records[3];
    assert!(!renamed.can_process);
    assert!(renamed
        .validation_errors
        .iter()
        .any(|e| e.contains("第 1 行重复")));

    let commit = pipeline.commit(&preview, &mut NoOpProgressSink).await.unwrap();
    assert_eq!(commit.outcome.success, 2);
    let stored = repo
        .find_items_by_names(&["BOPP Film 20mic".to_string()])
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_correction_of_unknown_row_is_rejected() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let repo = open_seeded_repo(&db_path).unwrap();

    let csv = write_csv(UPLOAD_CSV).unwrap();
    let mut pipeline = ItemUploadPipeline::new(repo);
    let mut preview = pipeline.prepare(csv.path()).await.unwrap();

    let result = pipeline
        .apply_correction(&mut preview, 99, ItemUploadRow::default())
        .await;
    assert!(matches!(result, Err(ImportError::InternalError(_))));
}

#[tokio::test]
async fn test_configured_fallback_usage_type() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let repo = open_seeded_repo(&db_path).unwrap();

    let csv = write_csv(&["Item Name,Category,Usage Type", "Mystery Thing,Packaging,???"]).unwrap();

    // 分类 "Packaging" 命中分类规则，不走兜底
    let config = MockConfig::with_fallback(UsageType::Consumable);
    let mut pipeline = ItemUploadPipeline::from_config(repo.clone(), &config)
        .await
        .unwrap();
    let preview = pipeline.prepare(csv.path()).await.unwrap();
    assert_eq!(preview.records[0].usage_type, UsageType::Packaging);
    assert_eq!(preview.summary.classification_fallbacks, 0);

    // 三阶段均未命中 → 配置的兜底值 + 非阻断提示
    let csv = write_csv(&["Item Name,Category,Usage Type", "Mystery Thing,General Stores,???"]).unwrap();
    let preview = pipeline.prepare(csv.path()).await.unwrap();
    let record = &preview.records[0];
    assert_eq!(record.usage_type, UsageType::Consumable);
    assert_eq!(record.classified_by, RuleStage::Fallback);
    assert!(record.can_process);
    assert!(!record.warnings.is_empty());
    assert_eq!(preview.summary.classification_fallbacks, 1);

    let broken = MockConfig::broken();
    let result = ItemUploadPipeline::from_config(repo, &broken).await;
    assert!(matches!(result, Err(ImportError::ConfigReadError(_))));
}

#[tokio::test]
async fn test_unsupported_file_is_fatal() {
    logging::init_test();
    let (_temp_file, db_path) = create_test_db().unwrap();
    let repo = open_seeded_repo(&db_path).unwrap();

    let mut pipeline = ItemUploadPipeline::new(repo);
    let result = pipeline
        .prepare(std::path::Path::new("/nonexistent/items.csv"))
        .await;
    assert!(result.is_err());
}
