// ==========================================
// 物料主数据同步系统 - 领域类型定义
// ==========================================
// 职责: 封闭枚举（用途类型 / 处理动作 / 阶段）
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 用途类型 (Usage Type)
// ==========================================
// 红线: 没有 UNKNOWN，每次分类必须落到五类之一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageType {
    RawMaterial,  // 原材料
    FinishedGood, // 成品
    Wip,          // 在制品
    Packaging,    // 包装材料
    Consumable,   // 消耗品/备件
}

impl UsageType {
    pub const ALL: [UsageType; 5] = [
        UsageType::RawMaterial,
        UsageType::FinishedGood,
        UsageType::Wip,
        UsageType::Packaging,
        UsageType::Consumable,
    ];

    /// 数据库/文件中的规范写法
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::RawMaterial => "RAW_MATERIAL",
            UsageType::FinishedGood => "FINISHED_GOOD",
            UsageType::Wip => "WIP",
            UsageType::Packaging => "PACKAGING",
            UsageType::Consumable => "CONSUMABLE",
        }
    }
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UsageType {
    type Err = String;

    /// 只接受规范名称（大小写、空格、下划线、连字符不敏感）
    ///
    /// 自由文本别名由分类器处理，不在这里
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match key.as_str() {
            "RAWMATERIAL" => Ok(UsageType::RawMaterial),
            "FINISHEDGOOD" => Ok(UsageType::FinishedGood),
            "WIP" => Ok(UsageType::Wip),
            "PACKAGING" => Ok(UsageType::Packaging),
            "CONSUMABLE" => Ok(UsageType::Consumable),
            _ => Err(format!("未知用途类型: {}", s)),
        }
    }
}

// ==========================================
// 处理动作 (Record Action)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordAction {
    Insert, // 新物料
    Update, // 更新已有物料
}

impl fmt::Display for RecordAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordAction::Insert => write!(f, "INSERT"),
            RecordAction::Update => write!(f, "UPDATE"),
        }
    }
}

// ==========================================
// 分类命中阶段 (Rule Stage)
// ==========================================
// 优先级: 分类名 > 物料名模式 > 标签同义词 > 兜底
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStage {
    Category,
    ItemNamePattern,
    LabelSynonym,
    Fallback, // 没有任何规则命中
}

impl fmt::Display for RuleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleStage::Category => write!(f, "CATEGORY"),
            RuleStage::ItemNamePattern => write!(f, "ITEM_NAME_PATTERN"),
            RuleStage::LabelSynonym => write!(f, "LABEL_SYNONYM"),
            RuleStage::Fallback => write!(f, "FALLBACK"),
        }
    }
}

// ==========================================
// 进度阶段 (Progress Stage)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    Analyzing,
    Processing,
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressStage::Analyzing => write!(f, "analyzing"),
            ProgressStage::Processing => write!(f, "processing"),
        }
    }
}

// ==========================================
// 历史库存对账阶段 (Reconcile Stage)
// ==========================================
// 顺序: UPLOAD → ANALYSIS → IMPORT → RESULTS，只能通过 reset 回到 UPLOAD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileStage {
    Upload,
    Analysis,
    Import,
    Results,
}

impl fmt::Display for ReconcileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileStage::Upload => write!(f, "UPLOAD"),
            ReconcileStage::Analysis => write!(f, "ANALYSIS"),
            ReconcileStage::Import => write!(f, "IMPORT"),
            ReconcileStage::Results => write!(f, "RESULTS"),
        }
    }
}

// ==========================================
// 导入模式 (Import Mode)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportMode {
    Safe,   // 仅导入 missing
    Forced, // missing + conflicts，以历史数量覆盖
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Safe => write!(f, "SAFE"),
            ImportMode::Forced => write!(f, "FORCED"),
        }
    }
}

// ==========================================
// 明细状态 (Detail Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailStatus {
    Imported,
    Failed,
}

impl fmt::Display for DetailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetailStatus::Imported => write!(f, "imported"),
            DetailStatus::Failed => write!(f, "failed"),
        }
    }
}
