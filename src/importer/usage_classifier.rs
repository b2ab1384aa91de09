// ==========================================
// 物料主数据同步系统 - 用途类型分类器
// ==========================================
// 职责: (源标签, 分类名, 物料名) → UsageType
// 优先级: 分类名规则 > 物料名模式 > 标签同义词 > 兜底
// 红线: 全函数、确定性；分类名含 cylinder 时必为 CONSUMABLE
// ==========================================
// 规则是数据: 有序的 (匹配器, 结果) 列表，由 dispatch 统一遍历，先命中者胜
// ==========================================

use crate::domain::types::{RuleStage, UsageType};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// 统一文本归一化（所有阶段共用）
///
/// TRIM + 小写；`_` `-` `/` 视为空格；连续空白折叠
pub fn normalize_text(value: &str) -> String {
    value
        .to_lowercase()
        .replace(['_', '-', '/'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 按词边界判断包含（允许复数 s/es）
fn contains_term(haystack: &str, term: &str) -> bool {
    let padded = format!(" {} ", haystack);
    ["", "s", "es"]
        .iter()
        .any(|suffix| padded.contains(&format!(" {}{} ", term, suffix)))
}

// ==========================================
// 分类输入（已归一化）
// ==========================================
pub struct ClassifyInput<'a> {
    label: String,
    category: Option<String>,
    item_name_raw: Option<&'a str>,
    item_name: Option<String>,
}

impl<'a> ClassifyInput<'a> {
    pub fn new(raw_label: &str, category_name: Option<&str>, item_name: Option<&'a str>) -> Self {
        let non_empty = |v: Option<&str>| v.map(normalize_text).filter(|v| !v.is_empty());
        let item_name_raw = item_name.map(str::trim).filter(|v| !v.is_empty());

        Self {
            label: normalize_text(raw_label),
            category: non_empty(category_name),
            item_name_raw,
            item_name: non_empty(item_name),
        }
    }
}

/// 反向包含只认词首，"finished" 不能命中 "semi finished"
fn is_word_prefix(prefix: &str, key: &str) -> bool {
    match key.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(' '),
        None => false,
    }
}

// ==========================================
// 规则定义
// ==========================================
#[derive(Debug, Clone)]
pub enum RuleMatcher {
    /// 分类名包含关键字，或分类名是关键字的词首（"Raw" → "raw material"）
    CategoryContains(&'static str),
    /// 物料名正则（原始物料名，大小写不敏感）
    ItemNamePattern(Regex),
    /// 标签等于或按词包含同义词
    LabelSynonym(&'static str),
    /// 标签含 label，且分类名或物料名含任一上下文关键字
    LabelWithContext {
        label: &'static str,
        context: &'static [&'static str],
    },
}

#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub name: &'static str,
    pub matcher: RuleMatcher,
    pub usage_type: UsageType,
}

impl ClassificationRule {
    pub fn new(name: &'static str, matcher: RuleMatcher, usage_type: UsageType) -> Self {
        Self {
            name,
            matcher,
            usage_type,
        }
    }

    pub fn stage(&self) -> RuleStage {
        match self.matcher {
            RuleMatcher::CategoryContains(_) => RuleStage::Category,
            RuleMatcher::ItemNamePattern(_) => RuleStage::ItemNamePattern,
            RuleMatcher::LabelSynonym(_) | RuleMatcher::LabelWithContext { .. } => {
                RuleStage::LabelSynonym
            }
        }
    }

    pub fn matches(&self, input: &ClassifyInput<'_>) -> bool {
        match &self.matcher {
            RuleMatcher::CategoryContains(key) => match input.category.as_deref() {
                Some(category) => category.contains(key) || is_word_prefix(category, key),
                None => false,
            },
            RuleMatcher::ItemNamePattern(pattern) => input
                .item_name_raw
                .map(|name| pattern.is_match(name))
                .unwrap_or(false),
            RuleMatcher::LabelSynonym(key) => {
                !input.label.is_empty() && (input.label == *key || contains_term(&input.label, key))
            }
            RuleMatcher::LabelWithContext { label, context } => {
                if !contains_term(&input.label, label) {
                    return false;
                }
                [input.category.as_deref(), input.item_name.as_deref()]
                    .into_iter()
                    .flatten()
                    .any(|text| context.iter().any(|token| text.contains(token)))
            }
        }
    }
}

/// 分类结果（兜底命中可单独报告）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub usage_type: UsageType,
    pub stage: RuleStage,
    pub rule: Option<&'static str>,
}

impl Classification {
    pub fn is_fallback(&self) -> bool {
        self.stage == RuleStage::Fallback
    }
}

// ==========================================
// 默认规则表
// ==========================================
const WRAPPER_RAW_CONTEXT: &[&str] = &["bopp", "ldpe", "film", "laminate", "stiffener"];
const WRAPPER_FINISHED_CONTEXT: &[&str] = &["finished", "final", "soap", "ready"];

const CATEGORY_TABLE: &[(&str, UsageType)] = &[
    ("cylinder", UsageType::Consumable),
    ("semi finished", UsageType::Wip),
    ("work in progress", UsageType::Wip),
    ("wip", UsageType::Wip),
    ("raw material", UsageType::RawMaterial),
    ("finished good", UsageType::FinishedGood),
    ("packaging", UsageType::Packaging),
    ("consumable", UsageType::Consumable),
    ("spare", UsageType::Consumable),
];

const SYNONYM_TABLE: &[(&str, UsageType)] = &[
    // 规范名称
    ("raw material", UsageType::RawMaterial),
    ("rm", UsageType::RawMaterial),
    ("semi finished", UsageType::Wip),
    ("work in progress", UsageType::Wip),
    ("wip", UsageType::Wip),
    ("finished good", UsageType::FinishedGood),
    ("finished", UsageType::FinishedGood),
    ("fg", UsageType::FinishedGood),
    ("packaging", UsageType::Packaging),
    ("consumable", UsageType::Consumable),
    // 成品别名
    ("flowrap", UsageType::FinishedGood),
    ("flow wrap", UsageType::FinishedGood),
    ("pouch", UsageType::FinishedGood),
    // 原材料别名
    ("lamination", UsageType::RawMaterial),
    ("laminate", UsageType::RawMaterial),
    ("coating", UsageType::RawMaterial),
    ("adhesive", UsageType::RawMaterial),
    ("film", UsageType::RawMaterial),
    ("paper", UsageType::RawMaterial),
    ("ink", UsageType::RawMaterial),
    ("chemical", UsageType::RawMaterial),
    ("solvent", UsageType::RawMaterial),
    ("hotmelt", UsageType::RawMaterial),
    ("hot melt", UsageType::RawMaterial),
    ("stiffener", UsageType::RawMaterial),
    ("resin", UsageType::RawMaterial),
    // 包装别名
    ("packing", UsageType::Packaging),
    ("box", UsageType::Packaging),
    ("carton", UsageType::Packaging),
    ("corrugated", UsageType::Packaging),
    // 消耗品别名
    ("cylinder", UsageType::Consumable),
    ("spare", UsageType::Consumable),
    ("spare part", UsageType::Consumable),
    ("tooling", UsageType::Consumable),
    ("tool", UsageType::Consumable),
    ("machine", UsageType::Consumable),
    ("maintenance", UsageType::Consumable),
    ("blade", UsageType::Consumable),
];

fn name_pattern(pattern: &str) -> Regex {
    Regex::new(pattern).expect("物料名模式为静态正则")
}

/// 默认规则表（按阶段有序）
pub fn default_rules() -> Vec<ClassificationRule> {
    let mut rules = Vec::new();

    // 1. 分类名
    for &(key, usage) in CATEGORY_TABLE {
        rules.push(ClassificationRule::new(
            key,
            RuleMatcher::CategoryContains(key),
            usage,
        ));
    }

    // 2. 物料名模式（组内顺序: 原材料 → 成品 → 消耗品）
    rules.push(ClassificationRule::new(
        "name:raw_material",
        RuleMatcher::ItemNamePattern(name_pattern(
            r"(?i)(^|[_\s-])(film|laminate|lamination|ink|solvent|adhesive|chemical|hot_?melt|stiffener|bopp|ldpe)([_\s-]|$)",
        )),
        UsageType::RawMaterial,
    ));
    rules.push(ClassificationRule::new(
        "name:finished_good",
        RuleMatcher::ItemNamePattern(name_pattern(
            r"(?i)(^(finished|final)([_\s-]|$))|((^|[_\s-])(wrapper|flowrap|flow_wrap)([_\s-]|$))",
        )),
        UsageType::FinishedGood,
    ));
    rules.push(ClassificationRule::new(
        "name:consumable",
        RuleMatcher::ItemNamePattern(name_pattern(
            r"(?i)^(cylinder|spare|maintenance)([_\s-]|$)",
        )),
        UsageType::Consumable,
    ));

    // 3. 标签: wrapper 有歧义，先看上下文
    rules.push(ClassificationRule::new(
        "wrapper:raw_film",
        RuleMatcher::LabelWithContext {
            label: "wrapper",
            context: WRAPPER_RAW_CONTEXT,
        },
        UsageType::RawMaterial,
    ));
    rules.push(ClassificationRule::new(
        "wrapper:finished",
        RuleMatcher::LabelWithContext {
            label: "wrapper",
            context: WRAPPER_FINISHED_CONTEXT,
        },
        UsageType::FinishedGood,
    ));
    rules.push(ClassificationRule::new(
        "wrapper",
        RuleMatcher::LabelSynonym("wrapper"),
        UsageType::FinishedGood,
    ));

    for &(key, usage) in SYNONYM_TABLE {
        rules.push(ClassificationRule::new(
            key,
            RuleMatcher::LabelSynonym(key),
            usage,
        ));
    }

    rules
}

// ==========================================
// UsageClassifier
// ==========================================
#[derive(Debug, Clone)]
pub struct UsageClassifier {
    rules: Vec<ClassificationRule>,
    fallback: UsageType,
}

impl Default for UsageClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageClassifier {
    /// 默认规则表 + RAW_MATERIAL 兜底
    pub fn new() -> Self {
        Self::with_rules(default_rules(), UsageType::RawMaterial)
    }

    /// 自定义规则表
    ///
    /// 规则按阶段稳定排序，阶段内保持传入顺序
    pub fn with_rules(mut rules: Vec<ClassificationRule>, fallback: UsageType) -> Self {
        rules.sort_by_key(|rule| rule.stage());
        Self { rules, fallback }
    }

    /// 替换兜底类型（来自配置）
    pub fn with_fallback(mut self, fallback: UsageType) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn fallback(&self) -> UsageType {
        self.fallback
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// 遍历有序规则，先命中者胜
    fn dispatch(&self, input: &ClassifyInput<'_>) -> Classification {
        for rule in &self.rules {
            if rule.matches(input) {
                return Classification {
                    usage_type: rule.usage_type,
                    stage: rule.stage(),
                    rule: Some(rule.name),
                };
            }
        }

        Classification {
            usage_type: self.fallback,
            stage: RuleStage::Fallback,
            rule: None,
        }
    }

    /// 分类并返回命中阶段/规则
    pub fn classify_detailed(
        &self,
        raw_label: &str,
        category_name: Option<&str>,
        item_name: Option<&str>,
    ) -> Classification {
        let input = ClassifyInput::new(raw_label, category_name, item_name);
        let result = self.dispatch(&input);

        if result.is_fallback() {
            debug!(
                raw_label = raw_label,
                category = ?category_name,
                item_name = ?item_name,
                fallback = %result.usage_type,
                "没有分类规则命中，使用兜底用途类型"
            );
        }
        result
    }

    pub fn classify(
        &self,
        raw_label: &str,
        category_name: Option<&str>,
        item_name: Option<&str>,
    ) -> UsageType {
        self.classify_detailed(raw_label, category_name, item_name)
            .usage_type
    }
}

static DEFAULT_CLASSIFIER: Lazy<UsageClassifier> = Lazy::new(UsageClassifier::new);

/// 使用默认规则表分类
pub fn classify(raw_label: &str, category_name: Option<&str>, item_name: Option<&str>) -> UsageType {
    DEFAULT_CLASSIFIER.classify(raw_label, category_name, item_name)
}

/// 分类名与用途类型一致性检查（非阻断）
///
/// # 返回
/// - Some(提示): 发现不一致，仅供记录
/// - None: 未发现问题
pub fn validate_category_usage_type_logic(
    category_name: &str,
    usage_type: UsageType,
    item_name: Option<&str>,
) -> Option<String> {
    let category = normalize_text(category_name);
    if category.is_empty() {
        return None;
    }

    let expected: Option<&str> = if category.contains("cylinder") && usage_type != UsageType::Consumable {
        Some("CONSUMABLE")
    } else if category.contains("raw material") && usage_type == UsageType::FinishedGood {
        Some("RAW_MATERIAL")
    } else if category.contains("finished good") && usage_type == UsageType::RawMaterial {
        Some("FINISHED_GOOD")
    } else if category.contains("packaging") && usage_type != UsageType::Packaging {
        Some("PACKAGING")
    } else {
        None
    };

    expected.map(|expected| {
        let subject = match item_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => format!("物料 {} ", name),
            None => String::new(),
        };
        format!(
            "{}分类「{}」与用途类型 {} 不一致（预期 {}）",
            subject,
            category_name.trim(),
            usage_type,
            expected
        )
    })
}
