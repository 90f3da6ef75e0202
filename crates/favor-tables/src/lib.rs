//! Versioned pricing tables and classifier keyword rules for the favor quote engine.
//!
//! All three tables ship as YAML under `pricing/` and are embedded at build time.
//! Operators can point `FAVOR_PRICING_DIR` at a directory holding replacement
//! files; any file missing there falls back to the embedded copy.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use favor_core::Category;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "favor-tables";

pub const PRICE_TABLE_FILE: &str = "price_table.yaml";
pub const ADJUSTMENTS_FILE: &str = "adjustments.yaml";
pub const CLASSIFIER_RULES_FILE: &str = "classifier_rules.yaml";

const BUILTIN_PRICE_TABLE: &str = include_str!("../../../pricing/price_table.yaml");
const BUILTIN_ADJUSTMENTS: &str = include_str!("../../../pricing/adjustments.yaml");
const BUILTIN_CLASSIFIER_RULES: &str = include_str!("../../../pricing/classifier_rules.yaml");

pub const URGENT_30MIN: &str = "urgent_30min";
pub const URGENT_1HR: &str = "urgent_1hr";
pub const NIGHT: &str = "night";
pub const SATURDAY: &str = "saturday";
pub const SUNDAY_HOLIDAY: &str = "sunday_holiday";
pub const REGULAR_DISCOUNT: &str = "regular_discount";
pub const REGULAR_5PLUS: &str = "regular_5plus";

/// Special adjustments the quote engine can trigger; each must be configured.
pub const ENGINE_ADJUSTMENTS: [&str; 7] = [
    URGENT_30MIN,
    URGENT_1HR,
    NIGHT,
    SATURDAY,
    SUNDAY_HOLIDAY,
    REGULAR_DISCOUNT,
    REGULAR_5PLUS,
];

#[derive(Debug, Error)]
pub enum TableError {
    #[error("reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("serializing tables: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("category {0} is missing from the price table")]
    MissingCategory(Category),
    #[error("category {0} is listed more than once")]
    DuplicateCategory(Category),
    #[error("category {0} has no services")]
    EmptyCategory(Category),
    #[error("subcategory {subcategory} is listed more than once under {category}")]
    DuplicateSubcategory {
        category: Category,
        subcategory: String,
    },
    #[error("special adjustment {0} is listed more than once")]
    DuplicateAdjustment(String),
    #[error("special adjustment {0} is not configured")]
    MissingAdjustment(String),
    #[error("multiplier {name} must be finite and positive, got {value}")]
    InvalidMultiplier { name: String, value: f64 },
    #[error("{rule} has no keywords")]
    EmptyRule { rule: String },
    #[error("{rule} has neither refinements nor an outcome")]
    RuleWithoutOutcome { rule: String },
    #[error("{rule}: subcategory {subcategory} is not in the price table")]
    UnknownRuleSubcategory { rule: String, subcategory: String },
    #[error("{rule}: subcategory {subcategory} exists under {categories:?}; the rule must name its category")]
    AmbiguousRuleSubcategory {
        rule: String,
        subcategory: String,
        categories: Vec<Category>,
    },
    #[error("{rule}: {category}/{subcategory} is not in the price table")]
    UnknownRuleService {
        rule: String,
        category: Category,
        subcategory: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePrice {
    pub subcategory: String,
    pub base_price: u32,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPrices {
    pub category: Category,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub icon: String,
    pub services: Vec<ServicePrice>,
}

/// Category → ordered services → base price (KRW).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTable {
    pub version: u32,
    pub categories: Vec<CategoryPrices>,
}

impl PriceTable {
    pub fn category(&self, category: Category) -> Option<&CategoryPrices> {
        self.categories.iter().find(|c| c.category == category)
    }

    pub fn service(&self, category: Category, subcategory: &str) -> Option<&ServicePrice> {
        self.category(category)?
            .services
            .iter()
            .find(|s| s.subcategory == subcategory)
    }

    pub fn base_price(&self, category: Category, subcategory: &str) -> Option<u32> {
        self.service(category, subcategory).map(|s| s.base_price)
    }

    pub fn contains(&self, category: Category, subcategory: &str) -> bool {
        self.service(category, subcategory).is_some()
    }

    /// First listed service of a category, used when only the category was picked.
    pub fn default_subcategory(&self, category: Category) -> Option<&str> {
        self.category(category)?
            .services
            .first()
            .map(|s| s.subcategory.as_str())
    }

    /// Every category listing `subcategory`, in table order.
    pub fn categories_of(&self, subcategory: &str) -> Vec<Category> {
        self.categories
            .iter()
            .filter(|c| c.services.iter().any(|s| s.subcategory == subcategory))
            .map(|c| c.category)
            .collect()
    }

    pub fn validate(&self) -> Result<(), TableError> {
        let mut seen = BTreeSet::new();
        for entry in &self.categories {
            if !seen.insert(entry.category) {
                return Err(TableError::DuplicateCategory(entry.category));
            }
            if entry.services.is_empty() {
                return Err(TableError::EmptyCategory(entry.category));
            }
            let mut keys = BTreeSet::new();
            for service in &entry.services {
                if !keys.insert(service.subcategory.as_str()) {
                    return Err(TableError::DuplicateSubcategory {
                        category: entry.category,
                        subcategory: service.subcategory.clone(),
                    });
                }
            }
        }
        if let Some(missing) = Category::ALL.into_iter().find(|c| !seen.contains(c)) {
            return Err(TableError::MissingCategory(missing));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyTable {
    pub simple: f64,
    pub normal: f64,
    pub complex: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandTable {
    pub low: f64,
    pub normal: f64,
    pub high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialAdjustment {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentTables {
    pub version: u32,
    pub fallback_base_price: u32,
    pub distance_fee_per_500m: u32,
    pub difficulty: DifficultyTable,
    pub demand: DemandTable,
    /// Estimated minutes → multiplier. Published only; quotes do not apply it.
    #[serde(default)]
    pub duration: BTreeMap<u32, f64>,
    pub special: Vec<SpecialAdjustment>,
}

impl AdjustmentTables {
    pub fn special(&self, name: &str) -> Option<&SpecialAdjustment> {
        self.special.iter().find(|a| a.name == name)
    }

    pub fn validate(&self) -> Result<(), TableError> {
        let tiers = [
            ("difficulty.simple", self.difficulty.simple),
            ("difficulty.normal", self.difficulty.normal),
            ("difficulty.complex", self.difficulty.complex),
            ("demand.low", self.demand.low),
            ("demand.normal", self.demand.normal),
            ("demand.high", self.demand.high),
        ];
        for (name, value) in tiers {
            check_multiplier(name, value)?;
        }
        for (minutes, value) in &self.duration {
            check_multiplier(&format!("duration.{minutes}"), *value)?;
        }

        let mut names = BTreeSet::new();
        for adjustment in &self.special {
            if !names.insert(adjustment.name.as_str()) {
                return Err(TableError::DuplicateAdjustment(adjustment.name.clone()));
            }
            check_multiplier(&adjustment.name, adjustment.value)?;
        }
        if let Some(missing) = ENGINE_ADJUSTMENTS.iter().find(|n| !names.contains(*n)) {
            return Err(TableError::MissingAdjustment((*missing).to_string()));
        }
        Ok(())
    }
}

fn check_multiplier(name: &str, value: f64) -> Result<(), TableError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TableError::InvalidMultiplier {
            name: name.to_string(),
            value,
        })
    }
}

/// Substring predicate: every `all` keyword present and, when `any` is
/// non-empty, at least one `any` keyword present.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeywordMatch {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all: Vec<String>,
}

impl KeywordMatch {
    pub fn is_empty(&self) -> bool {
        self.any.is_empty() && self.all.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    /// Only needed when the subcategory is listed under several categories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    pub subcategory: String,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refinement {
    pub when: KeywordMatch,
    pub outcome: RuleOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub when: KeywordMatch,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub refinements: Vec<Refinement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RuleOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierRules {
    pub version: u32,
    pub rules: Vec<KeywordRule>,
}

impl ClassifierRules {
    pub fn validate(&self, table: &PriceTable) -> Result<(), TableError> {
        for (idx, rule) in self.rules.iter().enumerate() {
            let name = format!("classifier rule {}", idx + 1);
            if rule.when.is_empty() {
                return Err(TableError::EmptyRule { rule: name });
            }
            if rule.refinements.is_empty() && rule.outcome.is_none() {
                return Err(TableError::RuleWithoutOutcome { rule: name });
            }
            for (ridx, refinement) in rule.refinements.iter().enumerate() {
                let rname = format!("{name} refinement {}", ridx + 1);
                if refinement.when.is_empty() {
                    return Err(TableError::EmptyRule { rule: rname });
                }
                resolve_outcome_category(table, &rname, &refinement.outcome)?;
            }
            if let Some(outcome) = &rule.outcome {
                resolve_outcome_category(table, &name, outcome)?;
            }
        }
        Ok(())
    }
}

/// Category an outcome belongs to: the explicit one if given, otherwise the
/// single category listing its subcategory.
pub fn resolve_outcome_category(
    table: &PriceTable,
    rule: &str,
    outcome: &RuleOutcome,
) -> Result<Category, TableError> {
    if let Some(category) = outcome.category {
        if table.contains(category, &outcome.subcategory) {
            return Ok(category);
        }
        return Err(TableError::UnknownRuleService {
            rule: rule.to_string(),
            category,
            subcategory: outcome.subcategory.clone(),
        });
    }

    let categories = table.categories_of(&outcome.subcategory);
    match categories.as_slice() {
        [single] => Ok(*single),
        [] => Err(TableError::UnknownRuleSubcategory {
            rule: rule.to_string(),
            subcategory: outcome.subcategory.clone(),
        }),
        _ => Err(TableError::AmbiguousRuleSubcategory {
            rule: rule.to_string(),
            subcategory: outcome.subcategory.clone(),
            categories,
        }),
    }
}

#[derive(Debug, Clone, Default)]
pub struct TablesConfig {
    pub pricing_dir: Option<PathBuf>,
}

impl TablesConfig {
    pub fn from_env() -> Self {
        Self {
            pricing_dir: std::env::var("FAVOR_PRICING_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

/// The full, validated table set a process quotes against.
#[derive(Debug, Clone, Serialize)]
pub struct PricingTables {
    pub price_table: PriceTable,
    pub adjustments: AdjustmentTables,
    pub classifier_rules: ClassifierRules,
    #[serde(skip)]
    fingerprint: String,
}

impl PricingTables {
    pub fn builtin() -> Result<Self, TableError> {
        Self::from_yaml_strs(
            BUILTIN_PRICE_TABLE,
            BUILTIN_ADJUSTMENTS,
            BUILTIN_CLASSIFIER_RULES,
        )
    }

    pub fn from_yaml_strs(
        price_table: &str,
        adjustments: &str,
        classifier_rules: &str,
    ) -> Result<Self, TableError> {
        Self::new(
            parse_yaml(PRICE_TABLE_FILE, price_table)?,
            parse_yaml(ADJUSTMENTS_FILE, adjustments)?,
            parse_yaml(CLASSIFIER_RULES_FILE, classifier_rules)?,
        )
    }

    pub fn new(
        price_table: PriceTable,
        adjustments: AdjustmentTables,
        classifier_rules: ClassifierRules,
    ) -> Result<Self, TableError> {
        price_table.validate()?;
        adjustments.validate()?;
        classifier_rules.validate(&price_table)?;

        let mut tables = Self {
            price_table,
            adjustments,
            classifier_rules,
            fingerprint: String::new(),
        };
        let canonical = serde_json::to_vec(&tables)?;
        tables.fingerprint = hex::encode(Sha256::digest(&canonical));
        Ok(tables)
    }

    /// Load from `dir`, using the embedded copy for any file the directory lacks.
    /// The directory itself must exist.
    pub fn from_dir(dir: &Path) -> Result<Self, TableError> {
        let metadata = std::fs::metadata(dir).map_err(|source| TableError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(TableError::Read {
                path: dir.to_path_buf(),
                source: std::io::Error::other("not a directory"),
            });
        }
        let price_table = read_or_builtin(dir, PRICE_TABLE_FILE, BUILTIN_PRICE_TABLE)?;
        let adjustments = read_or_builtin(dir, ADJUSTMENTS_FILE, BUILTIN_ADJUSTMENTS)?;
        let rules = read_or_builtin(dir, CLASSIFIER_RULES_FILE, BUILTIN_CLASSIFIER_RULES)?;
        Self::from_yaml_strs(&price_table, &adjustments, &rules)
    }

    pub fn load(config: &TablesConfig) -> Result<Self, TableError> {
        let tables = match &config.pricing_dir {
            Some(dir) => Self::from_dir(dir)?,
            None => Self::builtin()?,
        };
        info!(
            price_table_version = tables.price_table.version,
            adjustments_version = tables.adjustments.version,
            classifier_rules_version = tables.classifier_rules.version,
            fingerprint = %tables.fingerprint,
            "pricing tables loaded"
        );
        Ok(tables)
    }

    /// SHA-256 hex over the canonical JSON form of all three tables.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn parse_yaml<T: serde::de::DeserializeOwned>(name: &str, text: &str) -> Result<T, TableError> {
    serde_yaml::from_str(text).map_err(|source| TableError::Parse {
        name: name.to_string(),
        source,
    })
}

fn read_or_builtin(dir: &Path, file: &str, builtin: &str) -> Result<String, TableError> {
    let path = dir.join(file);
    if !path.exists() {
        warn!(path = %path.display(), "pricing file not found; using builtin copy");
        return Ok(builtin.to_string());
    }
    std::fs::read_to_string(&path).map_err(|source| TableError::Read { path, source })
}
