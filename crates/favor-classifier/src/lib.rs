//! Keyword classifier mapping free-form request text to a priced service.
//!
//! Rules are an ordered decision list: the first rule yielding an outcome wins.
//! A rule whose keywords match but whose refinements all miss, and which has
//! no default outcome, hands over to the next rule.

use favor_core::{Category, ClassificationResult};
use favor_tables::{
    resolve_outcome_category, ClassifierRules, KeywordMatch, PriceTable, PricingTables, RuleOutcome,
    TableError,
};
use tracing::debug;

pub const CRATE_NAME: &str = "favor-classifier";

#[derive(Debug, Clone)]
struct Keywords {
    any: Vec<String>,
    all: Vec<String>,
}

impl Keywords {
    fn compile(when: &KeywordMatch) -> Self {
        Self {
            any: when.any.iter().map(|k| k.to_lowercase()).collect(),
            all: when.all.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(&self, text: &str) -> bool {
        self.all.iter().all(|k| text.contains(k.as_str()))
            && (self.any.is_empty() || self.any.iter().any(|k| text.contains(k.as_str())))
    }
}

#[derive(Debug, Clone)]
struct Outcome {
    category: Category,
    subcategory: String,
    minutes: u32,
}

impl Outcome {
    fn resolve(table: &PriceTable, rule: &str, outcome: &RuleOutcome) -> Result<Self, TableError> {
        Ok(Self {
            category: resolve_outcome_category(table, rule, outcome)?,
            subcategory: outcome.subcategory.clone(),
            minutes: outcome.minutes,
        })
    }

    fn to_result(&self) -> ClassificationResult {
        ClassificationResult::matched(self.category, self.subcategory.clone(), self.minutes)
    }
}

#[derive(Debug, Clone)]
struct Rule {
    when: Keywords,
    refinements: Vec<(Keywords, Outcome)>,
    fallback: Option<Outcome>,
}

impl Rule {
    fn evaluate(&self, text: &str) -> Option<&Outcome> {
        if !self.when.matches(text) {
            return None;
        }
        self.refinements
            .iter()
            .find(|(keywords, _)| keywords.matches(text))
            .map(|(_, outcome)| outcome)
            .or(self.fallback.as_ref())
    }
}

/// Ordered first-match keyword classifier.
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    rules: Vec<Rule>,
}

impl RequestClassifier {
    /// Compile `rules`, resolving each outcome's category against `table`.
    pub fn new(rules: &ClassifierRules, table: &PriceTable) -> Result<Self, TableError> {
        let mut compiled = Vec::with_capacity(rules.rules.len());
        for (idx, rule) in rules.rules.iter().enumerate() {
            let name = format!("classifier rule {}", idx + 1);
            if rule.when.is_empty() {
                return Err(TableError::EmptyRule { rule: name });
            }
            let mut refinements = Vec::with_capacity(rule.refinements.len());
            for (ridx, refinement) in rule.refinements.iter().enumerate() {
                let rname = format!("{name} refinement {}", ridx + 1);
                if refinement.when.is_empty() {
                    return Err(TableError::EmptyRule { rule: rname });
                }
                refinements.push((
                    Keywords::compile(&refinement.when),
                    Outcome::resolve(table, &rname, &refinement.outcome)?,
                ));
            }
            let fallback = rule
                .outcome
                .as_ref()
                .map(|outcome| Outcome::resolve(table, &name, outcome))
                .transpose()?;
            if refinements.is_empty() && fallback.is_none() {
                return Err(TableError::RuleWithoutOutcome { rule: name });
            }
            compiled.push(Rule {
                when: Keywords::compile(&rule.when),
                refinements,
                fallback,
            });
        }
        Ok(Self { rules: compiled })
    }

    pub fn from_tables(tables: &PricingTables) -> Result<Self, TableError> {
        Self::new(&tables.classifier_rules, &tables.price_table)
    }

    /// Infer category, subcategory and duration from `text`; empty when nothing matches.
    pub fn analyze_request_text(&self, text: &str) -> ClassificationResult {
        let lowered = text.to_lowercase();
        let hit = self
            .rules
            .iter()
            .enumerate()
            .find_map(|(idx, rule)| rule.evaluate(&lowered).map(|outcome| (idx, outcome)));

        match hit {
            Some((idx, outcome)) => {
                debug!(
                    rule = idx + 1,
                    category = %outcome.category,
                    subcategory = %outcome.subcategory,
                    "request text classified"
                );
                outcome.to_result()
            }
            None => {
                debug!("request text matched no rule");
                ClassificationResult::empty()
            }
        }
    }
}
