//! Core quote domain model shared by the pricing engine, the request classifier and the outer surfaces.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "favor-core";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("unknown service category: {0}")]
    UnknownCategory(String),
    #[error("unknown urgency: {0}")]
    UnknownUrgency(String),
}

/// Top-level service classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Childcare,
    Housework,
    Errand,
    DigitalHelp,
    Mobility,
    PhysicalHelp,
    Health,
    Memory,
    Consultation,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Childcare,
        Category::Housework,
        Category::Errand,
        Category::DigitalHelp,
        Category::Mobility,
        Category::PhysicalHelp,
        Category::Health,
        Category::Memory,
        Category::Consultation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Childcare => "childcare",
            Category::Housework => "housework",
            Category::Errand => "errand",
            Category::DigitalHelp => "digital_help",
            Category::Mobility => "mobility",
            Category::PhysicalHelp => "physical_help",
            Category::Health => "health",
            Category::Memory => "memory",
            Category::Consultation => "consultation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    /// Wanted within 30 minutes.
    Immediate,
    /// Wanted within the hour.
    Soon,
    #[default]
    Normal,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Immediate => "immediate",
            Urgency::Soon => "soon",
            Urgency::Normal => "normal",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(Urgency::Immediate),
            "soon" => Ok(Urgency::Soon),
            "normal" => Ok(Urgency::Normal),
            other => Err(CoreError::UnknownUrgency(other.to_string())),
        }
    }
}

/// Normalized service descriptor handed to the quote engine.
///
/// `scheduled_at` carries the requester's UTC offset; hour-of-day and weekday
/// are read on that local wall clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceCalculationInput {
    pub category: Category,
    pub subcategory: String,
    #[serde(default)]
    pub distance_meters: u32,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub is_regular: bool,
    #[serde(default)]
    pub regular_count: u32,
}

impl PriceCalculationInput {
    pub fn new(category: Category, subcategory: impl Into<String>) -> Self {
        Self {
            category,
            subcategory: subcategory.into(),
            distance_meters: 0,
            scheduled_at: None,
            urgency: Urgency::Normal,
            is_regular: false,
            regular_count: 0,
        }
    }

    pub fn with_distance(mut self, distance_meters: u32) -> Self {
        self.distance_meters = distance_meters;
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<FixedOffset>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }

    pub fn regular(mut self, is_regular: bool) -> Self {
        self.is_regular = is_regular;
        self
    }

    pub fn with_regular_count(mut self, regular_count: u32) -> Self {
        self.regular_count = regular_count;
        self
    }
}

/// One triggered special condition, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedAdjustment {
    pub name: String,
    pub value: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base_price: u32,
    pub difficulty: f64,
    pub demand: f64,
    pub distance_fee: u32,
    pub special_adjustments: Vec<AppliedAdjustment>,
}

/// Final quote: price rounded to the nearest 100 plus its itemized breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceResult {
    pub price: u32,
    pub breakdown: PriceBreakdown,
}

impl PriceResult {
    pub fn adjustment_names(&self) -> Vec<&str> {
        self.breakdown
            .special_adjustments
            .iter()
            .map(|a| a.name.as_str())
            .collect()
    }
}

/// Best-guess service inferred from free text. Either every field is set or none is.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassificationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<u32>,
}

impl ClassificationResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn matched(category: Category, subcategory: impl Into<String>, estimated_minutes: u32) -> Self {
        Self {
            category: Some(category),
            subcategory: Some(subcategory.into()),
            estimated_duration: Some(estimated_minutes),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.subcategory.is_none() && self.estimated_duration.is_none()
    }

    /// Category/subcategory pair ready to be priced, if one was inferred.
    pub fn service(&self) -> Option<(Category, &str)> {
        match (self.category, self.subcategory.as_deref()) {
            (Some(category), Some(subcategory)) => Some((category, subcategory)),
            _ => None,
        }
    }
}
