//! Dynamic quote engine for neighborhood favors.
//!
//! A quote is `base × difficulty × demand × special stack + distance fee`,
//! rounded to the nearest 100 KRW. Unknown services degrade to the fallback
//! base price instead of failing, so a caller always has a number to show.

use std::sync::Arc;

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Weekday};
use favor_core::{AppliedAdjustment, Category, PriceBreakdown, PriceCalculationInput, PriceResult, Urgency};
use favor_tables::{
    AdjustmentTables, DemandTable, PricingTables, NIGHT, REGULAR_5PLUS, REGULAR_DISCOUNT, SATURDAY,
    SUNDAY_HOLIDAY, URGENT_1HR, URGENT_30MIN,
};
use tracing::debug;

pub const CRATE_NAME: &str = "favor-pricing";

pub const DISTANCE_STEP_METERS: u32 = 500;
pub const ROUNDING_UNIT: f64 = 100.0;
pub const LOYALTY_THRESHOLD: u32 = 5;

pub struct PriceQuoteEngine {
    tables: Arc<PricingTables>,
}

impl PriceQuoteEngine {
    pub fn new(tables: Arc<PricingTables>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &PricingTables {
        &self.tables
    }

    pub fn calculate_price(&self, input: &PriceCalculationInput) -> PriceResult {
        let adjustments = &self.tables.adjustments;
        let looked_up = self
            .tables
            .price_table
            .base_price(input.category, &input.subcategory);
        let base_price = looked_up.unwrap_or(adjustments.fallback_base_price);

        // Difficulty is not an input yet; every quote uses the normal tier.
        let difficulty = adjustments.difficulty.normal;
        let distance_fee = distance_fee(input.distance_meters, adjustments.distance_fee_per_500m);
        let demand = demand_multiplier(&adjustments.demand, input.scheduled_at.as_ref());
        let (special_adjustments, stack) = special_adjustments(adjustments, input);

        let raw = base_price as f64 * difficulty * demand * stack + distance_fee as f64;
        let price = round_to_unit(raw);

        debug!(
            category = %input.category,
            subcategory = %input.subcategory,
            fallback = looked_up.is_none(),
            price,
            "quote calculated"
        );

        PriceResult {
            price,
            breakdown: PriceBreakdown {
                base_price,
                difficulty,
                demand,
                distance_fee,
                special_adjustments,
            },
        }
    }

    /// Neutral quote for a category's first listed service.
    pub fn quote_default(&self, category: Category) -> PriceResult {
        let subcategory = self
            .tables
            .price_table
            .default_subcategory(category)
            .unwrap_or_default();
        self.calculate_price(&PriceCalculationInput::new(category, subcategory))
    }

    /// Whether a quote for this pair came from the table rather than the fallback price.
    pub fn is_known_service(&self, category: Category, subcategory: &str) -> bool {
        self.tables.price_table.contains(category, subcategory)
    }
}

/// One fee unit per full 500 m; the remainder is free.
pub fn distance_fee(distance_meters: u32, fee_per_step: u32) -> u32 {
    (distance_meters / DISTANCE_STEP_METERS).saturating_mul(fee_per_step)
}

pub fn demand_multiplier(demand: &DemandTable, scheduled_at: Option<&DateTime<FixedOffset>>) -> f64 {
    let Some(at) = scheduled_at else {
        return demand.normal;
    };
    match at.hour() {
        7..=9 | 17..=19 => demand.high,
        h if h >= 22 || h < 6 => demand.low,
        _ => demand.normal,
    }
}

pub fn is_night(at: &DateTime<FixedOffset>) -> bool {
    let hour = at.hour();
    hour >= 21 || hour < 6
}

pub fn round_to_unit(raw: f64) -> u32 {
    ((raw / ROUNDING_UNIT).round() * ROUNDING_UNIT) as u32
}

fn special_adjustments(
    adjustments: &AdjustmentTables,
    input: &PriceCalculationInput,
) -> (Vec<AppliedAdjustment>, f64) {
    let mut applied = Vec::new();
    let mut stack = 1.0;
    let mut apply = |name: &str| {
        if let Some(adjustment) = adjustments.special(name) {
            stack *= adjustment.value;
            applied.push(AppliedAdjustment {
                name: adjustment.name.clone(),
                value: adjustment.value,
                label: adjustment.label.clone(),
            });
        }
    };

    match input.urgency {
        Urgency::Immediate => apply(URGENT_30MIN),
        Urgency::Soon => apply(URGENT_1HR),
        Urgency::Normal => {}
    }

    if let Some(at) = &input.scheduled_at {
        if is_night(at) {
            apply(NIGHT);
        }
        // No holiday calendar: only Sundays get the holiday rate.
        match at.weekday() {
            Weekday::Sat => apply(SATURDAY),
            Weekday::Sun => apply(SUNDAY_HOLIDAY),
            _ => {}
        }
    }

    if input.is_regular {
        apply(REGULAR_DISCOUNT);
    }
    if input.regular_count >= LOYALTY_THRESHOLD {
        apply(REGULAR_5PLUS);
    }

    (applied, stack)
}
