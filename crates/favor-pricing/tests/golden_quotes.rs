use std::path::{Path, PathBuf};
use std::sync::Arc;

use favor_core::PriceCalculationInput;
use favor_pricing::PriceQuoteEngine;
use favor_tables::PricingTables;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct GoldenQuote {
    name: String,
    input: PriceCalculationInput,
    expected_price: u32,
    expected_adjustments: Vec<String>,
}

fn golden_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .join("fixtures")
        .join("quotes")
        .join("golden.json")
}

#[test]
fn golden_quotes_match_fixture() {
    let text = std::fs::read_to_string(golden_path()).expect("read golden quotes");
    let cases: Vec<GoldenQuote> = serde_json::from_str(&text).expect("parse golden quotes");
    assert!(!cases.is_empty());

    let engine = PriceQuoteEngine::new(Arc::new(PricingTables::builtin().expect("builtin tables")));
    for case in cases {
        let quote = engine.calculate_price(&case.input);
        assert_eq!(quote.price, case.expected_price, "{}", case.name);
        assert_eq!(quote.adjustment_names(), case.expected_adjustments, "{}", case.name);
    }
}
