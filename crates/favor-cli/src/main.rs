use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use clap::{Args, Parser, Subcommand};
use favor_classifier::RequestClassifier;
use favor_core::{Category, PriceCalculationInput, Urgency};
use favor_pricing::PriceQuoteEngine;
use favor_tables::{PricingTables, TablesConfig};
use favor_web::WebConfig;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "favor-cli")]
#[command(about = "Neighborhood favor quote engine command-line interface")]
struct Cli {
    /// Directory with price_table.yaml / adjustments.yaml / classifier_rules.yaml overrides.
    #[arg(long, global = true)]
    pricing_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Price a category/subcategory pair.
    Quote {
        #[arg(long)]
        category: Category,
        /// Defaults to the category's first listed service.
        #[arg(long)]
        subcategory: Option<String>,
        #[command(flatten)]
        context: QuoteContext,
    },
    /// Infer the service from free text, then price it.
    Classify {
        text: String,
        #[command(flatten)]
        context: QuoteContext,
    },
    /// Print the loaded tables as JSON, or validate them with --check.
    Tables {
        #[arg(long)]
        check: bool,
    },
    /// Run the HTTP quote service.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Clone, Args)]
struct QuoteContext {
    #[arg(long, default_value_t = 0)]
    distance: u32,
    /// Scheduled time, RFC 3339 with offset (e.g. 2026-10-19T08:00:00+09:00).
    #[arg(long)]
    at: Option<DateTime<FixedOffset>>,
    #[arg(long, default_value = "normal")]
    urgency: Urgency,
    #[arg(long)]
    regular: bool,
    #[arg(long, default_value_t = 0)]
    regular_count: u32,
}

impl QuoteContext {
    fn input(&self, category: Category, subcategory: impl Into<String>) -> PriceCalculationInput {
        PriceCalculationInput {
            category,
            subcategory: subcategory.into(),
            distance_meters: self.distance,
            scheduled_at: self.at,
            urgency: self.urgency,
            is_regular: self.regular,
            regular_count: self.regular_count,
        }
    }
}

#[derive(Debug, Serialize)]
struct ClassifyOutput {
    classification: favor_core::ClassificationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    quote: Option<favor_core::PriceResult>,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serializing output")?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = TablesConfig::from_env();
    if cli.pricing_dir.is_some() {
        config.pricing_dir = cli.pricing_dir.clone();
    }
    let tables = Arc::new(PricingTables::load(&config).context("loading pricing tables")?);

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Quote {
            category,
            subcategory,
            context,
        } => {
            let engine = PriceQuoteEngine::new(tables.clone());
            let subcategory = subcategory
                .or_else(|| tables.price_table.default_subcategory(category).map(str::to_string))
                .unwrap_or_default();
            print_json(&engine.calculate_price(&context.input(category, subcategory)))?;
        }
        Commands::Classify { text, context } => {
            let classifier = RequestClassifier::from_tables(&tables).context("compiling classifier rules")?;
            let engine = PriceQuoteEngine::new(tables.clone());
            let classification = classifier.analyze_request_text(&text);
            let quote = classification
                .service()
                .map(|(category, subcategory)| engine.calculate_price(&context.input(category, subcategory)));
            print_json(&ClassifyOutput {
                classification,
                quote,
            })?;
        }
        Commands::Tables { check } => {
            if check {
                println!(
                    "pricing tables ok: price_table v{} adjustments v{} rules v{} fingerprint={}",
                    tables.price_table.version,
                    tables.adjustments.version,
                    tables.classifier_rules.version,
                    tables.fingerprint()
                );
            } else {
                print_json(&*tables)?;
            }
        }
        Commands::Serve { port } => {
            let mut web = WebConfig::from_env();
            if let Some(port) = port {
                web.port = port;
            }
            info!(bind = %web.bind, port = web.port, "starting quote service");
            favor_web::serve(web, tables).await?;
        }
    }

    Ok(())
}
