//! Axum JSON API + Askama operator page for the favor quote engine.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Context;
use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, FixedOffset};
use favor_classifier::RequestClassifier;
use favor_core::{ClassificationResult, PriceCalculationInput, PriceResult, Urgency};
use favor_pricing::PriceQuoteEngine;
use favor_tables::PricingTables;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::info;

pub const CRATE_NAME: &str = "favor-web";

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind: String,
    pub port: u16,
}

impl WebConfig {
    pub fn from_env() -> Self {
        Self {
            bind: std::env::var("FAVOR_WEB_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("FAVOR_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let ip: IpAddr = self
            .bind
            .parse()
            .with_context(|| format!("invalid bind address {:?}", self.bind))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

pub struct AppState {
    pub tables: Arc<PricingTables>,
    pub engine: PriceQuoteEngine,
    pub classifier: RequestClassifier,
}

impl AppState {
    pub fn new(tables: Arc<PricingTables>) -> anyhow::Result<Self> {
        let classifier = RequestClassifier::from_tables(&tables)?;
        Ok(Self {
            engine: PriceQuoteEngine::new(tables.clone()),
            classifier,
            tables,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    /// False when the base price came from the fallback, not the table.
    pub known_service: bool,
    #[serde(flatten)]
    pub quote: PriceResult,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct TextQuoteRequest {
    pub text: String,
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

#[derive(Debug, Serialize)]
pub struct TextQuoteResponse {
    pub classification: ClassificationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote: Option<PriceResult>,
}

#[derive(Debug, Clone)]
struct ServiceRow {
    subcategory: String,
    label: String,
    base_price: u32,
    neutral_price: u32,
}

#[derive(Debug, Clone)]
struct CategoryRow {
    key: String,
    display_name: String,
    icon: String,
    services: Vec<ServiceRow>,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    price_table_version: u32,
    adjustments_version: u32,
    rules_version: u32,
    fingerprint: String,
    categories: Vec<CategoryRow>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/tables", get(tables_handler))
        .route("/api/quote", post(quote_handler))
        .route("/api/classify", post(classify_handler))
        .route("/api/quote/text", post(text_quote_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(config: WebConfig, tables: Arc<PricingTables>) -> anyhow::Result<()> {
    let state = AppState::new(tables)?;
    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "favor quote service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    let tables = &state.tables;
    let categories = tables
        .price_table
        .categories
        .iter()
        .map(|entry| CategoryRow {
            key: entry.category.to_string(),
            display_name: entry.display_name.clone(),
            icon: entry.icon.clone(),
            services: entry
                .services
                .iter()
                .map(|service| ServiceRow {
                    subcategory: service.subcategory.clone(),
                    label: service.label.clone(),
                    base_price: service.base_price,
                    neutral_price: state
                        .engine
                        .calculate_price(&PriceCalculationInput::new(
                            entry.category,
                            service.subcategory.clone(),
                        ))
                        .price,
                })
                .collect(),
        })
        .collect();

    render_html(IndexTemplate {
        price_table_version: tables.price_table.version,
        adjustments_version: tables.adjustments.version,
        rules_version: tables.classifier_rules.version,
        fingerprint: tables.fingerprint().to_string(),
        categories,
    })
}

async fn tables_handler(State(state): State<Arc<AppState>>) -> Response {
    let tables = &state.tables;
    Json(serde_json::json!({
        "fingerprint": tables.fingerprint(),
        "versions": {
            "price_table": tables.price_table.version,
            "adjustments": tables.adjustments.version,
            "classifier_rules": tables.classifier_rules.version,
        },
        "price_table": &tables.price_table,
        "adjustments": &tables.adjustments,
        "classifier_rules": &tables.classifier_rules,
    }))
    .into_response()
}

async fn quote_handler(
    State(state): State<Arc<AppState>>,
    Json(input): Json<PriceCalculationInput>,
) -> Json<QuoteResponse> {
    let known_service = state.engine.is_known_service(input.category, &input.subcategory);
    Json(QuoteResponse {
        known_service,
        quote: state.engine.calculate_price(&input),
    })
}

async fn classify_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClassifyRequest>,
) -> Json<ClassificationResult> {
    Json(state.classifier.analyze_request_text(&request.text))
}

async fn text_quote_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TextQuoteRequest>,
) -> Json<TextQuoteResponse> {
    let classification = state.classifier.analyze_request_text(&request.text);
    let quote = classification.service().map(|(category, subcategory)| {
        let input = PriceCalculationInput {
            category,
            subcategory: subcategory.to_string(),
            distance_meters: request.distance_meters,
            scheduled_at: request.scheduled_at,
            urgency: request.urgency,
            is_regular: request.is_regular,
            regular_count: request.regular_count,
        };
        state.engine.calculate_price(&input)
    });
    Json(TextQuoteResponse {
        classification,
        quote,
    })
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let tables = Arc::new(PricingTables::builtin().unwrap());
        app(AppState::new(tables).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn handler_smoke_health() {
        let resp = test_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn index_lists_categories_and_fingerprint() {
        let tables = PricingTables::builtin().unwrap();
        let resp = test_app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("Favor Price Table"));
        assert!(text.contains("side_dish_3"));
        assert!(text.contains(tables.fingerprint()));
    }

    #[tokio::test]
    async fn quote_endpoint_returns_breakdown() {
        let resp = test_app()
            .oneshot(post_json(
                "/api/quote",
                r#"{"category":"childcare","subcategory":"dropoff","distance_meters":1200,"scheduled_at":"2026-10-19T08:00:00+09:00"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["price"], 2000);
        assert_eq!(body["known_service"], true);
        assert_eq!(body["breakdown"]["distance_fee"], 200);
        assert_eq!(body["breakdown"]["demand"], 1.2);
    }

    #[tokio::test]
    async fn quote_endpoint_flags_fallback_price() {
        let resp = test_app()
            .oneshot(post_json(
                "/api/quote",
                r#"{"category":"childcare","subcategory":"nonexistent_xyz"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["known_service"], false);
        assert_eq!(body["breakdown"]["base_price"], 1000);
    }

    #[tokio::test]
    async fn quote_endpoint_rejects_unknown_category() {
        let resp = test_app()
            .oneshot(post_json(
                "/api/quote",
                r#"{"category":"gardening","subcategory":"weeding"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn classify_endpoint_omits_absent_fields() {
        let app = test_app();
        let hit = app
            .clone()
            .oneshot(post_json("/api/classify", r#"{"text":"반찬 3가지 부탁드려요"}"#))
            .await
            .unwrap();
        let body = json_body(hit).await;
        assert_eq!(body["category"], "housework");
        assert_eq!(body["subcategory"], "side_dish_3");
        assert_eq!(body["estimated_duration"], 60);

        let miss = app
            .oneshot(post_json("/api/classify", r#"{"text":"그냥 아무 말"}"#))
            .await
            .unwrap();
        assert_eq!(json_body(miss).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn text_quote_chains_classifier_into_engine() {
        let app = test_app();
        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/quote/text",
                r#"{"text":"내일 아침 8시에 아이 어린이집 데려다줄 분 찾아요","scheduled_at":"2026-10-19T08:00:00+09:00","distance_meters":1200}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["classification"]["subcategory"], "dropoff");
        assert_eq!(body["quote"]["price"], 2000);
        assert_eq!(body["quote"]["breakdown"]["special_adjustments"], serde_json::json!([]));

        let miss = app
            .oneshot(post_json("/api/quote/text", r#"{"text":"그냥 아무 말"}"#))
            .await
            .unwrap();
        let body = json_body(miss).await;
        assert_eq!(body["classification"], serde_json::json!({}));
        assert!(body.get("quote").is_none());
    }

    #[test]
    fn bind_address_accepts_ipv4_and_ipv6() {
        let v4 = WebConfig {
            bind: "0.0.0.0".to_string(),
            port: 8000,
        };
        assert_eq!(v4.socket_addr().unwrap().to_string(), "0.0.0.0:8000");

        let v6 = WebConfig {
            bind: "::".to_string(),
            port: 8000,
        };
        let addr = v6.socket_addr().unwrap();
        assert!(addr.is_ipv6());
        assert_eq!(addr.to_string(), "[::]:8000");

        let bad = WebConfig {
            bind: "localhost:8000".to_string(),
            port: 8000,
        };
        assert!(bad.socket_addr().is_err());
    }

    #[tokio::test]
    async fn tables_endpoint_exposes_versioned_data() {
        let resp = test_app()
            .oneshot(Request::builder().uri("/api/tables").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "application/json"
        );
        let body = json_body(resp).await;
        let mut keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            ["adjustments", "classifier_rules", "fingerprint", "price_table", "versions"]
        );
        assert_eq!(body["fingerprint"].as_str().unwrap().len(), 64);
        assert_eq!(
            body["versions"],
            serde_json::json!({"price_table": 1, "adjustments": 1, "classifier_rules": 1})
        );
        assert_eq!(body["adjustments"]["distance_fee_per_500m"], 100);
        assert_eq!(body["price_table"]["categories"][0]["category"], "childcare");
        assert_eq!(body["classifier_rules"]["rules"].as_array().unwrap().len(), 20);
    }
}
