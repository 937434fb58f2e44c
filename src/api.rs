use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::acquire::DEFAULT_REGION;
use crate::aggregate::RunResult;
use crate::cache::{AcquisitionRequest, CacheDecision, CacheManager, DEFAULT_MAX_AGE_HOURS};
use crate::error::Error;
use crate::jobs::JobQueue;
use crate::listing::Listing;
use crate::taxonomy::TaxonomyKey;

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheManager>,
    pub jobs: JobQueue,
    pub environment: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/scrape", post(scrape))
        .route("/scrape/async", post(scrape_async))
        .route("/cache/{query}", get(cached))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Error body: `{"status":"error","message":...}`.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self(Error::validation(r.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Configuration(_) | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(target: "api", error = %self.0, "request failed");
        }
        let body = json!({ "status": "error", "message": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    pub business_type: String,
    pub offering_type: String,
    pub query: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub use_cache: Option<bool>,
    #[serde(default)]
    pub max_age_hours: Option<i64>,
}

impl ScrapeRequest {
    /// Everything is checked here, before any store read or adapter call.
    fn validate(&self) -> Result<AcquisitionRequest, Error> {
        let key = TaxonomyKey::parse(&self.business_type, &self.offering_type)?;
        build_request(key, &self.query, self.max_age_hours)
            .map(|r| r.with_region(region_or_default(self.region.as_deref())))
    }
}

fn region_or_default(region: Option<&str>) -> String {
    region
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REGION)
        .to_string()
}

fn build_request(
    key: TaxonomyKey,
    query: &str,
    max_age_hours: Option<i64>,
) -> Result<AcquisitionRequest, Error> {
    let query = query.trim();
    if query.is_empty() {
        return Err(Error::validation("query must not be empty"));
    }
    let hours = match max_age_hours {
        None => DEFAULT_MAX_AGE_HOURS,
        Some(h) => u32::try_from(h)
            .map_err(|_| Error::validation("max_age_hours must be a non-negative integer"))?,
    };
    Ok(AcquisitionRequest::new(key, query).with_max_age_hours(hours))
}

#[derive(Serialize)]
struct ScrapeResponse {
    status: &'static str,
    message: String,
    count: usize,
    data: Vec<Listing>,
    decision: CacheDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<RunResult>,
}

impl ScrapeResponse {
    fn into_response_with_cache_header(self) -> Response {
        let hit = if self.decision.is_hit() { "HIT" } else { "MISS" };
        let mut resp = Json(self).into_response();
        resp.headers_mut().insert("x-cache", HeaderValue::from_static(hit));
        resp
    }
}

fn respond(outcome: crate::cache::CacheOutcome) -> Response {
    let count = outcome.listings.len();
    ScrapeResponse {
        status: "success",
        message: format!("Found {count} market listings"),
        count,
        data: outcome.listings,
        decision: outcome.decision,
        run: outcome.run,
    }
    .into_response_with_cache_header()
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "service": "market-scraper",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let coordinator = state.cache.coordinator();
    Json(json!({
        "status": "healthy",
        "store": state.cache.store().backend(),
        "adapters": coordinator.registry().names(),
        "environment": state.environment,
    }))
}

async fn scrape(
    State(state): State<AppState>,
    body: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let req = body.validate()?;

    let outcome = if body.use_cache.unwrap_or(true) {
        state.cache.serve(&req).await?
    } else {
        state.cache.refresh(&req).await?
    };
    Ok(respond(outcome))
}

async fn scrape_async(
    State(state): State<AppState>,
    body: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let req = body.validate()?;
    // reject unmapped pairs now rather than in the worker
    state.cache.coordinator().router().route(req.key)?;

    let query = req.query.clone();
    state.jobs.submit(req).map_err(Error::from)?;

    let body = json!({
        "status": "accepted",
        "message": "Scraping job queued in background",
        "query": query,
    });
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

#[derive(Debug, Deserialize)]
struct CacheParams {
    #[serde(default = "default_business")]
    business_type: String,
    #[serde(default = "default_offering")]
    offering_type: String,
    #[serde(default)]
    max_age_hours: Option<i64>,
}

fn default_business() -> String {
    "digital".into()
}

fn default_offering() -> String {
    "service".into()
}

/// Same semantics as `POST /scrape` with `use_cache = true`.
async fn cached(
    State(state): State<AppState>,
    Path(query): Path<String>,
    Query(params): Query<CacheParams>,
) -> Result<Response, ApiError> {
    let key = TaxonomyKey::parse(&params.business_type, &params.offering_type)?;
    let req = build_request(key, &query, params.max_age_hours)?;
    let outcome = state.cache.serve(&req).await?;
    Ok(respond(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{BusinessKind, OfferingKind};

    fn body(business: &str, query: &str, hours: Option<i64>) -> ScrapeRequest {
        ScrapeRequest {
            business_type: business.into(),
            offering_type: "service".into(),
            query: query.into(),
            region: Some("  ".into()),
            use_cache: None,
            max_age_hours: hours,
        }
    }

    #[test]
    fn validate_fills_defaults() {
        let req = body("Digital", " logo design ", None).validate().unwrap();
        assert_eq!(req.key, TaxonomyKey::new(BusinessKind::Digital, OfferingKind::Service));
        assert_eq!(req.query, "logo design");
        assert_eq!(req.region, "global");
        assert_eq!(req.max_age_hours, 24);
    }

    #[test]
    fn validate_rejects_bad_input() {
        assert!(matches!(body("vehicle", "x", None).validate(), Err(Error::Validation(_))));
        assert!(matches!(body("digital", " ", None).validate(), Err(Error::Validation(_))));
        assert!(matches!(body("digital", "x", Some(-1)).validate(), Err(Error::Validation(_))));
    }
}
