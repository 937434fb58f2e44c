// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET / and GET /health
// - POST /scrape (validation, cache miss, cache hit, use_cache=false)
// - POST /scrape/async (accepted, completes in the background, queue full)
// - GET /cache/{query}

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value as Json};
use tower::ServiceExt as _; // for `oneshot`

use market_scraper::config::AppConfig;
use market_scraper::sources::DynAdapter;
use market_scraper::store::MemoryStore;
use market_scraper::{build_state, create_router};

use common::{coordinator, fast_config, seeded_store, SlowAdapter, StaticAdapter};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    fiverr: Arc<StaticAdapter>,
}

fn test_app(store: Arc<MemoryStore>) -> TestApp {
    let fiverr = StaticAdapter::with_gigs("fiverr", 4);
    let upwork = StaticAdapter::with_gigs("upwork", 2);
    let c = coordinator(
        vec![fiverr.clone() as DynAdapter, upwork as DynAdapter],
        fast_config(),
    );
    let (state, _worker) = build_state(c, store.clone(), &AppConfig::default());
    TestApp {
        router: create_router(state),
        store,
        fiverr,
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Json) {
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, headers, v)
}

fn post_json(uri: &str, payload: Json) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build GET")
}

#[tokio::test]
async fn root_and_health_report_service_state() {
    let app = test_app(Arc::new(MemoryStore::new()));

    let (status, _, v) = send(&app.router, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "running");
    assert_eq!(v["service"], "market-scraper");

    let (status, _, v) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "healthy");
    assert_eq!(v["store"], "memory");
    assert_eq!(v["adapters"], json!(["fiverr", "upwork"]));
}

#[tokio::test]
async fn unknown_business_type_is_rejected_before_any_adapter_runs() {
    let app = test_app(Arc::new(MemoryStore::new()));

    let payload = json!({
        "business_type": "vehicle",
        "offering_type": "service",
        "query": "logo design"
    });
    let (status, _, v) = send(&app.router, post_json("/scrape", payload)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["status"], "error");
    assert!(v["message"].as_str().unwrap().contains("business_type"));
    assert_eq!(app.fiverr.calls(), 0);
    assert!(app.store.is_empty());
}

#[tokio::test]
async fn malformed_bodies_are_client_errors() {
    let app = test_app(Arc::new(MemoryStore::new()));

    let missing_query = json!({ "business_type": "digital", "offering_type": "service" });
    let (status, _, v) = send(&app.router, post_json("/scrape", missing_query)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(v["status"], "error");

    let negative_age = json!({
        "business_type": "digital",
        "offering_type": "service",
        "query": "logo design",
        "max_age_hours": -3
    });
    let (status, _, _) = send(&app.router, post_json("/scrape", negative_age)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.fiverr.calls(), 0);
}

#[tokio::test]
async fn scrape_miss_acquires_and_reports_failures() {
    let app = test_app(Arc::new(MemoryStore::new()));

    let payload = json!({
        "business_type": "digital",
        "offering_type": "service",
        "query": "logo design"
    });
    let (status, headers, v) = send(&app.router, post_json("/scrape", payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-cache"], "MISS");
    assert_eq!(v["status"], "success");
    assert_eq!(v["count"], 6);
    assert_eq!(v["message"], "Found 6 market listings");
    assert_eq!(v["data"].as_array().unwrap().len(), 6);
    assert_eq!(v["decision"], "ACQUIRE_FRESH");
    // freelancer has no adapter: partial success, not an error
    assert_eq!(v["run"]["successful"], 2);
    assert_eq!(v["run"]["failed"], 1);
    assert_eq!(v["run"]["adapters"][2]["error"]["source"], "freelancer");

    let first = &v["data"][0];
    assert_eq!(first["source"], "fiverr");
    assert_eq!(first["currency"], "USD");
    assert_eq!(first["category"], "logo design");
    assert_eq!(app.store.len(), 6);
}

#[tokio::test]
async fn scrape_hit_serves_from_store() {
    let app = test_app(seeded_store("logo design", 12, 0));

    let payload = json!({
        "business_type": "digital",
        "offering_type": "service",
        "query": "logo design",
        "use_cache": true,
        "max_age_hours": 24
    });
    let (status, headers, v) = send(&app.router, post_json("/scrape", payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-cache"], "HIT");
    assert_eq!(v["count"], 12);
    assert_eq!(v["decision"], "SERVE_CACHED");
    assert!(v.get("run").is_none());
    assert_eq!(app.fiverr.calls(), 0);
}

#[tokio::test]
async fn use_cache_false_bypasses_fresh_records() {
    let app = test_app(seeded_store("logo design", 12, 0));

    let payload = json!({
        "business_type": "digital",
        "offering_type": "service",
        "query": "logo design",
        "use_cache": false
    });
    let (status, headers, v) = send(&app.router, post_json("/scrape", payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-cache"], "MISS");
    assert_eq!(v["count"], 6);
    assert_eq!(app.fiverr.calls(), 1);
}

#[tokio::test]
async fn cache_route_uses_query_defaults() {
    let app = test_app(seeded_store("logo design", 12, 0));

    let (status, headers, v) = send(&app.router, get("/cache/logo%20design")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-cache"], "HIT");
    assert_eq!(v["count"], 12);

    let (status, _, _) = send(&app.router, get("/cache/logo?business_type=boat")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn async_scrape_is_accepted_and_lands_in_the_store() {
    let app = test_app(Arc::new(MemoryStore::new()));

    let payload = json!({
        "business_type": "digital",
        "offering_type": "service",
        "query": "logo design"
    });
    let (status, _, v) = send(&app.router, post_json("/scrape/async", payload)).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(v["status"], "accepted");
    assert_eq!(v["message"], "Scraping job queued in background");
    assert_eq!(v["query"], "logo design");

    let landed = tokio::time::timeout(Duration::from_secs(5), async {
        while app.store.len() < 6 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(landed.is_ok(), "background job never persisted its listings");
}

#[tokio::test]
async fn async_scrape_validates_before_queueing() {
    let app = test_app(Arc::new(MemoryStore::new()));

    let payload = json!({
        "business_type": "digital",
        "offering_type": "rental",
        "query": "logo design"
    });
    let (status, _, _) = send(&app.router, post_json("/scrape/async", payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(app.fiverr.calls(), 0);
}

#[tokio::test]
async fn full_queue_answers_service_unavailable() {
    let slow = SlowAdapter::new("fiverr", Duration::from_secs(2));
    let c = coordinator(vec![slow as DynAdapter], fast_config());
    let config = AppConfig {
        queue_capacity: 1,
        ..AppConfig::default()
    };
    let (state, _worker) = build_state(c, Arc::new(MemoryStore::new()), &config);
    let router = create_router(state);

    let payload = json!({
        "business_type": "digital",
        "offering_type": "service",
        "query": "logo design"
    });
    let mut statuses = Vec::new();
    for _ in 0..3 {
        let (status, _, _) = send(&router, post_json("/scrape/async", payload.clone())).await;
        statuses.push(status);
    }

    assert_eq!(statuses[0], StatusCode::ACCEPTED);
    assert!(
        statuses.contains(&StatusCode::SERVICE_UNAVAILABLE),
        "expected a 503 once the queue is full, got {statuses:?}"
    );
}
