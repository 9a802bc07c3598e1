use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use server::{build_app, AppState};
use sitesearch_core::config::parse_config;
use sitesearch_core::{PageIndexer, SearchEngine, SiteStatus, Store};
use sitesearch_crawler::IndexingService;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

const SITE: &str = "http://127.0.0.1:9";

fn build_tiny_app() -> (Router, TempDir) {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path().join("index.sled")).unwrap();
    let config = Arc::new(
        parse_config(&format!(
            "[[sites]]\nurl = \"{SITE}\"\nname = \"Котики\"\n[crawler]\nmin_delay_ms = 0\nmax_delay_ms = 0\nmax_attempts = 1\n"
        ))
        .unwrap(),
    );
    let lemmatizer = config.morphology.build_lemmatizer().unwrap();
    let indexer = PageIndexer::new(store.clone(), lemmatizer.clone());

    let site = store.find_or_create_site(SITE, "Котики", SiteStatus::Indexed).unwrap();
    let html = "<html><head><title>Про кошек</title></head><body>Кошка, кошка и ещё раз кошка.</body></html>";
    indexer.index(&site, "/cats", 200, html, "Про кошек Кошка, кошка и ещё раз кошка.").unwrap();

    let search = SearchEngine::new(store.clone(), lemmatizer, config.search.clone());
    let indexing = IndexingService::new(config, indexer).unwrap();
    let state = AppState { indexing: Arc::new(indexing), search: Arc::new(search), store };
    (build_app(state), dir)
}

async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body: Bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

fn encode(s: &str) -> String {
    s.bytes().map(|b| format!("%{b:02X}")).collect()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let (app, _dir) = build_tiny_app();

    let (status, json) = call(app, "GET", &format!("/api/search?query={}", encode("кошки"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], true);
    assert_eq!(json["count"], 1);
    let hit = &json["data"][0];
    assert_eq!(hit["site"], SITE);
    assert_eq!(hit["siteName"], "Котики");
    assert_eq!(hit["uri"], "/cats");
    assert_eq!(hit["title"], "Про кошек");
    assert_eq!(hit["relevance"].as_f64().unwrap(), 1.0);
    assert!(hit["snippet"].as_str().unwrap().contains("<b>"));
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let (app, _dir) = build_tiny_app();
    let (status, json) = call(app, "GET", "/api/search?query=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["result"], false);
    assert_eq!(json["error"], "Query is empty");
}

#[tokio::test]
async fn unknown_site_filter_yields_nothing() {
    let (app, _dir) = build_tiny_app();
    let uri = format!("/api/search?query={}&site={}", encode("кошка"), encode("https://nowhere.ru"));
    let (status, json) = call(app, "GET", &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 0);
    assert_eq!(json["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn statistics_report_indexed_site() {
    let (app, _dir) = build_tiny_app();
    let (status, json) = call(app, "GET", "/api/statistics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"], true);
    let stats = &json["statistics"];
    assert_eq!(stats["total"]["sites"], 1);
    assert_eq!(stats["total"]["pages"], 1);
    assert_eq!(stats["total"]["indexing"], false);
    assert_eq!(stats["detailed"][0]["status"], "INDEXED");
}

#[tokio::test]
async fn stop_without_running_crawl_is_rejected() {
    let (app, _dir) = build_tiny_app();
    let (status, json) = call(app, "GET", "/api/stopIndexing").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Indexing is not running");
}

#[tokio::test]
async fn index_page_outside_configured_sites_is_rejected() {
    let (app, _dir) = build_tiny_app();
    let uri = format!("/api/indexPage?url={}", encode("https://other.ru/page"));
    let (status, json) = call(app, "POST", &uri).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["result"], false);
    assert!(json["error"].as_str().unwrap().starts_with("Site not found in configuration"));
}
