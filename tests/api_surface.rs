use axum::body::Body;
use axum::http::{Request, StatusCode};
use proxypool_core::api::{self, ApiState};
use proxypool_core::config::Config;
use proxypool_core::lease::LeaseManager;
use proxypool_core::models::ProxyRecord;
use proxypool_core::signal::SignalBus;
use proxypool_core::storage::ProxyStore;
use std::sync::Arc;
use tower::ServiceExt;

async fn state_with(records: Vec<ProxyRecord>) -> ApiState {
    let store = Arc::new(ProxyStore::open_in_memory().unwrap());
    store.upsert(records).await.unwrap();
    let leases = Arc::new(LeaseManager::new(store.clone()));
    leases.load().await.unwrap();
    ApiState {
        store,
        leases,
        signal: SignalBus::new(),
        config: Arc::new(Config::default()),
    }
}

fn candidate(endpoint: &str, score: i32) -> ProxyRecord {
    let mut r = ProxyRecord::new_candidate(endpoint, 0);
    r.score = score;
    r
}

#[tokio::test]
async fn acquire_then_info_then_release_round_trips() {
    let state = state_with(vec![candidate("1.2.3.4:8080", 90)]).await;
    let app = api::router(state);

    let acquire_req = Request::builder()
        .method("POST")
        .uri("/proxy/acquire")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(acquire_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let task_id = parsed["data"]["task_id"].as_str().unwrap().to_string();
    assert_eq!(parsed["data"]["proxy"], "1.2.3.4:8080");

    let info_req = Request::builder()
        .method("GET")
        .uri("/proxy/info_1.2.3.4:8080")
        .body(Body::empty())
        .unwrap();
    let info_response = app.clone().oneshot(info_req).await.unwrap();
    assert_eq!(info_response.status(), StatusCode::OK);

    let release_body = serde_json::json!({
        "proxy": "1.2.3.4:8080",
        "task_id": task_id,
        "success": true,
        "response_time": 0.3,
    });
    let release_req = Request::builder()
        .method("POST")
        .uri("/proxy/release")
        .header("content-type", "application/json")
        .body(Body::from(release_body.to_string()))
        .unwrap();
    let release_response = app.oneshot(release_req).await.unwrap();
    assert_eq!(release_response.status(), StatusCode::OK);
}

#[tokio::test]
async fn acquire_with_no_idle_proxies_returns_404() {
    let state = state_with(vec![]).await;
    let app = api::router(state);

    let req = Request::builder()
        .method("POST")
        .uri("/proxy/acquire")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn info_endpoint_rejects_missing_prefix() {
    let state = state_with(vec![candidate("1.2.3.4:8080", 90)]).await;
    let app = api::router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/proxy/1.2.3.4:8080")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
