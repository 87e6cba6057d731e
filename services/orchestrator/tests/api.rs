//! HTTP API driven through the router with `oneshot` requests.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    routing::get,
    Json, Router,
};
use qorch_orchestrator::{api, AppState, Config, Engine};
use rstest::rstest;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::time::timeout;
use tower::ServiceExt;

const QUOTA: &str = r#"{
  "eastus": {
    "D2": { "total": 10, "used": 5, "available": 5, "assigned_to": ["validator"] }
  },
  "westus": {
    "D4": { "total": 8, "used": 0, "available": 8, "assigned_to": ["validator", "rpc"] }
  }
}"#;

fn router_with(dir: &Path, extra: &[(&str, String)]) -> Router {
    let quota = dir.join("quota.json");
    std::fs::write(&quota, QUOTA).unwrap();

    let mut vars = vec![("QORCH_QUOTA_FILE", quota.display().to_string())];
    vars.extend(extra.iter().cloned());

    let config = Config::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap();
    api::create_router(AppState::new(Engine::build(config).unwrap()))
}

fn router() -> (TempDir, Router) {
    let dir = tempdir().unwrap();
    let app = router_with(dir.path(), &[]);
    (dir, app)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn health_is_ok() {
    let (_dir, app) = router();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn quotas_are_filtered() {
    let (_dir, app) = router();

    let (status, body) = send(&app, Method::GET, "/api/quotas?role=rpc", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("eastus").is_none());
    assert_eq!(body["westus"]["D4"]["available"], 8);

    let (_, body) = send(&app, Method::GET, "/api/quotas?region=eastus", None).await;
    assert_eq!(body.as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn allocate_and_release() {
    let (_dir, app) = router();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/quotas/allocations",
        Some(json!({
            "region": "eastus",
            "sku": "D2",
            "role": "validator",
            "amount": 3,
            "applicationId": "chain-a"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("alloc_"));

    let (_, quotas) = send(&app, Method::GET, "/api/quotas?region=eastus", None).await;
    assert_eq!(quotas["eastus"]["D2"]["available"], 2);

    let uri = format!("/api/quotas/allocations/{id}");
    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, quotas) = send(&app, Method::GET, "/api/quotas?region=eastus", None).await;
    assert_eq!(quotas["eastus"]["D2"]["available"], 5);

    let (status, body) =
        send(&app, Method::DELETE, "/api/quotas/allocations/alloc_missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "allocation_not_found");
}

#[rstest]
#[case(6, StatusCode::CONFLICT, "insufficient_quota")]
#[case(0, StatusCode::BAD_REQUEST, "invalid_parameters")]
#[tokio::test]
async fn rejected_allocations(
    #[case] amount: i64,
    #[case] expected: StatusCode,
    #[case] code: &str,
) {
    let (_dir, app) = router();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/quotas/allocations",
        Some(json!({
            "region": "eastus",
            "sku": "D2",
            "role": "validator",
            "amount": amount,
            "application_id": "chain-a"
        })),
    )
    .await;
    assert_eq!(status, expected);
    assert_eq!(body["code"], code);
}

#[rstest]
#[case("/api/quotas/recommendations", json!({ "role": "validator" }))]
#[case("/api/quotas/recommendations", json!({ "role": "validator", "minimumQuota": "two" }))]
#[case("/api/quotas/allocations", json!({ "region": "eastus", "sku": "D2" }))]
#[tokio::test]
async fn malformed_bodies_are_problem_responses(#[case] uri: &str, #[case] body: Value) {
    let (_dir, app) = router();
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let problem: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(problem["status"], 400);
    assert_eq!(problem["code"], "invalid_body");
}

#[tokio::test]
async fn recommendations_are_ranked() {
    let (_dir, app) = router();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/quotas/recommendations",
        Some(json!({ "role": "validator", "minimumQuota": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let recs = body["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0]["region"], "westus");
    assert_eq!(recs[1]["region"], "eastus");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/quotas/recommendations",
        Some(json!({ "role": "validator", "minimumQuota": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn summary_requires_role() {
    let (_dir, app) = router();

    let (status, _) = send(&app, Method::GET, "/api/quotas/summary", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, "/api/quotas/summary?role=rpc", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["region"], "westus");
    assert_eq!(body[0]["usage_percent"], "0.00");
}

#[tokio::test]
async fn refresh_without_source_is_unavailable() {
    let (_dir, app) = router();
    let (status, body) = send(&app, Method::POST, "/api/quotas/refresh", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);
}

#[tokio::test]
async fn refresh_from_file_source() {
    let dir = tempdir().unwrap();
    let export = dir.path().join("export.json");
    std::fs::write(&export, r#"{"northeurope": {"E8": {"total": 4, "used": 1}}}"#).unwrap();
    let app = router_with(
        dir.path(),
        &[("QORCH_QUOTA_SOURCE", export.display().to_string())],
    );

    let (status, body) = send(&app, Method::POST, "/api/quotas/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"], 1);

    let (_, quotas) = send(&app, Method::GET, "/api/quotas", None).await;
    assert_eq!(quotas["northeurope"]["E8"]["available"], 3);
}

#[tokio::test]
async fn refresh_fetch_does_not_block_quota_reads() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let source = Router::new().route(
        "/quotas",
        get({
            let entered = entered.clone();
            let release = release.clone();
            move || {
                let entered = entered.clone();
                let release = release.clone();
                async move {
                    entered.notify_one();
                    release.notified().await;
                    Json(json!({ "northeurope": { "E8": { "total": 4, "used": 1 } } }))
                }
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let source_url = format!("http://{}/quotas", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, source).await.unwrap();
    });

    let dir = tempdir().unwrap();
    let app = router_with(dir.path(), &[("QORCH_QUOTA_SOURCE", source_url)]);

    let refreshing = tokio::spawn({
        let app = app.clone();
        async move { send(&app, Method::POST, "/api/quotas/refresh", None).await }
    });
    entered.notified().await;

    // The source is still holding its response; reads must not wait for it.
    let (status, quotas) = timeout(
        Duration::from_secs(2),
        send(&app, Method::GET, "/api/quotas", None),
    )
    .await
    .expect("quota read blocked behind refresh fetch");
    assert_eq!(status, StatusCode::OK);
    assert!(quotas.get("eastus").is_some());

    release.notify_one();
    let (status, body) = refreshing.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"], 1);
}

#[tokio::test]
async fn status_endpoints_report_missing_configuration() {
    let (_dir, app) = router();

    let (status, body) = send(&app, Method::GET, "/api/besu/status", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["dependency"], "ledger_network");
    assert_eq!(body["available"], false);

    let (status, body) = send(&app, Method::GET, "/api/azure/status", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["message"].as_str().unwrap().contains("credentials"));
}

#[tokio::test]
async fn control_plane_status_with_credentials() {
    let dir = tempdir().unwrap();
    let app = router_with(
        dir.path(),
        &[
            ("AZURE_SUBSCRIPTION_ID", "sub".to_string()),
            ("AZURE_TENANT_ID", "tenant".to_string()),
        ],
    );

    let (status, body) = send(&app, Method::GET, "/api/azure/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);
}
