//! End-to-end happy path test.
//!
//! Runs the orchestrator on a real socket next to a stub ledger node and
//! walks the operator flow:
//!
//! 1. Health and dependency status
//! 2. Recommend a region for a role
//! 3. Allocate, inspect the summary, release
//! 4. Deploy a node configuration, deploy again, roll back
//!
//! ## Running
//!
//! ```bash
//! cargo test -p qorch-e2e --test happy_path
//! ```

use std::path::Path;

use axum::{routing::post, Json, Router};
use qorch_deploy::{DeployOutcome, RollbackOutcome};
use qorch_orchestrator::{api, AppState, Config, Engine};
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::net::TcpListener;

const QUOTA: &str = r#"{
  "eastus": {
    "Standard_D4s_v3": { "total": 20, "used": 4, "available": 16, "assigned_to": ["validator"] }
  },
  "westeurope": {
    "Standard_D8s_v3": { "total": 10, "used": 8, "available": 2, "assigned_to": ["validator", "rpc"] }
  }
}"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        )
        .with_test_writer()
        .try_init();
}

/// Serve `router` on an ephemeral port and return its base URL.
async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// A ledger node that answers every JSON-RPC call with a block number.
async fn spawn_ledger() -> String {
    let router = Router::new().route(
        "/",
        post(|Json(req): Json<Value>| async move {
            Json(json!({ "jsonrpc": "2.0", "id": req["id"], "result": "0x2a" }))
        }),
    );
    spawn(router).await
}

fn config(dir: &Path, ledger_url: &str) -> Config {
    let quota = dir.join("quota.json");
    if !quota.exists() {
        std::fs::write(&quota, QUOTA).unwrap();
    }

    let vars = [
        ("QORCH_QUOTA_FILE", quota.display().to_string()),
        ("QORCH_VERSIONS_DIR", dir.join("versions").display().to_string()),
        ("BESU_RPC_URL", ledger_url.to_string()),
        ("QORCH_REQUEST_TIMEOUT_SECS", "5".to_string()),
    ];
    Config::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap()
}

#[tokio::test]
async fn happy_path() {
    init_tracing();

    let dir = tempdir().unwrap();
    let ledger_url = spawn_ledger().await;
    let engine = Engine::build(config(dir.path(), &ledger_url)).unwrap();
    let base_url = spawn(api::create_router(AppState::new(engine))).await;
    let client = reqwest::Client::new();

    // 1. Health and dependency status
    let resp = client.get(format!("{base_url}/health")).send().await.unwrap();
    assert!(resp.status().is_success());

    let resp = client
        .get(format!("{base_url}/api/besu/status"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success(), "ledger stub should be reachable");

    // 2. Recommendation
    let resp = client
        .post(format!("{base_url}/api/quotas/recommendations"))
        .json(&json!({ "role": "validator", "minimumQuota": 2 }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    let first = &body["recommendations"][0];
    assert_eq!(first["region"], "eastus");
    assert_eq!(first["sku"], "Standard_D4s_v3");

    // 3. Allocate, summarize, release
    let resp = client
        .post(format!("{base_url}/api/quotas/allocations"))
        .json(&json!({
            "region": "eastus",
            "sku": "Standard_D4s_v3",
            "role": "validator",
            "amount": 6,
            "applicationId": "chain-a",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let body: Value = resp.json().await.unwrap();
    let id = body["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("alloc_"));

    let summary: Value = client
        .get(format!("{base_url}/api/quotas/summary?role=validator"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let eastus = summary
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["region"] == "eastus")
        .unwrap();
    assert_eq!(eastus["available"], 10);
    assert_eq!(eastus["reserved"], 6);

    let resp = client
        .delete(format!("{base_url}/api/quotas/allocations/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);

    let resp = client
        .delete(format!("{base_url}/api/quotas/allocations/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204, "release is idempotent");

    let log: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("allocations.json")).unwrap())
            .unwrap();
    assert_eq!(log["allocations"][0]["status"], "released");

    // 4. Deploy, redeploy, roll back
    let engine = Engine::build(config(dir.path(), &ledger_url)).unwrap();
    let node_config = dir.path().join("node.toml");
    std::fs::write(
        &node_config,
        "data-path = \"/data\"\ngenesis-file = \"/genesis.json\"\nrpc-http-enabled = true\n",
    )
    .unwrap();

    let first = match engine.deployer.deploy(&node_config).await {
        DeployOutcome::Succeeded { version, warnings } => {
            assert!(warnings.is_empty());
            version
        }
        other => panic!("deploy failed: {other:?}"),
    };

    // Version labels have one-second resolution.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
    std::fs::write(&node_config, "data-path = \"/data2\"\n").unwrap();
    match engine.deployer.deploy(&node_config).await {
        DeployOutcome::Succeeded { warnings, .. } => {
            assert_eq!(warnings.len(), 2, "two recommended fields are missing");
        }
        other => panic!("second deploy failed: {other:?}"),
    }

    let versions = engine.deployer.list_versions().await.unwrap();
    assert_eq!(versions.len(), 2);

    match engine.deployer.rollback(&first.label).await {
        RollbackOutcome::Succeeded { version } => assert_eq!(version, first),
        other => panic!("rollback failed: {other:?}"),
    }
}
