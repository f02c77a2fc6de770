//! Owner session against a fully wired server with the mock wallet.

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use strongbox_cashu::{encode, Proof};
use strongbox_server::api::create_router;
use strongbox_server::config::{HeirContact, ServerConfig, WalletBackend};
use strongbox_server::daemon::build_vault;
use strongbox_server::trigger::{ReleaseManifest, MANIFEST_FILE};
use tower::ServiceExt;

fn config(data_dir: &std::path::Path) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.data_dir = data_dir.to_path_buf();
    config.wallet.backend = WalletBackend::Mock;
    config.wallet.address = Some("tb1qhot".into());
    config.wallet.mock_balance_sats = 20_000;
    config.recovery.heirs = vec![HeirContact {
        label: "Spouse".into(),
        npub: Some("npub1spouse".into()),
        email: None,
    }];
    config
}

async fn call(router: &Router, method: &str, path: &str, body: Option<Value>) -> Value {
    let builder = Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json");
    let body = body.map_or_else(Body::empty, |v| Body::from(v.to_string()));
    let resp = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn owner_session() {
    let dir = tempfile::tempdir().unwrap();
    let vault = build_vault(&config(dir.path())).unwrap();
    vault.set_connected(true);
    let router = create_router(vault);

    let unlock = call(&router, "POST", "/unlock", Some(json!({"pattern": "55555"}))).await;
    assert_eq!(unlock["mode"], "GOD_MODE");

    for (amount, secret) in [(1000, "a"), (500, "b")] {
        let token = encode("https://testnut.cashu.space", &[Proof::new(amount, secret)]);
        let resp = call(&router, "POST", "/ecash/receive", Some(json!({"token": token}))).await;
        assert_eq!(resp["status"], "SUCCESS");
    }

    let status = call(&router, "GET", "/status", None).await;
    assert_eq!(status["balance"], 21_500);
    assert_eq!(status["breakdown"]["ecash"], 1500);
    assert_eq!(status["connection"], "CONNECTED");
    assert_eq!(status["logs"].as_array().unwrap().len(), 2);

    let beat = call(&router, "POST", "/dms/heartbeat", None).await;
    assert_eq!(beat["status"], "OK");
    let dms = call(&router, "GET", "/dms/status", None).await;
    assert_eq!(dms["status"], "ARMED");

    let scan = call(&router, "GET", "/hwi/scan", None).await;
    assert_eq!(scan["status"], "DEVICE_FOUND");
    let cold = call(&router, "POST", "/hwi/get_address", None).await;
    assert_eq!(cold["address"], status["cold_storage"]);
}

#[tokio::test]
async fn duress_session_sees_same_api() {
    let dir = tempfile::tempdir().unwrap();
    let router = create_router(build_vault(&config(dir.path())).unwrap());

    let unlock = call(&router, "POST", "/unlock", Some(json!({"pattern": "44444"}))).await;
    assert_eq!(unlock["mode"], "DURESS_MODE");

    let status = call(&router, "GET", "/status", None).await;
    assert_eq!(status["connection"], "OFFLINE");
    assert_eq!(status["balance"], 20_000);
}

#[tokio::test(start_paused = true)]
async fn silent_owner_triggers_release() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.deadman.timeout_secs = 30;
    config.vault.persist_ledger = false;

    let vault = build_vault(&config).unwrap();
    let timer = vault.deadman().spawn();
    let router = create_router(vault);

    tokio::time::sleep(Duration::from_secs(20)).await;
    call(&router, "POST", "/dms/heartbeat", None).await;

    tokio::time::sleep(Duration::from_secs(25)).await;
    let dms = call(&router, "GET", "/dms/status", None).await;
    assert_eq!(dms["status"], "ARMED");
    assert_eq!(dms["urgency"], "CHECKIN_RECOMMENDED");

    tokio::time::sleep(Duration::from_secs(10)).await;
    let dms = call(&router, "GET", "/dms/status", None).await;
    assert_eq!(dms["status"], "TRIGGERED");
    assert_eq!(dms["remaining_seconds"], 0);

    let manifest_path = config.release_dir().join(MANIFEST_FILE);
    let manifest: ReleaseManifest =
        serde_json::from_str(&std::fs::read_to_string(manifest_path).unwrap()).unwrap();
    assert_eq!(manifest.episode, 1);
    assert_eq!(manifest.heirs.len(), 1);
    assert_eq!(manifest.cold_storage_address, config.vault.cold_storage_address);

    timer.abort();
}
