//! HTTP API.
//!
//! Every handler answers with a JSON payload and status 200. Malformed request
//! bodies map onto the domain's failure payload (`ERROR`, `LOCKED`) instead of
//! a framework rejection page.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::Method;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strongbox_deadman::{SwitchState, Urgency};
use strongbox_vault::{AccessMode, Vault, VaultStatus};
use tower_http::cors::{Any, CorsLayer};

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Build the router with every route and a permissive CORS layer.
pub fn create_router(vault: Arc<Vault>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/status", get(status_handler))
        .route("/unlock", post(unlock_handler))
        .route("/ecash/receive", post(receive_handler))
        .route("/dms/heartbeat", post(heartbeat_handler))
        .route("/dms/status", get(dms_status_handler))
        .route("/hwi/scan", get(hwi_scan_handler))
        .route("/hwi/get_address", post(hwi_address_handler))
        .layer(cors)
        .with_state(vault)
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub pattern: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnlockResponse {
    pub mode: AccessMode,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveRequest {
    pub token: String,
}

/// `{status}` plus whichever detail the endpoint reports.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Outcome {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Outcome {
    fn status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            address: None,
            fingerprint: None,
            model: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DmsStatusResponse {
    pub status: SwitchState,
    pub remaining_seconds: u64,
    pub urgency: Urgency,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn status_handler(State(vault): State<Arc<Vault>>) -> Json<VaultStatus> {
    Json(vault.status().await)
}

async fn unlock_handler(
    State(vault): State<Arc<Vault>>,
    payload: Result<Json<UnlockRequest>, JsonRejection>,
) -> Json<UnlockResponse> {
    let mode = match payload {
        Ok(Json(request)) => vault.unlock(&request.pattern),
        Err(rejection) => {
            log::debug!("Unparseable unlock request: {}", rejection);
            AccessMode::Locked
        }
    };
    Json(UnlockResponse { mode })
}

async fn receive_handler(
    State(vault): State<Arc<Vault>>,
    payload: Result<Json<ReceiveRequest>, JsonRejection>,
) -> Json<Outcome> {
    let accepted = match payload {
        // Crediting writes the ledger file.
        Ok(Json(request)) => {
            match tokio::task::spawn_blocking(move || vault.receive_ecash(&request.token)).await {
                Ok(redemption) => redemption.is_success(),
                Err(e) => {
                    log::warn!("Ecash receive task aborted: {}", e);
                    false
                }
            }
        }
        Err(rejection) => {
            log::debug!("Unparseable receive request: {}", rejection);
            false
        }
    };
    Json(Outcome::status(if accepted { "SUCCESS" } else { "ERROR" }))
}

async fn heartbeat_handler(State(vault): State<Arc<Vault>>) -> Json<Outcome> {
    vault.heartbeat().await;
    Json(Outcome::status("OK"))
}

async fn dms_status_handler(State(vault): State<Arc<Vault>>) -> Json<DmsStatusResponse> {
    let status = vault.deadman_status();
    Json(DmsStatusResponse {
        status: status.state,
        remaining_seconds: status.remaining_secs(),
        urgency: status.urgency,
    })
}

async fn hwi_scan_handler(State(vault): State<Arc<Vault>>) -> Json<Outcome> {
    let device = match tokio::task::spawn_blocking(move || vault.scan_signer()).await {
        Ok(device) => device,
        Err(e) => {
            log::warn!("Hardware signer scan task aborted: {}", e);
            None
        }
    };
    match device {
        Some(device) => Json(Outcome {
            fingerprint: Some(device.fingerprint),
            model: Some(device.model),
            ..Outcome::status("DEVICE_FOUND")
        }),
        None => Json(Outcome::status("NO_DEVICE")),
    }
}

async fn hwi_address_handler(State(vault): State<Arc<Vault>>) -> Json<Outcome> {
    let address = match tokio::task::spawn_blocking(move || vault.signer_address()).await {
        Ok(address) => address,
        Err(e) => {
            log::warn!("Hardware signer address task aborted: {}", e);
            None
        }
    };
    match address {
        Some(address) => Json(Outcome {
            address: Some(address),
            ..Outcome::status("SUCCESS")
        }),
        None => Json(Outcome::status("ERROR")),
    }
}
