use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::broker::PickupOutcome;
use crate::errors::AppError;
use crate::middleware::auth::RequesterRef;
use crate::models::request::Credential;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub service: String,
    pub scope: String,
    pub reason: String,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub request_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Deserialize)]
pub struct PickupRequest {
    pub request_id: String,
}

#[derive(Serialize)]
pub struct PickupResponse {
    pub request_id: String,
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
    pub message: String,
}

#[derive(Deserialize)]
pub struct DecisionRequest {
    pub request_id: String,
    pub approved: bool,
    pub decided_by: Option<String>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub services: Vec<String>,
    pub vault_connected: bool,
    pub notification_connected: bool,
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /request — submit a credential request for human approval.
pub async fn submit_request(
    State(state): State<Arc<AppState>>,
    Extension(RequesterRef(requester)): Extension<RequesterRef>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    let client_ref = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let snapshot = state
        .broker
        .submit(&payload.service, &payload.scope, &payload.reason, &requester, &client_ref)
        .await?;

    Ok(Json(SubmitResponse {
        request_id: snapshot.id,
        status: "pending".to_string(),
        message: "approval requested; poll /pickup with the request_id".to_string(),
    }))
}

/// POST /pickup — poll for the outcome; first approved poll gets the
/// credential, exactly once.
pub async fn pickup_credential(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PickupRequest>,
) -> Result<Json<PickupResponse>, AppError> {
    let outcome = state.broker.pickup(&payload.request_id).await?;

    let response = match outcome {
        PickupOutcome::Pending => PickupResponse {
            request_id: payload.request_id,
            approved: false,
            credential: None,
            message: "pending".to_string(),
        },
        // One shape for denial and timeout; callers cannot tell them apart.
        PickupOutcome::Refused => PickupResponse {
            request_id: payload.request_id,
            approved: false,
            credential: None,
            message: "denied".to_string(),
        },
        PickupOutcome::Credential(credential) => PickupResponse {
            request_id: payload.request_id,
            approved: true,
            credential: Some(credential),
            message: "approved".to_string(),
        },
        PickupOutcome::NoLongerAvailable => PickupResponse {
            request_id: payload.request_id,
            approved: false,
            credential: None,
            message: "credential no longer available".to_string(),
        },
    };
    Ok(Json(response))
}

/// POST /decision — inbound decision callback from the notification side.
pub async fn decide_request(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<crate::broker::DecisionOutcome>, AppError> {
    let decided_by = payload.decided_by.as_deref().unwrap_or("approver");
    let outcome = state.broker.handle_decision(&payload.request_id, payload.approved, decided_by)?;
    Ok(Json(outcome))
}

/// GET /status — catalog listing plus collaborator connectivity.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let status = state.broker.status().await;
    Json(StatusResponse {
        status: "online".to_string(),
        services: status.services,
        vault_connected: status.vault_connected,
        notification_connected: status.notification_connected,
    })
}

/// GET /health — unauthenticated liveness + connectivity booleans.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let vault_connected = state.broker.vault_reachable().await;
    let notification_connected = state.broker.notification_reachable().await;
    let status =
        if vault_connected && notification_connected { "healthy" } else { "degraded" };

    Json(json!({
        "status": status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "vault_status": if vault_connected { "connected" } else { "disconnected" },
        "notification_status": if notification_connected { "connected" } else { "disconnected" },
    }))
}
