//! HTTP surface — inbound-email webhook and thread endpoints for the dashboard.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use tracing::{error, info};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::mail::normalize::InboundPayload;
use crate::recorder::{InboundOutcome, Recorder};
use crate::store::Store;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub recorder: Arc<Recorder>,
    pub store: Arc<dyn Store>,
}

/// Build the Axum router with webhook and thread routes.
pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/inbound-email", post(inbound_email))
        .route(
            "/api/orders/{id}/communications",
            get(list_communications).post(send_communication),
        )
        .route("/api/communications/{id}/read", post(mark_read))
        .route("/api/communications/unread-count", get(unread_count))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "order-desk"
    }))
}

// ── Webhook ─────────────────────────────────────────────────────────────

/// POST /webhooks/inbound-email
///
/// Always answers 200 — any other status makes the mail provider retry
/// delivery indefinitely. Business-logic failures are logged and acknowledged.
async fn inbound_email(
    State(state): State<AppState>,
    Form(payload): Form<InboundPayload>,
) -> impl IntoResponse {
    match state.recorder.handle_inbound(payload).await {
        Ok(InboundOutcome::Recorded { communication_id }) => Json(serde_json::json!({
            "message": "Reply received",
            "communicationId": communication_id,
        })),
        Ok(outcome) => {
            info!(outcome = ?outcome, "Inbound email dropped");
            Json(serde_json::json!({ "message": outcome.ack_message() }))
        }
        Err(e) => {
            error!(error = %e, "Inbound email processing failed");
            Json(serde_json::json!({ "message": "Error processing email" }))
        }
    }
}

// ── Thread endpoints ────────────────────────────────────────────────────

/// GET /api/orders/{id}/communications
async fn list_communications(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.store.get_order(id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "Order not found"})),
            )
                .into_response();
        }
        Err(e) => {
            error!(error = %e, "Failed to load order");
            return internal_error();
        }
    }

    match state.store.list_communications(id).await {
        Ok(thread) => Json(thread).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list communications");
            internal_error()
        }
    }
}

/// Body for POST /api/orders/{id}/communications.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub subject: String,
    pub body: String,
    pub admin_id: Option<String>,
}

/// POST /api/orders/{id}/communications — send a staff message.
async fn send_communication(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> impl IntoResponse {
    match state
        .recorder
        .send_outbound(id, req.admin_id, req.subject, req.body)
        .await
    {
        Ok(comm) => (StatusCode::CREATED, Json(comm)).into_response(),
        Err(crate::error::Error::Database(crate::error::DatabaseError::NotFound {
            ..
        })) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Order not found"})),
        )
            .into_response(),
        Err(crate::error::Error::Mail(e)) => {
            error!(error = %e, "Failed to send outbound message");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": "Failed to send email"})),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to record outbound message");
            internal_error()
        }
    }
}

/// POST /api/communications/{id}/read
async fn mark_read(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.store.mark_communication_read(id).await {
        Ok(true) => Json(serde_json::json!({"message": "ok"})).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Communication not found"})),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to mark communication read");
            internal_error()
        }
    }
}

/// GET /api/communications/unread-count
async fn unread_count(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.unread_inbound_count().await {
        Ok(count) => Json(serde_json::json!({"unread": count})).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to count unread communications");
            internal_error()
        }
    }
}

fn internal_error() -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "Internal error"})),
    )
        .into_response()
}
