//! Shared HTTP error type and the health endpoint.

use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use voxrelay_sfu::RelayError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Malformed or mistyped JSON bodies are client errors, whatever axum's
/// default status for the rejection.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        ApiError::InternalServerError(e.to_string())
    }
}

/// `GET /health` — liveness plus a few gauges.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "voice-agent",
        "rooms": state.registry.room_count(),
        "signaling_clients": state.hub.client_count().await,
        "dropped_envelopes": state.hub.dropped_envelopes(),
    }))
}
