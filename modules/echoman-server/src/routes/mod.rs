pub mod chat;
pub mod ingest;
pub mod runs;
pub mod topics;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use echoman_common::EchomanError;
use tracing::error;

use crate::state::AppState;

/// Maps the error taxonomy onto HTTP status, matching the teacher's ad hoc
/// per-handler `StatusCode` choices but centralized since this taxonomy
/// already distinguishes retryable/caller/operator failures.
pub fn error_response(err: EchomanError) -> axum::response::Response {
    let status = match &err {
        EchomanError::Validation(_) => StatusCode::BAD_REQUEST,
        EchomanError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
        EchomanError::MalformedLlmResponse(_) | EchomanError::GroupHandlerFailed(_) => {
            StatusCode::BAD_GATEWAY
        }
        EchomanError::Database(_) | EchomanError::BatchFatal(_) | EchomanError::VectorDrift(_)
        | EchomanError::Config(_) | EchomanError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!(%err, "request failed");
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/ingest", post(ingest::ingest))
        .route("/v1/runs/event-merge/{period}", post(runs::trigger_event_merge))
        .route("/v1/runs/global-merge/{period}", post(runs::trigger_global_merge))
        .route("/v1/topics/{id}", get(topics::get_topic))
        .route("/v1/topics/{id}/nodes", get(topics::get_topic_nodes))
        .route("/v1/chat/topic/{id}", post(chat::chat_topic))
        .route("/v1/chat/global", post(chat::chat_global))
}
