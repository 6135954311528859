//! `POST /v1/ingest` (`spec.md` §6 "Collected item ingestion contract").

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use chrono::{DateTime, Utc};
use echoman_common::{InteractionMetrics, Platform};
use echoman_pipeline::label_for_ingestion;
use serde::Deserialize;
use uuid::Uuid;

use super::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub platform: Platform,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub heat_value: Option<f64>,
    #[serde(default)]
    pub interactions: BTreeMap<String, i64>,
    pub run_id: Uuid,
}

#[derive(Debug, serde::Serialize)]
pub struct IngestResponse {
    pub accepted: bool,
    pub item_id: Option<i64>,
}

/// `platform`+`url` identifies an atom within a run; re-posting the same
/// pair under the same `run_id` is a no-op, matching the dedup contract.
fn dedup_key(platform: Platform, url: &str) -> String {
    format!("{platform}:{url}")
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestRequest>,
) -> impl IntoResponse {
    let title = req.title.trim();
    if title.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "title must be non-empty after trimming" })),
        )
            .into_response();
    }

    let mut interactions = InteractionMetrics::new();
    for (k, v) in req.interactions {
        interactions.insert(k, v);
    }

    let fetched_at = req.fetched_at.unwrap_or_else(Utc::now);
    let item = label_for_ingestion(
        dedup_key(req.platform, &req.url),
        req.run_id,
        req.platform,
        title.to_string(),
        req.summary,
        req.url,
        req.published_at,
        fetched_at,
        interactions,
        req.heat_value,
    );

    match state.items.insert(item).await {
        Ok(item_id) => (
            StatusCode::OK,
            Json(IngestResponse { accepted: item_id.is_some(), item_id }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}
