//! Trigger endpoints for stage one / stage two (`spec.md` §6
//! "Trigger stage one / stage two / ingestion for a given period key —
//! idempotent; effect equals running at the scheduled time").

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use echoman_common::PeriodKey;
use tracing::info;

use super::error_response;
use crate::state::AppState;

fn parse_period(period: &str) -> Result<PeriodKey, impl IntoResponse> {
    period.parse::<PeriodKey>().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": format!("bad period key: {e}") })),
        )
            .into_response()
    })
}

pub async fn trigger_event_merge(
    State(state): State<Arc<AppState>>,
    Path(period): Path<String>,
) -> impl IntoResponse {
    let key = match parse_period(&period) {
        Ok(k) => k,
        Err(resp) => return resp,
    };

    info!(%key, "stage one triggered via HTTP");
    match state.stage_one.run(key.date, key.period).await {
        Ok(stats) => Json(serde_json::json!({
            "period": key.to_string(),
            "input": stats.input,
            "kept": stats.kept,
            "dropped": stats.dropped,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn trigger_global_merge(
    State(state): State<Arc<AppState>>,
    Path(period): Path<String>,
) -> impl IntoResponse {
    let key = match parse_period(&period) {
        Ok(k) => k,
        Err(resp) => return resp,
    };

    info!(%key, "stage two triggered via HTTP");
    match state.stage_two.run(key.date, key.period).await {
        Ok(stats) => Json(serde_json::to_value(StageTwoStatsView::from(stats)).unwrap()).into_response(),
        Err(e) => error_response(e),
    }
}

/// Flattened, serializable view of `StageTwoStats` for the trigger response.
#[derive(serde::Serialize)]
struct StageTwoStatsView {
    input: i32,
    kept: i32,
    dropped: i32,
    merged_groups: i32,
    new_topics: i32,
}

impl From<echoman_pipeline::StageTwoStats> for StageTwoStatsView {
    fn from(s: echoman_pipeline::StageTwoStats) -> Self {
        Self {
            input: s.input,
            kept: s.kept,
            dropped: s.dropped,
            merged_groups: s.merged_groups,
            new_topics: s.new_topics,
        }
    }
}
