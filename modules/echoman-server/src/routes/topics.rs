//! `GET /v1/topics/{id}` and `GET /v1/topics/{id}/nodes` (`spec.md` §6
//! "Read endpoints serve Topic, TopicPeriodHeat, TopicNode + SourceItem
//! joins").

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use super::error_response;
use crate::state::AppState;

pub async fn get_topic(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.topics.fetch_topic(id).await {
        Ok(Some(topic)) => Json(topic).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_topic_nodes(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.topics.fetch_topic(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => return error_response(e),
    }

    let nodes = match state.topics.fetch_nodes_for_topic(id).await {
        Ok(nodes) => nodes,
        Err(e) => return error_response(e),
    };

    let item_ids: Vec<i64> = nodes.iter().map(|n| n.source_item_id).collect();
    let items = match state.items.fetch_by_ids(&item_ids).await {
        Ok(items) => items,
        Err(e) => return error_response(e),
    };

    let joined: Vec<serde_json::Value> = nodes
        .iter()
        .map(|node| {
            let item = items.iter().find(|i| i.id == node.source_item_id);
            serde_json::json!({ "node": node, "source_item": item })
        })
        .collect();

    Json(joined).into_response()
}
