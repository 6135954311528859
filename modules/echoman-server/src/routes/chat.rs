//! `POST /v1/chat/topic/{id}` and `POST /v1/chat/global` — SSE transport
//! over `RagReader`'s typed event stream (`spec.md` §4.9, §9 "from
//! streaming-as-callbacks to typed event iteration"; the transport layer
//! just serializes `RagEvent` verbatim).

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use futures::stream::Stream;
use futures::StreamExt;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
}

fn to_sse(stream: impl Stream<Item = echoman_rag::RagEvent> + Send + 'static) -> impl Stream<Item = Result<Event, Infallible>> {
    stream.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().data(data))
    })
}

pub async fn chat_topic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    axum::Json(req): axum::Json<ChatRequest>,
) -> impl IntoResponse {
    let stream = state.rag_reader.clone().ask_topic(id, req.question);
    Sse::new(to_sse(stream)).keep_alive(axum::response::sse::KeepAlive::default())
}

pub async fn chat_global(
    State(state): State<Arc<AppState>>,
    axum::Json(req): axum::Json<ChatRequest>,
) -> impl IntoResponse {
    let stream = state.rag_reader.clone().ask_global(req.question);
    Sse::new(to_sse(stream)).keep_alive(axum::response::sse::KeepAlive::default())
}
