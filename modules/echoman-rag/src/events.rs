//! The typed event sequence a RAG answer yields (`spec.md` §4.9, §9 "from
//! streaming-as-callbacks to typed event iteration"): zero or more `token`,
//! at most one `citations`, exactly one terminal `done`/`error`. The
//! transport (SSE in `echoman-server`) serializes this verbatim.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub source: &'static str,
    pub title: String,
    pub url: Option<String>,
    pub platform: Option<String>,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct RagDiagnostics {
    pub latency_ms: u64,
    pub tokens_prompt: u32,
    pub tokens_completion: u32,
    pub context_chunks: u32,
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RagEvent {
    Token { text: String },
    Citations { items: Vec<Citation> },
    Done { diagnostics: RagDiagnostics },
    Error { message: String },
}
