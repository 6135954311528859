//! Reader orchestration (`spec.md` §4.9): retrieve → pack context → call the
//! LLM → yield the typed event sequence. The reader has no HTTP dependency;
//! `echoman-server`'s SSE handler consumes the `Stream<Item = RagEvent>` this
//! module produces, mirroring the teacher's separation of domain logic
//! (`rootsignal-graph`) from transport (`rootsignal-api`/`-web`).

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use echoman_ai::{budgets, RagAnswerer, TokenCounter};
use echoman_common::{JudgementKind, JudgementStatus};
use echoman_store::JudgementRepo;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::context::{available_context_tokens, pack_context};
use crate::events::{RagDiagnostics, RagEvent};
use crate::retrieval::{RetrievalResult, Retriever};

const SYSTEM_PROMPT: &str = "Answer strictly from the provided evidence. If the \
    evidence is insufficient, say so explicitly rather than guessing.";

const FALLBACK_ANSWER: &str =
    "There isn't enough retrieved information to answer this question.";

pub struct RagReader {
    retriever: Retriever,
    answerer: Arc<dyn RagAnswerer>,
    judgements: JudgementRepo,
    counter: Arc<dyn TokenCounter>,
    provider: String,
    model: String,
}

impl RagReader {
    pub fn new(
        retriever: Retriever,
        answerer: Arc<dyn RagAnswerer>,
        judgements: JudgementRepo,
        counter: Arc<dyn TokenCounter>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self { retriever, answerer, judgements, counter, provider: provider.into(), model: model.into() }
    }

    pub fn ask_topic(self: Arc<Self>, topic_id: i64, query: String) -> Pin<Box<dyn Stream<Item = RagEvent> + Send>> {
        Box::pin(async_stream::stream! {
            let retrieval = self.retriever.retrieve_topic_mode(topic_id, &query).await;
            for await event in self.clone().answer(query, retrieval) {
                yield event;
            }
        })
    }

    pub fn ask_global(self: Arc<Self>, query: String) -> Pin<Box<dyn Stream<Item = RagEvent> + Send>> {
        Box::pin(async_stream::stream! {
            let retrieval = self.retriever.retrieve_global_mode(&query).await;
            for await event in self.clone().answer(query, retrieval) {
                yield event;
            }
        })
    }

    /// Shared tail of both modes: token-budget, call the LLM, forward its
    /// stream, then `citations`/`done` or a terminating `error`.
    fn answer(
        self: Arc<Self>,
        query: String,
        retrieval: echoman_common::Result<RetrievalResult>,
    ) -> Pin<Box<dyn Stream<Item = RagEvent> + Send>> {
        Box::pin(async_stream::stream! {
            let started = Instant::now();

            let retrieval = match retrieval {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "rag retrieval failed");
                    yield RagEvent::Error { message: e.to_string() };
                    return;
                }
            };

            if retrieval.empty {
                debug!("rag retrieval empty, answering with canned fallback");
                yield RagEvent::Token { text: FALLBACK_ANSWER.to_string() };
                yield RagEvent::Citations { items: Vec::new() };
                yield RagEvent::Done {
                    diagnostics: RagDiagnostics {
                        latency_ms: started.elapsed().as_millis() as u64,
                        tokens_prompt: 0,
                        tokens_completion: self.counter.count(FALLBACK_ANSWER),
                        context_chunks: 0,
                        fallback: true,
                    },
                };
                let _ = self.record_judgement(&query, JudgementStatus::Ok, None).await;
                return;
            }

            let available =
                available_context_tokens(self.counter.as_ref(), SYSTEM_PROMPT, &query, budgets::RAG_COMPLETION_TOKENS);
            let packed = pack_context(retrieval.chunks, self.counter.as_ref(), available);
            if packed.dropped_chunks > 0 {
                debug!(dropped = packed.dropped_chunks, "rag context truncated to fit token budget");
            }

            let tokens_prompt = self.counter.count(SYSTEM_PROMPT)
                + self.counter.count(&query)
                + self.counter.count(&packed.text);

            let stream = match self.answerer.stream_answer(SYSTEM_PROMPT, &query, &packed.text).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "rag answerer call failed");
                    yield RagEvent::Error { message: e.to_string() };
                    let _ = self.record_judgement(&query, JudgementStatus::ProviderError, None).await;
                    return;
                }
            };

            let mut answer = String::new();
            let mut stream = stream;
            let mut failed = false;
            while let Some(item) = stream.next().await {
                match item {
                    Ok(text) => {
                        answer.push_str(&text);
                        yield RagEvent::Token { text };
                    }
                    Err(e) => {
                        warn!(error = %e, "rag stream interrupted mid-answer");
                        yield RagEvent::Error { message: e.to_string() };
                        failed = true;
                        break;
                    }
                }
            }

            if failed {
                let _ = self.record_judgement(&query, JudgementStatus::ProviderError, Some(&answer)).await;
                return;
            }

            yield RagEvent::Citations { items: packed.citations };
            yield RagEvent::Done {
                diagnostics: RagDiagnostics {
                    latency_ms: started.elapsed().as_millis() as u64,
                    tokens_prompt,
                    tokens_completion: self.counter.count(&answer),
                    context_chunks: packed.chunk_count,
                    fallback: false,
                },
            };

            let _ = self.record_judgement(&query, JudgementStatus::Ok, Some(&answer)).await;
        })
    }

    async fn record_judgement(
        &self,
        query: &str,
        status: JudgementStatus,
        answer: Option<&str>,
    ) -> echoman_common::Result<()> {
        self.judgements
            .insert(echoman_store::judgement_repo::NewJudgement {
                kind: JudgementKind::RagAnswer,
                run_id: None,
                request_summary: query.chars().take(200).collect(),
                response_json: answer.map(|a| serde_json::json!({ "answer": a })),
                tokens_prompt: None,
                tokens_completion: None,
                provider: self.provider.clone(),
                model: self.model.clone(),
                status,
            })
            .await?;
        Ok(())
    }
}
