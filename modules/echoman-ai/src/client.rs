//! Low-level HTTP client for an OpenAI-compatible provider, adapted from
//! the teacher's `ai-client::openai::client::OpenAiClient`.

use std::time::Duration;

use anyhow::{anyhow, Result};
use backoff::ExponentialBackoffBuilder;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use tracing::{debug, warn};

use crate::wire::*;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Retry budget for a single provider call: a handful of attempts inside
/// the caller's own timeout, not a competing deadline.
fn retry_policy() -> backoff::ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(200))
        .with_max_interval(Duration::from_secs(2))
        .with_max_elapsed_time(Some(Duration::from_secs(10)))
        .build()
}

#[derive(Clone)]
pub struct ProviderClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
}

impl ProviderClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// POST `body` to `url`, retrying transient failures (connection drops,
    /// timeouts, 429/5xx) with exponential backoff. 4xx other than 429 is
    /// treated as permanent — retrying a malformed request just wastes the
    /// caller's timeout budget.
    async fn post_with_retry<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        backoff::future::retry(retry_policy(), || async {
            let headers = self.headers().map_err(backoff::Error::permanent)?;
            let attempt = self.http.post(url).headers(headers).json(body).timeout(timeout).send().await;

            match attempt {
                Ok(response) => {
                    let status = response.status();
                    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        warn!(%status, %url, "provider call failed transiently, retrying");
                        Err(backoff::Error::transient(anyhow!("transient provider status: {status}")))
                    } else {
                        Ok(response)
                    }
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    warn!(error = %e, %url, "provider call failed transiently, retrying");
                    Err(backoff::Error::transient(anyhow!(e)))
                }
                Err(e) => Err(backoff::Error::permanent(anyhow!(e))),
            }
        })
        .await
    }

    /// Structured chat completion bounded by `timeout` (caller passes the
    /// per-call-shape ceiling from `spec.md` §4.4/§5: ~30s for adjudication,
    /// ~60s for RAG).
    pub async fn structured_output(
        &self,
        request: &StructuredRequest,
        timeout: Duration,
    ) -> Result<(String, Option<Usage>)> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %request.model, "provider structured-output request");

        let response = self.post_with_retry(&url, request, timeout).await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("provider error ({status}): {error_text}"));
        }

        let chat_response: ChatResponse = response.json().await?;
        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| anyhow!("provider returned no content"))?;

        Ok((content, chat_response.usage))
    }

    /// Embed a single text, bounded by `timeout` (~10s per `spec.md` §5).
    pub async fn embed(&self, model: &str, text: &str, timeout: Duration) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(model, &[text.to_string()], timeout).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("provider returned no embedding"))
    }

    pub async fn embed_batch(
        &self,
        model: &str,
        texts: &[String],
        timeout: Duration,
    ) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: model.to_string(),
            input: serde_json::Value::Array(
                texts.iter().map(|t| serde_json::Value::String(t.clone())).collect(),
            ),
        };

        let response = self.post_with_retry(&url, &request, timeout).await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("provider embedding error ({status}): {error_text}"));
        }

        let embed_response: EmbeddingResponse = response.json().await?;
        Ok(embed_response.data.into_iter().map(|d| d.embedding).collect())
    }

    /// Streaming chat completion: yields content deltas as they arrive over
    /// an SSE (`text/event-stream`) body, the shape the RAG reader needs to
    /// forward `token` events without buffering the whole answer. Retries
    /// only apply to establishing the connection; once streaming starts a
    /// mid-stream error surfaces as an `Err` item.
    pub async fn chat_completion_stream(
        &self,
        request: &ChatStreamRequest,
        timeout: Duration,
    ) -> Result<impl Stream<Item = Result<String>>> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %request.model, "provider streaming chat request");

        let response = self.post_with_retry(&url, request, timeout).await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("provider stream error ({status}): {error_text}"));
        }

        let mut byte_stream = Box::pin(response.bytes_stream());

        Ok(async_stream::try_stream! {
            let mut buf = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk.map_err(|e| anyhow!(e))?;
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find("\n\n") {
                    let event: String = buf.drain(..pos + 2).collect();
                    for line in event.lines() {
                        let Some(data) = line.strip_prefix("data: ") else { continue };
                        if data == "[DONE]" {
                            return;
                        }
                        let parsed: StreamChunk = serde_json::from_str(data)
                            .map_err(|e| anyhow!("malformed stream chunk: {e}"))?;
                        if let Some(content) = parsed.choices.into_iter().next().and_then(|c| c.delta.content) {
                            if !content.is_empty() {
                                yield content;
                            }
                        }
                    }
                }
            }
        })
    }
}
