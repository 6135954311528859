//! Free-form streaming chat completion for the RAG reader (`spec.md` §4.9).
//! Unlike [`crate::adjudicator::LlmAdjudicator`] this trait answers in
//! natural language, token by token, rather than a schema-validated verdict.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use echoman_common::Result;
use futures::{Stream, StreamExt};

use crate::client::ProviderClient;
use crate::wire::{ChatStreamRequest, WireMessage};

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait RagAnswerer: Send + Sync {
    /// Stream an answer to `question` given `context`, a caller-assembled,
    /// already token-budgeted block of topic/summary/source-item text.
    async fn stream_answer(&self, system_prompt: &str, question: &str, context: &str) -> Result<TokenStream>;
}

pub struct OpenAiRagAnswerer {
    client: ProviderClient,
    model: String,
    call_timeout: Duration,
    max_completion_tokens: u32,
}

impl OpenAiRagAnswerer {
    pub fn new(client: ProviderClient, model: impl Into<String>, max_completion_tokens: u32) -> Self {
        Self {
            client,
            model: model.into(),
            call_timeout: Duration::from_secs(60),
            max_completion_tokens,
        }
    }
}

#[async_trait]
impl RagAnswerer for OpenAiRagAnswerer {
    async fn stream_answer(&self, system_prompt: &str, question: &str, context: &str) -> Result<TokenStream> {
        let user = format!("Context:\n{context}\n\nQuestion: {question}");
        let request = ChatStreamRequest::new(
            self.model.clone(),
            vec![WireMessage::system(system_prompt), WireMessage::user(user)],
            self.max_completion_tokens,
        );

        let stream = self
            .client
            .chat_completion_stream(&request, self.call_timeout)
            .await
            .map_err(|e| echoman_common::EchomanError::Transient {
                provider: "openai".to_string(),
                message: e.to_string(),
            })?;

        Ok(Box::pin(stream.map(|item| {
            item.map_err(|e| echoman_common::EchomanError::Transient {
                provider: "openai".to_string(),
                message: e.to_string(),
            })
        })))
    }
}
