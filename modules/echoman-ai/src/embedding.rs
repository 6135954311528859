//! Embedding provider, grounded on the teacher's `ai-client::traits::EmbedAgent`.

use std::time::Duration;

use async_trait::async_trait;
use echoman_common::{EchomanError, Result};

use crate::client::ProviderClient;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model_version(&self) -> &str;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub struct OpenAiEmbeddingProvider {
    client: ProviderClient,
    model: String,
    call_timeout: Duration,
}

impl OpenAiEmbeddingProvider {
    pub fn new(client: ProviderClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            call_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn model_version(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.client
            .embed(&self.model, text, self.call_timeout)
            .await
            .map_err(|e| EchomanError::Transient {
                provider: "openai".to_string(),
                message: e.to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.client
            .embed_batch(&self.model, texts, self.call_timeout)
            .await
            .map_err(|e| EchomanError::Transient {
                provider: "openai".to_string(),
                message: e.to_string(),
            })
    }
}
