//! Topic-mode and global-mode retrieval (`spec.md` §4.9).

use std::collections::HashMap;
use std::sync::Arc;

use echoman_ai::EmbeddingProvider;
use echoman_common::{EchomanError, EmbeddingObjectType, Result};
use echoman_store::{SourceItemRepo, TopicRepo};
use echoman_vector::{VectorIndex, VectorQuery};

use crate::context::ContextChunk;
use crate::events::Citation;

/// `spec.md` §4.9 topic mode: "Take up to 5 with similarity ≥ 0".
pub const TOPIC_MODE_TOP_K: usize = 5;
/// `spec.md` §4.9 global mode: "top 10 by similarity".
pub const GLOBAL_MODE_TOP_K: usize = 10;
/// `spec.md` §4.9 global mode: "1-2 most recent nodes" per recalled topic.
pub const GLOBAL_MODE_NODES_PER_TOPIC: usize = 2;

pub struct RetrievalResult {
    pub chunks: Vec<ContextChunk>,
    pub empty: bool,
}

#[derive(Clone)]
pub struct Retriever {
    topics: TopicRepo,
    items: SourceItemRepo,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(
        topics: TopicRepo,
        items: SourceItemRepo,
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self { topics, items, vector_index, embedder }
    }

    /// Topic Summary + up to 5 `source_item` vectors restricted to this
    /// topic's membership, ranked by similarity to `query`.
    pub async fn retrieve_topic_mode(&self, topic_id: i64, query: &str) -> Result<RetrievalResult> {
        let topic = self
            .topics
            .fetch_topic(topic_id)
            .await?
            .ok_or_else(|| EchomanError::Validation(format!("unknown topic {topic_id}")))?;

        let mut chunks = Vec::new();
        let mut has_evidence = false;

        if let Some(summary) = self.topics.fetch_current_summary(topic_id).await? {
            has_evidence = true;
            chunks.push(ContextChunk {
                text: format!("Topic summary for \"{}\": {}", topic.title_key, summary.content),
                citation: Some(Citation {
                    source: "topic_summary",
                    title: topic.title_key.clone(),
                    url: None,
                    platform: None,
                    snippet: summary.content.clone(),
                }),
            });
        }

        let embedding = self.embedder.embed(query).await.map_err(|e| EchomanError::Transient {
            provider: "embedding".to_string(),
            message: e.to_string(),
        })?;

        let matches = self
            .vector_index
            .query(
                &embedding,
                TOPIC_MODE_TOP_K,
                VectorQuery { object_type: Some(EmbeddingObjectType::SourceItem), topic_id: Some(topic_id) },
            )
            .await?;

        let ids: Vec<i64> = matches.iter().map(|m| m.metadata.object_id).collect();
        let by_id: HashMap<i64, _> = self.items.fetch_by_ids(&ids).await?.into_iter().map(|i| (i.id, i)).collect();

        for m in matches {
            let Some(item) = by_id.get(&m.metadata.object_id) else { continue };
            has_evidence = true;
            chunks.push(ContextChunk {
                text: format!("[{}] {} ({})", item.platform, item.title, item.fetched_at),
                citation: Some(Citation {
                    source: "source_item",
                    title: item.title.clone(),
                    url: Some(item.url.clone()),
                    platform: Some(item.platform.to_string()),
                    snippet: item.summary.clone(),
                }),
            });
        }

        Ok(RetrievalResult { chunks, empty: !has_evidence })
    }

    /// Top 10 `topic_summary` vectors by similarity to `query`, each paired
    /// with its topic's 1-2 most recently appended nodes.
    pub async fn retrieve_global_mode(&self, query: &str) -> Result<RetrievalResult> {
        let embedding = self.embedder.embed(query).await.map_err(|e| EchomanError::Transient {
            provider: "embedding".to_string(),
            message: e.to_string(),
        })?;

        let matches = self
            .vector_index
            .query(
                &embedding,
                GLOBAL_MODE_TOP_K,
                VectorQuery { object_type: Some(EmbeddingObjectType::TopicSummary), topic_id: None },
            )
            .await?;

        let mut chunks = Vec::new();

        for m in matches {
            let topic_id = m.metadata.object_id;
            let Some(topic) = self.topics.fetch_topic(topic_id).await? else { continue };

            chunks.push(ContextChunk {
                text: format!("Topic: {} — {}", topic.title_key, m.document),
                citation: Some(Citation {
                    source: "topic_summary",
                    title: topic.title_key.clone(),
                    url: None,
                    platform: None,
                    snippet: m.document.clone(),
                }),
            });

            let nodes = self.topics.fetch_nodes_for_topic(topic_id).await?;
            let recent_ids: Vec<i64> =
                nodes.into_iter().take(GLOBAL_MODE_NODES_PER_TOPIC).map(|n| n.source_item_id).collect();
            for item in self.items.fetch_by_ids(&recent_ids).await? {
                chunks.push(ContextChunk {
                    text: format!("[{}] {} ({})", item.platform, item.title, item.fetched_at),
                    citation: Some(Citation {
                        source: "source_item",
                        title: item.title.clone(),
                        url: Some(item.url.clone()),
                        platform: Some(item.platform.to_string()),
                        snippet: item.summary.clone(),
                    }),
                });
            }
        }

        let empty = chunks.is_empty();
        Ok(RetrievalResult { chunks, empty })
    }
}
