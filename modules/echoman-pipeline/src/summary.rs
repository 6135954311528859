//! Summary engine (`spec.md` §4.8): placeholder/full/incremental generation
//! plus the `topic_summary` vector that closes the stage-two recall loop.
//!
//! Per `spec.md` §5, the placeholder Summary row must commit atomically
//! with the Topic/TopicNode/TopicPeriodHeat writes of the group that
//! created it — `insert_placeholder` takes the caller's open transaction
//! for exactly that reason. Only the vector upsert sits outside the
//! transaction: it is not transactional with the relational store, and is
//! allowed to drift (logged, not rolled back) on failure, matching the
//! teacher's handling of `rootsignal-graph::embedding_store` cache writes
//! as best-effort.

use std::sync::Arc;

use chrono::Utc;
use echoman_ai::{EmbeddingProvider, SummaryGenerator};
use echoman_common::{EmbeddingObjectType, Result, SummaryMethod};
use echoman_store::TopicRepo;
use echoman_vector::{index::topic_summary_vector_id, VectorIndex, VectorMetadata};
use sqlx::{Postgres, Transaction};
use tracing::warn;

pub struct SummaryEngine {
    topics: TopicRepo,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn SummaryGenerator>,
}

impl SummaryEngine {
    pub fn new(
        topics: TopicRepo,
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn SummaryGenerator>,
    ) -> Self {
        Self { topics, vector_index, embedder, generator }
    }

    /// Rule-generated placeholder content.
    pub fn placeholder_content(topic_title: &str, item_count: usize) -> String {
        format!("{topic_title} — an emerging topic tracked across {item_count} report(s).")
    }

    /// Insert the placeholder Summary row into the caller's already-open
    /// transaction, alongside the Topic/TopicNode/TopicPeriodHeat writes of
    /// the same group (`spec.md` §5). Returns the content so the caller can
    /// queue the vector upsert once that transaction has committed.
    pub async fn insert_placeholder(
        tx: &mut Transaction<'_, Postgres>,
        topic_id: i64,
        topic_title: &str,
        item_count: usize,
    ) -> Result<String> {
        let content = Self::placeholder_content(topic_title, item_count);
        TopicRepo::insert_summary(tx, topic_id, &content, SummaryMethod::Placeholder).await?;
        Ok(content)
    }

    /// Best-effort: embed `content` and upsert the `topic_summary_<id>`
    /// vector. Logs and returns `Ok(())` on failure rather than propagating,
    /// since a missing vector is recoverable drift, not a batch-fatal error.
    pub async fn upsert_vector(&self, topic_id: i64, content: &str) -> Result<()> {
        let embedding = match self.embedder.embed(content).await {
            Ok(e) => e,
            Err(e) => {
                warn!(topic_id, error = %e, "summary embedding failed, topic_summary vector left stale");
                return Ok(());
            }
        };

        if let Err(e) = self
            .vector_index
            .upsert(
                &topic_summary_vector_id(topic_id),
                &embedding,
                VectorMetadata {
                    object_type: EmbeddingObjectType::TopicSummary,
                    object_id: topic_id,
                    topic_id: Some(topic_id),
                    generated_at: Some(Utc::now()),
                },
                content,
            )
            .await
        {
            warn!(topic_id, error = %e, "topic_summary vector upsert failed, drift left for reconciliation");
        }

        Ok(())
    }

    /// Post-batch full summary pass for a newly-created topic.
    pub async fn generate_full(&self, topic_id: i64, topic_title: &str, item_titles: &[String]) -> Result<()> {
        let content = self.generator.generate_full_summary(topic_title, item_titles).await?;

        let mut tx = self.topics.begin().await?;
        TopicRepo::insert_summary(&mut tx, topic_id, &content, SummaryMethod::Full).await?;
        tx.commit().await?;

        self.upsert_vector(topic_id, &content).await
    }

    /// Incremental refresh queued after a merge into an existing topic.
    pub async fn generate_incremental(
        &self,
        topic_id: i64,
        previous_summary: &str,
        new_item_titles: &[String],
    ) -> Result<()> {
        let content = self
            .generator
            .generate_incremental_summary(previous_summary, new_item_titles)
            .await?;

        let mut tx = self.topics.begin().await?;
        TopicRepo::insert_summary(&mut tx, topic_id, &content, SummaryMethod::Incremental).await?;
        tx.commit().await?;

        self.upsert_vector(topic_id, &content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_content_mentions_title_and_count() {
        let content = SummaryEngine::placeholder_content("王传君获东京电影节影帝", 2);
        assert!(content.contains("王传君获东京电影节影帝"));
        assert!(content.contains('2'));
    }
}
