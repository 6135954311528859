//! The vector index contract (`spec.md` §4.3). Kept as a trait so the
//! pipeline and RAG reader depend on an interface, not a concrete store —
//! the same isolation the teacher applies to `TextEmbedder`/`EmbeddingLookup`
//! in `rootsignal_common`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use echoman_common::{EmbeddingObjectType, Result};

#[derive(Debug, Clone)]
pub struct VectorMetadata {
    pub object_type: EmbeddingObjectType,
    pub object_id: i64,
    pub topic_id: Option<i64>,
    pub generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorQuery {
    pub object_type: Option<EmbeddingObjectType>,
    pub topic_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    /// Cosine similarity in `[-1, 1]`, already converted from distance
    /// (`s = 1 - d`) per `spec.md` §4.3.
    pub similarity: f64,
    pub metadata: VectorMetadata,
    pub document: String,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        metadata: VectorMetadata,
        document: &str,
    ) -> Result<()>;

    async fn query(&self, vector: &[f32], top_k: usize, filter: VectorQuery) -> Result<Vec<VectorMatch>>;

    async fn delete(&self, ids: &[String]) -> Result<()>;
}

pub fn source_item_vector_id(source_item_id: i64) -> String {
    format!("source_item_{source_item_id}")
}

pub fn topic_summary_vector_id(topic_id: i64) -> String {
    format!("topic_summary_{topic_id}")
}
