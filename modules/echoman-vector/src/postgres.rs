//! `pgvector`-backed implementation of [`VectorIndex`], grounded on the
//! teacher's direct-`sqlx` style in `rootsignal-graph::embedding_store`
//! (plain `query`/`query_as`, no query builder) and its own choice of
//! `pgvector` as a dependency in `taproot-core`/`taproot-domains`.

use async_trait::async_trait;
use echoman_common::{EchomanError, EmbeddingObjectType, Result};
use pgvector::Vector;
use sqlx::PgPool;

use crate::index::{VectorIndex, VectorMatch, VectorMetadata, VectorQuery};

#[derive(Clone)]
pub struct PgVectorIndex {
    pool: PgPool,
}

impl PgVectorIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        metadata: VectorMetadata,
        document: &str,
    ) -> Result<()> {
        let embedding = Vector::from(vector.to_vec());

        sqlx::query(
            r#"
            INSERT INTO vector_records (id, object_type, object_id, topic_id, generated_at, document, embedding)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                object_type = EXCLUDED.object_type,
                object_id = EXCLUDED.object_id,
                topic_id = EXCLUDED.topic_id,
                generated_at = EXCLUDED.generated_at,
                document = EXCLUDED.document,
                embedding = EXCLUDED.embedding
            "#,
        )
        .bind(id)
        .bind(metadata.object_type)
        .bind(metadata.object_id)
        .bind(metadata.topic_id)
        .bind(metadata.generated_at)
        .bind(document)
        .bind(embedding)
        .execute(&self.pool)
        .await
        .map_err(|e| EchomanError::VectorDrift(e.to_string()))?;

        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize, filter: VectorQuery) -> Result<Vec<VectorMatch>> {
        let embedding = Vector::from(vector.to_vec());

        #[derive(sqlx::FromRow)]
        struct Row {
            id: String,
            object_type: EmbeddingObjectType,
            object_id: i64,
            topic_id: Option<i64>,
            generated_at: Option<chrono::DateTime<chrono::Utc>>,
            document: String,
            similarity: f64,
        }

        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT id, object_type, object_id, topic_id, generated_at, document,
                   1 - (embedding <=> $1) AS similarity
            FROM vector_records
            WHERE ($2::text IS NULL OR object_type = $2)
              AND ($3::bigint IS NULL OR topic_id = $3)
            ORDER BY embedding <=> $1
            LIMIT $4
            "#,
        )
        .bind(&embedding)
        .bind(filter.object_type)
        .bind(filter.topic_id)
        .bind(top_k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EchomanError::VectorDrift(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| VectorMatch {
                id: r.id,
                similarity: r.similarity,
                metadata: VectorMetadata {
                    object_type: r.object_type,
                    object_id: r.object_id,
                    topic_id: r.topic_id,
                    generated_at: r.generated_at,
                },
                document: r.document,
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        sqlx::query("DELETE FROM vector_records WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| EchomanError::VectorDrift(e.to_string()))?;
        Ok(())
    }
}
