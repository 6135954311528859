//! Integration tests for `PgVectorIndex`.
//! Requires a Postgres instance with the `vector` extension. Set
//! DATABASE_TEST_URL or these tests are skipped.

use echoman_common::EmbeddingObjectType;
use echoman_vector::{PgVectorIndex, VectorIndex, VectorMetadata, VectorQuery};
use sqlx::PgPool;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;

    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(&pool)
        .await
        .ok()?;
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vector_records (
            id           TEXT PRIMARY KEY,
            object_type  TEXT NOT NULL,
            object_id    BIGINT NOT NULL,
            topic_id     BIGINT,
            generated_at TIMESTAMPTZ,
            document     TEXT NOT NULL,
            embedding    vector(4) NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    .ok()?;
    sqlx::query("TRUNCATE vector_records").execute(&pool).await.ok()?;

    Some(pool)
}

fn meta(object_id: i64, topic_id: Option<i64>) -> VectorMetadata {
    VectorMetadata {
        object_type: EmbeddingObjectType::SourceItem,
        object_id,
        topic_id,
        generated_at: None,
    }
}

#[tokio::test]
async fn upsert_then_query_returns_nearest_first() {
    let Some(pool) = test_pool().await else { return };
    let index = PgVectorIndex::new(pool);

    index
        .upsert("source_item_1", &[1.0, 0.0, 0.0, 0.0], meta(1, None), "doc a")
        .await
        .unwrap();
    index
        .upsert("source_item_2", &[0.0, 1.0, 0.0, 0.0], meta(2, None), "doc b")
        .await
        .unwrap();

    let matches = index
        .query(&[1.0, 0.0, 0.0, 0.0], 2, VectorQuery::default())
        .await
        .unwrap();

    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].id, "source_item_1");
    assert!(matches[0].similarity > matches[1].similarity);
}

#[tokio::test]
async fn upsert_is_idempotent_on_id() {
    let Some(pool) = test_pool().await else { return };
    let index = PgVectorIndex::new(pool.clone());

    index
        .upsert("source_item_5", &[1.0, 0.0, 0.0, 0.0], meta(5, None), "v1")
        .await
        .unwrap();
    index
        .upsert("source_item_5", &[0.0, 0.0, 1.0, 0.0], meta(5, None), "v2")
        .await
        .unwrap();

    let count: (i64,) = sqlx::query_as("SELECT count(*) FROM vector_records WHERE id = 'source_item_5'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1);
}

#[tokio::test]
async fn delete_removes_by_id() {
    let Some(pool) = test_pool().await else { return };
    let index = PgVectorIndex::new(pool.clone());

    index
        .upsert("source_item_9", &[1.0, 0.0, 0.0, 0.0], meta(9, None), "doc")
        .await
        .unwrap();
    index.delete(&["source_item_9".to_string()]).await.unwrap();

    let count: (i64,) = sqlx::query_as("SELECT count(*) FROM vector_records")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 0);
}

#[tokio::test]
async fn query_filters_by_topic_id() {
    let Some(pool) = test_pool().await else { return };
    let index = PgVectorIndex::new(pool);

    index
        .upsert("source_item_10", &[1.0, 0.0, 0.0, 0.0], meta(10, Some(100)), "a")
        .await
        .unwrap();
    index
        .upsert("source_item_11", &[1.0, 0.0, 0.0, 0.0], meta(11, Some(200)), "b")
        .await
        .unwrap();

    let matches = index
        .query(
            &[1.0, 0.0, 0.0, 0.0],
            10,
            VectorQuery {
                object_type: None,
                topic_id: Some(100),
            },
        )
        .await
        .unwrap();

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "source_item_10");
}
