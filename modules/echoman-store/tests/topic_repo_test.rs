//! Integration tests for `TopicRepo`'s per-group transactional writes.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use chrono::{NaiveDate, Utc};
use echoman_common::{Period, SummaryMethod};
use echoman_store::TopicRepo;
use sqlx::PgPool;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    echoman_store::run_migrations(&pool).await.ok()?;

    sqlx::query("TRUNCATE topics, topic_nodes, topic_period_heat, summaries, source_items RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .ok()?;

    Some(pool)
}

#[tokio::test]
async fn new_topic_path_creates_topic_node_heat_and_placeholder_summary() {
    let Some(pool) = test_pool().await else { return };
    let repo = TopicRepo::new(pool.clone());
    let now = Utc::now();

    let mut tx = repo.begin().await.unwrap();
    let topic_id = TopicRepo::create_topic(
        &mut tx, "王传君获东京电影节影帝", now, now, 2, 1.0, None, None, None,
    )
    .await
    .unwrap();

    TopicRepo::upsert_period_heat(&mut tx, topic_id, now.date_naive(), Period::Pm, 1.0, 2)
        .await
        .unwrap();
    TopicRepo::insert_summary(&mut tx, topic_id, "placeholder summary", SummaryMethod::Placeholder)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let topic = repo.fetch_topic(topic_id).await.unwrap().unwrap();
    assert_eq!(topic.intensity_total, 2);
    assert!(topic.summary_id.is_some());

    let summary = repo.fetch_current_summary(topic_id).await.unwrap().unwrap();
    assert_eq!(summary.method, SummaryMethod::Placeholder);
}

#[tokio::test]
async fn advance_topic_raises_heat_only_on_new_peak() {
    let Some(pool) = test_pool().await else { return };
    let repo = TopicRepo::new(pool.clone());
    let now = Utc::now();

    let mut tx = repo.begin().await.unwrap();
    let topic_id = TopicRepo::create_topic(&mut tx, "t", now, now, 1, 0.6, None, None, None)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = repo.begin().await.unwrap();
    TopicRepo::advance_topic(&mut tx, topic_id, now, 1, 0.4).await.unwrap();
    tx.commit().await.unwrap();

    let topic = repo.fetch_topic(topic_id).await.unwrap().unwrap();
    assert_eq!(topic.current_heat_normalized, 0.6);
    assert_eq!(topic.intensity_total, 2);

    let mut tx = repo.begin().await.unwrap();
    TopicRepo::advance_topic(&mut tx, topic_id, now, 1, 0.9).await.unwrap();
    tx.commit().await.unwrap();

    let topic = repo.fetch_topic(topic_id).await.unwrap().unwrap();
    assert_eq!(topic.current_heat_normalized, 0.9);
}

#[tokio::test]
async fn rollback_on_failure_leaves_no_partial_topic() {
    let Some(pool) = test_pool().await else { return };
    let repo = TopicRepo::new(pool.clone());
    let now = Utc::now();

    let mut tx = repo.begin().await.unwrap();
    let _topic_id = TopicRepo::create_topic(&mut tx, "t", now, now, 1, 0.5, None, None, None)
        .await
        .unwrap();
    drop(tx); // rollback without commit

    let count: (i64,) = sqlx::query_as("SELECT count(*) FROM topics")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 0);
}

#[tokio::test]
async fn period_heat_upsert_replaces_existing_row() {
    let Some(pool) = test_pool().await else { return };
    let repo = TopicRepo::new(pool.clone());
    let now = Utc::now();
    let date: NaiveDate = now.date_naive();

    let mut tx = repo.begin().await.unwrap();
    let topic_id = TopicRepo::create_topic(&mut tx, "t", now, now, 1, 0.5, None, None, None)
        .await
        .unwrap();
    TopicRepo::upsert_period_heat(&mut tx, topic_id, date, Period::Am, 0.3, 1)
        .await
        .unwrap();
    TopicRepo::upsert_period_heat(&mut tx, topic_id, date, Period::Am, 0.7, 3)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let count: (i64,) = sqlx::query_as("SELECT count(*) FROM topic_period_heat WHERE topic_id = $1")
        .bind(topic_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1);

    let row: (f64, i32) =
        sqlx::query_as("SELECT heat_normalized, source_count FROM topic_period_heat WHERE topic_id = $1")
            .bind(topic_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(row.0, 0.7);
    assert_eq!(row.1, 3);
}
