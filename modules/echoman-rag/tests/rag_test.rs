//! End-to-end topic-mode / global-mode retrieval + streaming tests against a
//! real Postgres + pgvector instance, with mock embedder and answerer
//! standing in for the external providers. Set DATABASE_TEST_URL or these
//! tests are skipped.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use echoman_ai::{EmbeddingProvider, RagAnswerer, TokenStream};
use echoman_common::{EmbeddingObjectType, Platform, Result};
use echoman_rag::{RagEvent, RagReader, Retriever};
use echoman_store::models::NewSourceItem;
use echoman_store::{JudgementRepo, SourceItemRepo, TopicRepo};
use echoman_vector::{PgVectorIndex, VectorIndex, VectorMetadata};
use futures::StreamExt;
use sqlx::PgPool;
use uuid::Uuid;

const EMBED_DIM: usize = 1536;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    echoman_store::run_migrations(&pool).await.ok()?;

    sqlx::query(
        "TRUNCATE source_items, topics, topic_nodes, topic_period_heat, summaries, \
         run_records, llm_judgements, vector_records RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await
    .ok()?;

    Some(pool)
}

fn char_bag_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBED_DIM];
    for c in text.chars() {
        let idx = (c as usize) % EMBED_DIM;
        v[idx] += 1.0;
    }
    v
}

struct MockEmbedder;

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    fn model_version(&self) -> &str {
        "mock-embed-v1"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(char_bag_embedding(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| char_bag_embedding(t)).collect())
    }
}

struct MockAnswerer;

#[async_trait]
impl RagAnswerer for MockAnswerer {
    async fn stream_answer(&self, _system_prompt: &str, _question: &str, context: &str) -> Result<TokenStream> {
        let has_context = !context.trim().is_empty();
        Ok(Box::pin(async_stream::stream! {
            if has_context {
                yield Ok("This ".to_string());
                yield Ok("is ".to_string());
                yield Ok("the mock answer.".to_string());
            } else {
                yield Ok("empty context answer".to_string());
            }
        }))
    }
}

fn sample_item(run_id: Uuid, dedup_key: &str, title: &str) -> NewSourceItem {
    let now = Utc::now();
    NewSourceItem {
        dedup_key: dedup_key.to_string(),
        run_id,
        platform: Platform::Weibo,
        title: title.to_string(),
        summary: format!("{title} 详情"),
        url: format!("https://weibo.com/{dedup_key}"),
        published_at: Some(now),
        fetched_at: now,
        interactions: echoman_common::InteractionMetrics::new(),
        heat_value: Some(3000.0),
        period_date: now.date_naive(),
        period: echoman_common::Period::Pm,
    }
}

#[tokio::test]
async fn topic_mode_streams_an_answer_with_citations() {
    let Some(pool) = test_pool().await else { return };

    let topics = TopicRepo::new(pool.clone());
    let items_repo = SourceItemRepo::new(pool.clone());
    let judgements = JudgementRepo::new(pool.clone());
    let vector_index: Arc<dyn VectorIndex> = Arc::new(PgVectorIndex::new(pool.clone()));
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbedder);

    let now = Utc::now();
    let title = "王传君获东京电影节影帝";
    let mut tx = topics.begin().await.unwrap();
    let topic_id = TopicRepo::create_topic(&mut tx, title, now, now, 1, 0.8, None, None, None).await.unwrap();
    TopicRepo::insert_summary(&mut tx, topic_id, "王传君在东京电影节获得最佳男演员奖。", echoman_common::SummaryMethod::Full)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let run_id = Uuid::new_v4();
    let item_id = items_repo.insert(sample_item(run_id, "a", title)).await.unwrap().unwrap();

    vector_index
        .upsert(
            &echoman_vector::index::source_item_vector_id(item_id),
            &char_bag_embedding(title),
            VectorMetadata {
                object_type: EmbeddingObjectType::SourceItem,
                object_id: item_id,
                topic_id: Some(topic_id),
                generated_at: Some(now),
            },
            title,
        )
        .await
        .unwrap();

    let retriever = Retriever::new(topics.clone(), items_repo.clone(), vector_index.clone(), embedder.clone());
    let reader = Arc::new(RagReader::new(
        retriever,
        Arc::new(MockAnswerer),
        judgements,
        Arc::new(echoman_ai::HeuristicTokenCounter),
        "mock",
        "mock-model",
    ));

    let mut events: Vec<RagEvent> = reader.ask_topic(topic_id, "王传君凭什么获奖".to_string()).collect().await;

    let last = events.pop().unwrap();
    assert!(matches!(last, RagEvent::Done { .. }));
    let citations = events.pop().unwrap();
    assert!(matches!(citations, RagEvent::Citations { ref items } if !items.is_empty()));
    assert!(events.iter().all(|e| matches!(e, RagEvent::Token { .. })));
}

#[tokio::test]
async fn global_mode_falls_back_when_nothing_is_recalled() {
    let Some(pool) = test_pool().await else { return };

    let topics = TopicRepo::new(pool.clone());
    let items_repo = SourceItemRepo::new(pool.clone());
    let judgements = JudgementRepo::new(pool.clone());
    let vector_index: Arc<dyn VectorIndex> = Arc::new(PgVectorIndex::new(pool.clone()));
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbedder);

    let retriever = Retriever::new(topics, items_repo, vector_index, embedder);
    let reader = Arc::new(RagReader::new(
        retriever,
        Arc::new(MockAnswerer),
        judgements,
        Arc::new(echoman_ai::HeuristicTokenCounter),
        "mock",
        "mock-model",
    ));

    let events: Vec<RagEvent> = reader.ask_global("任何问题".to_string()).collect().await;
    let done = events.last().unwrap();
    match done {
        RagEvent::Done { diagnostics } => assert!(diagnostics.fallback),
        other => panic!("expected Done, got {other:?}"),
    }
}
