//! End-to-end stage-one → stage-two integration tests, with a mock LLM,
//! embedder, and classifier standing in for the external providers.
//! Requires a Postgres instance with the `vector` extension. Set
//! DATABASE_TEST_URL or these tests are skipped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use echoman_ai::{
    EmbeddingProvider, EventGroupConfirmation, LlmAdjudicator, SummaryGenerator,
    TopicAssociationCandidate, TopicAssociationOutcome,
};
use echoman_common::{Config, InteractionMetrics, Period, Platform, Result};
use echoman_pipeline::classifier::{TopicClassification, TopicClassifier};
use echoman_pipeline::{StageOneMerger, StageTwoMerger};
use echoman_store::models::NewSourceItem;
use echoman_store::{JudgementRepo, RunRepo, SourceItemRepo, TopicRepo};
use echoman_vector::{PgVectorIndex, VectorIndex, VectorMetadata};
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

/// Bag-of-characters embedding: texts sharing characters end up with high
/// cosine similarity, the same signal `clustering::cluster` expects from a
/// real embedding model for near-duplicate Chinese headlines.
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

struct MockAdjudicator;

#[async_trait]
impl LlmAdjudicator for MockAdjudicator {
    async fn confirm_event_group(
        &self,
        _group_summary: &str,
        _candidate_title: &str,
        _candidate_summary: &str,
    ) -> Result<EventGroupConfirmation> {
        Ok(EventGroupConfirmation {
            is_same_event: true,
            confidence: 0.95,
            reason: "mock: always confirms".to_string(),
        })
    }

    async fn decide_topic_association(
        &self,
        _group_title: &str,
        _group_summary: &str,
        candidates: &[TopicAssociationCandidate],
    ) -> Result<TopicAssociationOutcome> {
        if let Some(top) = candidates.first() {
            Ok(TopicAssociationOutcome::MergeInto {
                topic_id: top.topic_id,
                confidence: 0.9,
                reason: "mock: merges into top candidate".to_string(),
            })
        } else {
            Ok(TopicAssociationOutcome::NewTopic {
                confidence: 1.0,
                reason: "mock: no candidates".to_string(),
            })
        }
    }
}

struct MockSummaryGenerator;

#[async_trait]
impl SummaryGenerator for MockSummaryGenerator {
    async fn generate_full_summary(&self, topic_title: &str, _item_titles: &[String]) -> Result<String> {
        Ok(format!("full summary for {topic_title}"))
    }

    async fn generate_incremental_summary(
        &self,
        previous_summary: &str,
        _new_item_titles: &[String],
    ) -> Result<String> {
        Ok(format!("{previous_summary} (updated)"))
    }
}

struct MockClassifier;

#[async_trait]
impl TopicClassifier for MockClassifier {
    async fn classify(&self, _text: &str) -> Result<TopicClassification> {
        Ok(TopicClassification {
            category: "society".to_string(),
            confidence: 0.5,
            method: "mock".to_string(),
        })
    }
}

/// Config with the same defaults `Config::from_env` falls back to, so the
/// mergers under test behave the way they do in production.
fn test_config() -> Config {
    Config {
        database_url: String::new(),
        vector_db_url: String::new(),
        llm_api_key: String::new(),
        llm_model: String::new(),
        llm_base_url: None,
        embedding_api_key: String::new(),
        embedding_model: String::new(),
        halfday_merge_min_occurrence: 2,
        halfday_merge_similarity_threshold: 0.80,
        halfday_merge_jaccard_threshold: 0.40,
        halfday_merge_llm_confidence: 0.80,
        global_merge_topk_candidates: 3,
        global_merge_min_similarity: 0.50,
        global_merge_confidence_threshold: 0.75,
        global_merge_max_batch_size: 200,
        global_merge_concurrent: 1,
        global_merge_new_topic_keep_ratio: 1.0,
        summary_concurrent_size: 5,
        platform_weights: std::collections::BTreeMap::new(),
    }
}

fn sample_item(run_id: Uuid, dedup_key: &str, title: &str, period_date: chrono::NaiveDate, period: Period) -> NewSourceItem {
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
        interactions: InteractionMetrics::new(),
        heat_value: Some(3000.0),
        period_date,
        period,
    }
}

#[tokio::test]
async fn stage_one_then_stage_two_creates_a_new_topic() {
    let Some(pool) = test_pool().await else { return };

    let items = SourceItemRepo::new(pool.clone());
    let topics = TopicRepo::new(pool.clone());
    let runs = RunRepo::new(pool.clone());
    let judgements = JudgementRepo::new(pool.clone());
    let vector_index: Arc<dyn VectorIndex> = Arc::new(PgVectorIndex::new(pool.clone()));
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbedder);
    let adjudicator: Arc<dyn LlmAdjudicator> = Arc::new(MockAdjudicator);

    let run_id = Uuid::new_v4();
    let date = Utc::now().date_naive();
    let period = Period::Pm;

    let headline = "王传君获东京电影节影帝";
    items
        .insert(sample_item(run_id, "a", headline, date, period))
        .await
        .unwrap();
    items
        .insert(sample_item(run_id, "b", headline, date, period))
        .await
        .unwrap();

    let config = test_config();
    let stage_one = StageOneMerger::new(
        items.clone(),
        runs.clone(),
        judgements.clone(),
        vector_index.clone(),
        embedder.clone(),
        adjudicator.clone(),
        HashMap::new(),
        &config,
    );
    let stats_one = stage_one.run(date, period).await.unwrap();
    assert_eq!(stats_one.input, 2);
    assert_eq!(stats_one.kept, 2);

    let stage_two = StageTwoMerger::new(
        items.clone(),
        topics.clone(),
        runs.clone(),
        judgements.clone(),
        vector_index.clone(),
        embedder.clone(),
        adjudicator.clone(),
        Arc::new(MockClassifier),
        Arc::new(MockSummaryGenerator),
        &config,
    );
    let stats_two = stage_two.run(date, period).await.unwrap();
    assert_eq!(stats_two.new_topics, 1);
    assert_eq!(stats_two.merged_groups, 0);
    assert_eq!(stats_two.kept, 2);

    let all_topics = topics.fetch_candidate_topics(false).await.unwrap();
    assert_eq!(all_topics.len(), 1);
    let topic = &all_topics[0];
    assert_eq!(topic.intensity_total, 2);

    let summary = topics.fetch_current_summary(topic.id).await.unwrap();
    assert!(summary.is_some());
}

#[tokio::test]
async fn stage_two_merges_into_a_recalled_topic() {
    let Some(pool) = test_pool().await else { return };

    let items = SourceItemRepo::new(pool.clone());
    let topics = TopicRepo::new(pool.clone());
    let runs = RunRepo::new(pool.clone());
    let judgements = JudgementRepo::new(pool.clone());
    let vector_index: Arc<dyn VectorIndex> = Arc::new(PgVectorIndex::new(pool.clone()));
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbedder);
    let adjudicator: Arc<dyn LlmAdjudicator> = Arc::new(MockAdjudicator);

    let date = Utc::now().date_naive();
    let period = Period::Am;
    let now = Utc::now();

    let existing_title = "暴雨预警升级为橙色";
    let mut tx = topics.begin().await.unwrap();
    let existing_topic_id =
        TopicRepo::create_topic(&mut tx, existing_title, now, now, 1, 0.5, None, None, None)
            .await
            .unwrap();
    tx.commit().await.unwrap();

    vector_index
        .upsert(
            &echoman_vector::index::topic_summary_vector_id(existing_topic_id),
            &char_bag_embedding(existing_title),
            VectorMetadata {
                object_type: echoman_common::EmbeddingObjectType::TopicSummary,
                object_id: existing_topic_id,
                topic_id: Some(existing_topic_id),
                generated_at: Some(now),
            },
            existing_title,
        )
        .await
        .unwrap();

    let run_id = Uuid::new_v4();
    items
        .insert(sample_item(run_id, "a", existing_title, date, period))
        .await
        .unwrap();
    items
        .insert(sample_item(run_id, "b", existing_title, date, period))
        .await
        .unwrap();

    let config = test_config();
    let stage_one = StageOneMerger::new(
        items.clone(),
        runs.clone(),
        judgements.clone(),
        vector_index.clone(),
        embedder.clone(),
        adjudicator.clone(),
        HashMap::new(),
        &config,
    );
    stage_one.run(date, period).await.unwrap();

    let stage_two = StageTwoMerger::new(
        items.clone(),
        topics.clone(),
        runs.clone(),
        judgements.clone(),
        vector_index.clone(),
        embedder.clone(),
        adjudicator.clone(),
        Arc::new(MockClassifier),
        Arc::new(MockSummaryGenerator),
        &config,
    );
    let stats_two = stage_two.run(date, period).await.unwrap();

    assert_eq!(stats_two.merged_groups, 1);
    assert_eq!(stats_two.new_topics, 0);

    let topic = topics.fetch_topic(existing_topic_id).await.unwrap().unwrap();
    assert_eq!(topic.intensity_total, 3);

    // Property #7 (`spec.md` §8): the merged-into topic had no prior
    // Summary row, so `merge_into`'s placeholder write must have committed
    // atomically with the Topic/Node/Heat writes above.
    let summary = topics.fetch_current_summary(existing_topic_id).await.unwrap();
    assert!(summary.is_some());
}

struct FailingAdjudicator;

#[async_trait]
impl LlmAdjudicator for FailingAdjudicator {
    async fn confirm_event_group(
        &self,
        _group_summary: &str,
        _candidate_title: &str,
        _candidate_summary: &str,
    ) -> Result<EventGroupConfirmation> {
        Ok(EventGroupConfirmation {
            is_same_event: true,
            confidence: 0.95,
            reason: "mock: always confirms".to_string(),
        })
    }

    async fn decide_topic_association(
        &self,
        _group_title: &str,
        _group_summary: &str,
        _candidates: &[TopicAssociationCandidate],
    ) -> Result<TopicAssociationOutcome> {
        Err(echoman_common::EchomanError::MalformedLlmResponse(
            "mock: provider exhausted its retries".to_string(),
        ))
    }
}

/// `spec.md` §7: a malformed/exhausted adjudicator response on stage two is
/// a group-level failure, not a license to fabricate a `NewTopic` outcome —
/// the group must stay `pending_global_merge` and no Topic is committed.
#[tokio::test]
async fn stage_two_leaves_group_pending_on_adjudicator_failure() {
    let Some(pool) = test_pool().await else { return };

    let items = SourceItemRepo::new(pool.clone());
    let topics = TopicRepo::new(pool.clone());
    let runs = RunRepo::new(pool.clone());
    let judgements = JudgementRepo::new(pool.clone());
    let vector_index: Arc<dyn VectorIndex> = Arc::new(PgVectorIndex::new(pool.clone()));
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbedder);
    let confirming_adjudicator: Arc<dyn LlmAdjudicator> = Arc::new(MockAdjudicator);
    let failing_adjudicator: Arc<dyn LlmAdjudicator> = Arc::new(FailingAdjudicator);

    let run_id = Uuid::new_v4();
    let date = Utc::now().date_naive();
    let period = Period::Pm;

    let headline = "王传君获东京电影节影帝";
    let id_a = items
        .insert(sample_item(run_id, "a", headline, date, period))
        .await
        .unwrap()
        .unwrap();
    let id_b = items
        .insert(sample_item(run_id, "b", headline, date, period))
        .await
        .unwrap()
        .unwrap();

    let config = test_config();
    let stage_one = StageOneMerger::new(
        items.clone(),
        runs.clone(),
        judgements.clone(),
        vector_index.clone(),
        embedder.clone(),
        confirming_adjudicator,
        HashMap::new(),
        &config,
    );
    stage_one.run(date, period).await.unwrap();

    let stage_two = StageTwoMerger::new(
        items.clone(),
        topics.clone(),
        runs.clone(),
        judgements.clone(),
        vector_index.clone(),
        embedder.clone(),
        failing_adjudicator,
        Arc::new(MockClassifier),
        Arc::new(MockSummaryGenerator),
        &config,
    );
    let stats_two = stage_two.run(date, period).await.unwrap();

    assert_eq!(stats_two.new_topics, 0);
    assert_eq!(stats_two.merged_groups, 0);
    assert_eq!(stats_two.kept, 0);

    let all_topics = topics.fetch_candidate_topics(false).await.unwrap();
    assert!(all_topics.is_empty());

    let refetched = items.fetch_by_ids(&[id_a, id_b]).await.unwrap();
    assert_eq!(refetched.len(), 2);
    for row in &refetched {
        assert_eq!(row.merge_status, echoman_common::MergeStatus::PendingGlobalMerge);
    }
}
