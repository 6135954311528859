//! Stage-two global merger (`spec.md` §4.6): recall candidate topics by
//! vector similarity, let the LLM decide merge-vs-new, and commit each
//! group's Topic/Node/Heat writes atomically in its own transaction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use echoman_ai::{EmbeddingProvider, LlmAdjudicator, SummaryGenerator, TopicAssociationCandidate, TopicAssociationOutcome};
use echoman_common::{
    EmbeddingObjectType, JudgementKind, JudgementStatus, Period, Result, RunKind,
};
use echoman_store::judgement_repo::NewJudgement;
use echoman_store::{JudgementRepo, RunRepo, SourceItemRepo, TopicRepo};
use echoman_store::models::SourceItemRow;
use echoman_vector::{VectorIndex, VectorQuery};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::TopicClassifier;
use crate::summary::SummaryEngine;

/// `GLOBAL_MERGE_TOPK_CANDIDATES`. Spec-fixed, not a `Config` field.
pub const TOPK_CANDIDATES: usize = 3;
/// `GLOBAL_MERGE_CONCURRENT` default, used until `with_concurrency` is
/// called with the configured value.
pub const DEFAULT_CONCURRENCY: usize = 1;

#[derive(Debug, Default, Clone, Copy)]
pub struct StageTwoStats {
    pub input: i32,
    pub kept: i32,
    pub dropped: i32,
    pub merged_groups: i32,
    pub new_topics: i32,
}

enum SummaryTask {
    Full { topic_id: i64, title: String, item_titles: Vec<String> },
    Incremental { topic_id: i64, previous_summary: String, new_item_titles: Vec<String> },
}

pub struct StageTwoMerger {
    items: SourceItemRepo,
    topics: TopicRepo,
    runs: RunRepo,
    judgements: JudgementRepo,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    adjudicator: Arc<dyn LlmAdjudicator>,
    classifier: Arc<dyn TopicClassifier>,
    summary_engine: SummaryEngine,
    concurrency: usize,
    min_similarity: f64,
    max_batch_size: usize,
    summary_concurrency: usize,
}

impl StageTwoMerger {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        items: SourceItemRepo,
        topics: TopicRepo,
        runs: RunRepo,
        judgements: JudgementRepo,
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        adjudicator: Arc<dyn LlmAdjudicator>,
        classifier: Arc<dyn TopicClassifier>,
        summary_generator: Arc<dyn SummaryGenerator>,
        config: &echoman_common::Config,
    ) -> Self {
        let summary_engine =
            SummaryEngine::new(topics.clone(), vector_index.clone(), embedder.clone(), summary_generator);
        Self {
            items,
            topics,
            runs,
            judgements,
            vector_index,
            embedder,
            adjudicator,
            classifier,
            summary_engine,
            concurrency: DEFAULT_CONCURRENCY,
            min_similarity: config.global_merge_min_similarity,
            max_batch_size: config.global_merge_max_batch_size,
            summary_concurrency: config.summary_concurrent_size,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn run(&self, period_date: NaiveDate, period: Period) -> Result<StageTwoStats> {
        let run_id = self.runs.start(RunKind::GlobalMerge, Some(period_date), Some(period)).await?;

        let outcome = self.run_inner(period_date, period).await;
        match &outcome {
            Ok(stats) => {
                self.runs.finish(run_id, stats.input, stats.kept, stats.dropped).await?;
            }
            Err(e) => {
                self.runs.fail(run_id, &e.to_string()).await?;
            }
        }
        outcome
    }

    async fn run_inner(&self, period_date: NaiveDate, period: Period) -> Result<StageTwoStats> {
        let pending = self.items.fetch_pending_global_merge(period_date, period).await?;

        if pending.is_empty() {
            info!(%period_date, ?period, "stage two: nothing pending, empty run");
            return Ok(StageTwoStats::default());
        }

        let mut order: Vec<Uuid> = Vec::new();
        let mut groups: HashMap<Uuid, Vec<SourceItemRow>> = HashMap::new();
        for row in pending {
            let gid = row.period_merge_group_id.unwrap_or_else(Uuid::new_v4);
            if !groups.contains_key(&gid) {
                order.push(gid);
            }
            groups.entry(gid).or_default().push(row);
        }

        let total_input: i32 = groups.values().map(|g| g.len() as i32).sum();
        let cap = order.len().min(self.max_batch_size);
        if order.len() > self.max_batch_size {
            warn!(
                pending_groups = order.len(),
                cap = self.max_batch_size,
                "stage two: more groups pending than the batch cap, deferring the remainder"
            );
        }
        let (processed_ids, deferred_ids) = order.split_at(cap);
        let dropped: i32 = deferred_ids.iter().map(|gid| groups.get(gid).map(|g| g.len()).unwrap_or(0) as i32).sum();

        let mut stats = StageTwoStats {
            input: total_input,
            dropped,
            ..Default::default()
        };

        let mut summary_tasks: Vec<SummaryTask> = Vec::new();

        let group_outcomes = stream::iter(processed_ids.iter().map(|gid| {
            let group = groups.get(gid).cloned().unwrap_or_default();
            self.process_group(period_date, period, group)
        }))
        .buffer_unordered(self.concurrency)
        .collect::<Vec<_>>()
        .await;

        for outcome in group_outcomes {
            match outcome {
                Ok(GroupOutcome::Merged { item_count, task }) => {
                    stats.kept += item_count;
                    stats.merged_groups += 1;
                    if let Some(task) = task {
                        summary_tasks.push(task);
                    }
                }
                Ok(GroupOutcome::New { item_count, task }) => {
                    stats.kept += item_count;
                    stats.new_topics += 1;
                    summary_tasks.push(task);
                }
                Err(e) => {
                    warn!(error = %e, "stage two: group processing failed, items remain pending_global_merge");
                }
            }
        }

        let post_batch_results: Vec<Result<()>> = stream::iter(summary_tasks.into_iter().map(|task| async move {
            match task {
                SummaryTask::Full { topic_id, title, item_titles } => {
                    self.summary_engine.generate_full(topic_id, &title, &item_titles).await
                }
                SummaryTask::Incremental { topic_id, previous_summary, new_item_titles } => {
                    self.summary_engine
                        .generate_incremental(topic_id, &previous_summary, &new_item_titles)
                        .await
                }
            }
        }))
        .buffer_unordered(self.summary_concurrency)
        .collect()
        .await;

        for result in post_batch_results {
            if let Err(e) = result {
                warn!(error = %e, "post-batch summary generation failed, placeholder/previous summary retained");
            }
        }

        Ok(stats)
    }

    async fn process_group(
        &self,
        period_date: NaiveDate,
        period: Period,
        group: Vec<SourceItemRow>,
    ) -> Result<GroupOutcome> {
        let representative = &group[0];
        let ids: Vec<i64> = group.iter().map(|r| r.id).collect();
        let query_text = format!("{} {}", representative.title, representative.summary);
        let query_embedding = self.embedder.embed(&query_text).await?;

        let mut candidates = self
            .vector_index
            .query(
                &query_embedding,
                TOPK_CANDIDATES,
                VectorQuery { object_type: Some(EmbeddingObjectType::TopicSummary), topic_id: None },
            )
            .await?
            .into_iter()
            .filter(|m| m.similarity >= self.min_similarity)
            .collect::<Vec<_>>();

        if candidates.is_empty() {
            let mut recent = self.topics.fetch_candidate_topics(true).await?;
            recent.sort_by(|a, b| b.last_active.cmp(&a.last_active));
            recent.truncate(TOPK_CANDIDATES);
            for topic in recent {
                let document = self
                    .topics
                    .fetch_current_summary(topic.id)
                    .await?
                    .map(|s| s.content)
                    .unwrap_or_default();
                candidates.push(echoman_vector::VectorMatch {
                    id: echoman_vector::index::topic_summary_vector_id(topic.id),
                    similarity: 0.0,
                    metadata: echoman_vector::VectorMetadata {
                        object_type: EmbeddingObjectType::TopicSummary,
                        object_id: topic.id,
                        topic_id: Some(topic.id),
                        generated_at: None,
                    },
                    document,
                });
            }
        }

        let mut assoc_candidates = Vec::with_capacity(candidates.len());
        for m in &candidates {
            let topic = self.topics.fetch_topic(m.metadata.object_id).await?;
            if let Some(topic) = topic {
                assoc_candidates.push(TopicAssociationCandidate {
                    topic_id: topic.id,
                    topic_title: topic.title_key,
                    topic_summary: m.document.clone(),
                });
            }
        }

        let other_titles = group[1..].iter().map(|r| r.title.as_str()).collect::<Vec<_>>().join("; ");
        let group_summary = if other_titles.is_empty() {
            representative.summary.clone()
        } else {
            format!("{}. {}", representative.summary, other_titles)
        };

        let outcome = self
            .adjudicator
            .decide_topic_association(&representative.title, &group_summary, &assoc_candidates)
            .await;

        let outcome = match outcome {
            Ok(o) => {
                self.record_judgement(&o, JudgementStatus::Ok).await?;
                o
            }
            Err(e) => {
                warn!(error = %e, "topic association call failed, group left pending_global_merge for retry");
                self.record_failed_judgement(&e.to_string()).await?;
                return Err(e);
            }
        };

        match outcome {
            TopicAssociationOutcome::MergeInto { topic_id, .. } => {
                self.merge_into(period_date, period, topic_id, &group, &ids).await
            }
            TopicAssociationOutcome::NewTopic { .. } => {
                self.create_new_topic(period_date, period, &group, &ids).await
            }
        }
    }

    async fn merge_into(
        &self,
        period_date: NaiveDate,
        period: Period,
        topic_id: i64,
        group: &[SourceItemRow],
        ids: &[i64],
    ) -> Result<GroupOutcome> {
        let last_active_candidate = group.iter().map(|r| r.fetched_at).max().unwrap_or_else(Utc::now);
        let period_heat_normalized: f64 = group.iter().filter_map(|r| r.heat_normalized).sum();
        let item_count = group.len() as i32;

        // Read the topic's pre-merge state before opening the write
        // transaction: `title_key` is immutable so this is safe to read
        // ahead, and `intensity_total` gives the node count the placeholder
        // text needs without a second query against rows this same
        // transaction hasn't committed yet.
        let existing_topic = self.topics.fetch_topic(topic_id).await?;
        let topic_title = existing_topic
            .as_ref()
            .map(|t| t.title_key.clone())
            .unwrap_or_else(|| group[0].title.clone());
        let prior_intensity_total = existing_topic.as_ref().map(|t| t.intensity_total).unwrap_or(0);
        let existing_summary = self.topics.fetch_current_summary(topic_id).await?;

        let mut tx = self.topics.begin().await?;
        for row in group {
            TopicRepo::insert_node(&mut tx, topic_id, row.id, row.fetched_at).await?;
        }
        SourceItemRepo::mark_merged(&mut tx, ids).await?;
        TopicRepo::advance_topic(&mut tx, topic_id, last_active_candidate, item_count, period_heat_normalized)
            .await?;
        TopicRepo::upsert_period_heat(&mut tx, topic_id, period_date, period, period_heat_normalized, item_count)
            .await?;

        // A topic can reach this branch with no Summary yet (its placeholder
        // write failed on an earlier run); write one now so it commits
        // atomically with this group's Topic/Node/Heat writes, per `spec.md`
        // §5, instead of leaving the topic permanently without a summary.
        let placeholder_content = if existing_summary.is_none() {
            let total_nodes = (prior_intensity_total + item_count).max(0) as usize;
            Some(SummaryEngine::insert_placeholder(&mut tx, topic_id, &topic_title, total_nodes).await?)
        } else {
            None
        };

        tx.commit().await?;

        if let Some(content) = &placeholder_content {
            self.summary_engine.upsert_vector(topic_id, content).await?;
        }

        let new_item_titles: Vec<String> = group.iter().map(|r| r.title.clone()).collect();
        let task = match existing_summary {
            Some(summary) => Some(SummaryTask::Incremental {
                topic_id,
                previous_summary: summary.content,
                new_item_titles,
            }),
            None => Some(SummaryTask::Incremental {
                topic_id,
                previous_summary: placeholder_content.expect("placeholder written when no existing summary"),
                new_item_titles,
            }),
        };

        Ok(GroupOutcome::Merged { item_count, task })
    }

    async fn create_new_topic(
        &self,
        period_date: NaiveDate,
        period: Period,
        group: &[SourceItemRow],
        ids: &[i64],
    ) -> Result<GroupOutcome> {
        let first_seen = group.iter().map(|r| r.fetched_at).min().unwrap_or_else(Utc::now);
        let last_active = group.iter().map(|r| r.fetched_at).max().unwrap_or(first_seen);
        let item_count = group.len() as i32;
        let current_heat_normalized: f64 = group.iter().filter_map(|r| r.heat_normalized).sum();
        let title_key = group[0].title.clone();

        let classify_text = group.iter().map(|r| r.title.as_str()).collect::<Vec<_>>().join(" ");
        let classification = match self.classifier.classify(&classify_text).await {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(error = %e, "topic classification failed, leaving category unset");
                None
            }
        };

        let mut tx = self.topics.begin().await?;
        let topic_id = TopicRepo::create_topic(
            &mut tx,
            &title_key,
            first_seen,
            last_active,
            item_count,
            current_heat_normalized,
            classification.as_ref().map(|c| c.category.as_str()),
            classification.as_ref().map(|c| c.confidence),
            classification.as_ref().map(|c| c.method.as_str()),
        )
        .await?;
        for row in group {
            TopicRepo::insert_node(&mut tx, topic_id, row.id, row.fetched_at).await?;
        }
        SourceItemRepo::mark_merged(&mut tx, ids).await?;
        TopicRepo::upsert_period_heat(&mut tx, topic_id, period_date, period, current_heat_normalized, item_count)
            .await?;
        let placeholder_content =
            SummaryEngine::insert_placeholder(&mut tx, topic_id, &title_key, group.len()).await?;
        tx.commit().await?;

        self.summary_engine.upsert_vector(topic_id, &placeholder_content).await?;

        let item_titles: Vec<String> = group.iter().map(|r| r.title.clone()).collect();
        let task = SummaryTask::Full { topic_id, title: title_key, item_titles };

        Ok(GroupOutcome::New { item_count, task })
    }

    async fn record_judgement(&self, outcome: &TopicAssociationOutcome, status: JudgementStatus) -> Result<()> {
        let response_json = match outcome {
            TopicAssociationOutcome::MergeInto { topic_id, confidence, reason } => {
                serde_json::json!({ "merge": true, "topic_id": topic_id, "confidence": confidence, "reason": reason })
            }
            TopicAssociationOutcome::NewTopic { confidence, reason } => {
                serde_json::json!({ "merge": false, "confidence": confidence, "reason": reason })
            }
        };
        self.judgements
            .insert(NewJudgement {
                kind: JudgementKind::TopicAssociation,
                run_id: None,
                request_summary: "topic association decision".to_string(),
                response_json: Some(response_json),
                tokens_prompt: None,
                tokens_completion: None,
                provider: "openai".to_string(),
                model: "configured".to_string(),
                status,
            })
            .await?;
        Ok(())
    }

    async fn record_failed_judgement(&self, message: &str) -> Result<()> {
        self.judgements
            .insert(NewJudgement {
                kind: JudgementKind::TopicAssociation,
                run_id: None,
                request_summary: "topic association decision".to_string(),
                response_json: Some(serde_json::json!({ "error": message })),
                tokens_prompt: None,
                tokens_completion: None,
                provider: "openai".to_string(),
                model: "configured".to_string(),
                status: JudgementStatus::ProviderError,
            })
            .await?;
        Ok(())
    }
}

enum GroupOutcome {
    Merged { item_count: i32, task: Option<SummaryTask> },
    New { item_count: i32, task: SummaryTask },
}
