//! Stage-one event merger (`spec.md` §4.5): normalize heat, embed titles,
//! cluster by similarity, confirm clusters with the LLM, and transition
//! every item to `pending_global_merge` or `discarded`.

use std::collections::HashMap;

use chrono::NaiveDate;
use echoman_ai::{EmbeddingProvider, EventGroupConfirmation, LlmAdjudicator};
use echoman_common::{JudgementKind, JudgementStatus, Period, Platform, Result, RunKind};
use echoman_store::judgement_repo::NewJudgement;
use echoman_store::models::NewSourceItem;
use echoman_store::{JudgementRepo, RunRepo, SourceItemRepo};
use echoman_vector::{index::source_item_vector_id, VectorIndex, VectorMetadata};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clustering::{self, ClusterItem};
use crate::normalizer::{self, NormalizerItem};

#[derive(Debug, Default, Clone, Copy)]
pub struct StageOneStats {
    pub input: i32,
    pub kept: i32,
    pub dropped: i32,
}

pub struct StageOneMerger {
    items: SourceItemRepo,
    runs: RunRepo,
    judgements: JudgementRepo,
    vector_index: std::sync::Arc<dyn VectorIndex>,
    embedder: std::sync::Arc<dyn EmbeddingProvider>,
    adjudicator: std::sync::Arc<dyn LlmAdjudicator>,
    platform_weights: HashMap<Platform, f64>,
    min_occurrence: u32,
    cosine_threshold: f64,
    jaccard_threshold: f64,
    confidence_threshold: f64,
}

impl StageOneMerger {
    pub fn new(
        items: SourceItemRepo,
        runs: RunRepo,
        judgements: JudgementRepo,
        vector_index: std::sync::Arc<dyn VectorIndex>,
        embedder: std::sync::Arc<dyn EmbeddingProvider>,
        adjudicator: std::sync::Arc<dyn LlmAdjudicator>,
        platform_weights: HashMap<Platform, f64>,
        config: &echoman_common::Config,
    ) -> Self {
        Self {
            items,
            runs,
            judgements,
            vector_index,
            embedder,
            adjudicator,
            platform_weights,
            min_occurrence: config.halfday_merge_min_occurrence,
            cosine_threshold: config.halfday_merge_similarity_threshold,
            jaccard_threshold: config.halfday_merge_jaccard_threshold,
            confidence_threshold: config.halfday_merge_llm_confidence,
        }
    }

    pub async fn run(&self, period_date: NaiveDate, period: Period) -> Result<StageOneStats> {
        let run_id = self.runs.start(RunKind::EventMerge, Some(period_date), Some(period)).await?;

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

    async fn run_inner(&self, period_date: NaiveDate, period: Period) -> Result<StageOneStats> {
        let pending = self.items.fetch_pending_event_merge(period_date, period).await?;

        if pending.is_empty() {
            info!(%period_date, ?period, "stage one: nothing pending, empty run");
            return Ok(StageOneStats::default());
        }

        let norm_items: Vec<NormalizerItem> = pending
            .iter()
            .map(|row| NormalizerItem {
                id: row.id,
                platform: row.platform,
                heat_value: row.heat_value,
            })
            .collect();
        let heat_map = normalizer::normalize(&norm_items, &self.platform_weights)?;
        for (id, heat) in &heat_map {
            self.items.update_heat_normalized(*id, *heat).await?;
        }

        let embed_texts: Vec<String> = pending
            .iter()
            .map(|row| format!("{} {}", row.title, row.summary))
            .collect();
        let embeddings = self.embedder.embed_batch(&embed_texts).await?;

        for (row, embedding) in pending.iter().zip(embeddings.iter()) {
            self.vector_index
                .upsert(
                    &source_item_vector_id(row.id),
                    embedding,
                    VectorMetadata {
                        object_type: echoman_common::EmbeddingObjectType::SourceItem,
                        object_id: row.id,
                        topic_id: None,
                        generated_at: None,
                    },
                    &format!("{} {}", row.title, row.summary),
                )
                .await?;
        }

        let cluster_items: Vec<ClusterItem> = pending
            .iter()
            .zip(embeddings.iter())
            .map(|(row, emb)| ClusterItem {
                id: row.id,
                title: row.title.clone(),
                fetched_at: row.fetched_at,
                embedding: emb.clone(),
            })
            .collect();

        let groups = clustering::cluster(&cluster_items, self.cosine_threshold, self.jaccard_threshold);

        let mut stats = StageOneStats {
            input: pending.len() as i32,
            ..Default::default()
        };

        for group_indices in groups {
            let group_items: Vec<_> = group_indices.iter().map(|&idx| &cluster_items[idx]).collect();
            let ids: Vec<i64> = group_items.iter().map(|i| i.id).collect();

            if group_items.len() < 2 {
                self.items.advance_group(&ids, 1, self.min_occurrence).await?;
                stats.dropped += 1;
                continue;
            }

            let representative = group_items[0];
            let representative_row = pending.iter().find(|r| r.id == representative.id).unwrap();
            let group_summary = group_items[1..]
                .iter()
                .map(|i| i.title.as_str())
                .collect::<Vec<_>>()
                .join("; ");

            let confirmation = self
                .adjudicator
                .confirm_event_group(&group_summary, &representative.title, &representative_row.summary)
                .await;

            let confirmation = match confirmation {
                Ok(c) => {
                    self.record_judgement(&c, true).await?;
                    c
                }
                Err(e) => {
                    warn!(error = %e, "event group confirmation call failed, treating group as unconfirmed");
                    self.record_failed_judgement(&e.to_string()).await?;
                    EventGroupConfirmation {
                        is_same_event: false,
                        confidence: 0.0,
                        reason: "adjudicator call failed".to_string(),
                    }
                }
            };

            if confirmation.is_same_event && confirmation.confidence >= self.confidence_threshold {
                self.items.advance_group(&ids, ids.len() as i32, self.min_occurrence).await?;
                stats.kept += ids.len() as i32;
            } else {
                for id in &ids {
                    self.items.advance_group(&[*id], 1, self.min_occurrence).await?;
                }
                stats.dropped += ids.len() as i32;
            }
        }

        Ok(stats)
    }

    async fn record_judgement(&self, confirmation: &EventGroupConfirmation, ok: bool) -> Result<()> {
        self.judgements
            .insert(NewJudgement {
                kind: JudgementKind::EventGroupConfirmation,
                run_id: None,
                request_summary: "event group confirmation".to_string(),
                response_json: serde_json::to_value(confirmation).ok(),
                tokens_prompt: None,
                tokens_completion: None,
                provider: "openai".to_string(),
                model: "configured".to_string(),
                status: if ok { JudgementStatus::Ok } else { JudgementStatus::MalformedResponse },
            })
            .await?;
        Ok(())
    }

    async fn record_failed_judgement(&self, message: &str) -> Result<()> {
        self.judgements
            .insert(NewJudgement {
                kind: JudgementKind::EventGroupConfirmation,
                run_id: None,
                request_summary: "event group confirmation".to_string(),
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

/// Ingestion-side helper: construct a `NewSourceItem` with the period key
/// already resolved, used by the server crate's ingest endpoint.
pub fn label_for_ingestion(
    dedup_key: String,
    run_id: Uuid,
    platform: Platform,
    title: String,
    summary: String,
    url: String,
    published_at: Option<chrono::DateTime<chrono::Utc>>,
    fetched_at: chrono::DateTime<chrono::Utc>,
    interactions: echoman_common::InteractionMetrics,
    heat_value: Option<f64>,
) -> NewSourceItem {
    let key = echoman_common::PeriodKey::from_instant(fetched_at);
    NewSourceItem {
        dedup_key,
        run_id,
        platform,
        title,
        summary,
        url,
        published_at,
        fetched_at,
        interactions,
        heat_value,
        period_date: key.date,
        period: key.period,
    }
}
