//! LLM adjudication for both merge stages, grounded on the teacher's
//! `ai-client::traits::{Agent, PromptBuilder}` shape: a structured request
//! goes out, a structured, schema-validated answer comes back.

use std::time::Duration;

use async_trait::async_trait;
use echoman_common::{EchomanError, JudgementKind, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::ProviderClient;
use crate::schema::StructuredOutput;
use crate::token::budgets;
use crate::wire::{JsonSchemaFormat, ResponseFormat, StructuredRequest, WireMessage};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EventGroupConfirmation {
    pub is_same_event: bool,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct TopicAssociationCandidate {
    pub topic_id: i64,
    pub topic_title: String,
    pub topic_summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TopicAssociationDecision {
    pub merge: bool,
    #[serde(default)]
    pub target_topic_index: Option<usize>,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub enum TopicAssociationOutcome {
    MergeInto {
        topic_id: i64,
        confidence: f64,
        reason: String,
    },
    NewTopic {
        confidence: f64,
        reason: String,
    },
}

#[async_trait]
pub trait LlmAdjudicator: Send + Sync {
    /// Does `candidate_title`/`candidate_summary` describe the same
    /// real-world event as the items already grouped under `group_summary`?
    async fn confirm_event_group(
        &self,
        group_summary: &str,
        candidate_title: &str,
        candidate_summary: &str,
    ) -> Result<EventGroupConfirmation>;

    /// Should the new event group merge into one of `candidates` (already
    /// vector-recalled as the nearest active topics) or found a new topic?
    async fn decide_topic_association(
        &self,
        group_title: &str,
        group_summary: &str,
        candidates: &[TopicAssociationCandidate],
    ) -> Result<TopicAssociationOutcome>;
}

pub struct OpenAiAdjudicator {
    client: ProviderClient,
    model: String,
    call_timeout: Duration,
    /// Confidence at or above which `decide_topic_association` merges into
    /// an existing topic rather than minting a new one (`spec.md` §6
    /// `GLOBAL_MERGE_CONFIDENCE_THRESHOLD`).
    topic_merge_confidence_threshold: f64,
}

impl OpenAiAdjudicator {
    pub fn new(client: ProviderClient, model: impl Into<String>, topic_merge_confidence_threshold: f64) -> Self {
        Self {
            client,
            model: model.into(),
            call_timeout: Duration::from_secs(30),
            topic_merge_confidence_threshold,
        }
    }

    async fn structured_call<T: StructuredOutput>(
        &self,
        schema_name: &str,
        system_prompt: String,
        user_prompt: String,
        max_tokens: u32,
    ) -> Result<T> {
        let request = StructuredRequest {
            model: self.model.clone(),
            messages: vec![
                WireMessage::system(system_prompt),
                WireMessage::user(user_prompt),
            ],
            temperature: Some(0.0),
            max_tokens,
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: schema_name.to_string(),
                    strict: true,
                    schema: T::json_schema_for_provider(),
                },
            },
        };

        let (content, _usage) = self
            .client
            .structured_output(&request, self.call_timeout)
            .await
            .map_err(|e| EchomanError::Transient {
                provider: "openai".to_string(),
                message: e.to_string(),
            })?;

        serde_json::from_str(&content).map_err(|e| {
            warn!(error = %e, raw = %content, "adjudicator returned malformed JSON");
            EchomanError::MalformedLlmResponse(e.to_string())
        })
    }
}

#[async_trait]
impl LlmAdjudicator for OpenAiAdjudicator {
    async fn confirm_event_group(
        &self,
        group_summary: &str,
        candidate_title: &str,
        candidate_summary: &str,
    ) -> Result<EventGroupConfirmation> {
        let system = "You judge whether a news item belongs to an existing \
            cluster of items describing the same real-world event. Answer \
            only with the requested JSON."
            .to_string();
        let user = format!(
            "Existing event group summary:\n{group_summary}\n\n\
             Candidate item title: {candidate_title}\n\
             Candidate item summary: {candidate_summary}\n\n\
             Does the candidate describe the same event as the group?"
        );

        self.structured_call::<EventGroupConfirmation>(
            "event_group_confirmation",
            system,
            user,
            150,
        )
        .await
    }

    async fn decide_topic_association(
        &self,
        group_title: &str,
        group_summary: &str,
        candidates: &[TopicAssociationCandidate],
    ) -> Result<TopicAssociationOutcome> {
        if candidates.is_empty() {
            return Ok(TopicAssociationOutcome::NewTopic {
                confidence: 1.0,
                reason: "no recalled topics to compare against".to_string(),
            });
        }

        let system = "You decide whether a freshly merged event group is a \
            continuation of an existing topic or a genuinely new one. \
            target_topic_index refers to the 0-based position in the \
            provided candidate list. Answer only with the requested JSON."
            .to_string();

        let candidate_list = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{i}] {}: {}", c.topic_title, c.topic_summary))
            .collect::<Vec<_>>()
            .join("\n");

        let user = format!(
            "New event group:\nTitle: {group_title}\nSummary: {group_summary}\n\n\
             Candidate topics:\n{candidate_list}\n\n\
             Should this merge into one of the candidates, or form a new topic?"
        );

        let decision: TopicAssociationDecision = self
            .structured_call(
                "topic_association_decision",
                system,
                user,
                budgets::STAGE_TWO_COMPLETION_TOKENS,
            )
            .await?;

        if decision.merge && decision.confidence >= self.topic_merge_confidence_threshold {
            let index = decision.target_topic_index.ok_or_else(|| {
                EchomanError::MalformedLlmResponse(
                    "merge=true without target_topic_index".to_string(),
                )
            })?;
            let target = candidates.get(index).ok_or_else(|| {
                EchomanError::MalformedLlmResponse(format!(
                    "target_topic_index {index} out of range ({} candidates)",
                    candidates.len()
                ))
            })?;
            Ok(TopicAssociationOutcome::MergeInto {
                topic_id: target.topic_id,
                confidence: decision.confidence,
                reason: decision.reason,
            })
        } else {
            Ok(TopicAssociationOutcome::NewTopic {
                confidence: decision.confidence,
                reason: decision.reason,
            })
        }
    }
}

pub fn judgement_kind_for_outcome(_outcome: &TopicAssociationOutcome) -> JudgementKind {
    JudgementKind::TopicAssociation
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct SummaryContent {
    content: String,
}

/// Full/incremental summary generation (`spec.md` §4.8). Kept as a
/// separate trait from `LlmAdjudicator` since its call shape is free-form
/// text, not a merge/no-merge decision.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn generate_full_summary(&self, topic_title: &str, item_titles: &[String]) -> Result<String>;

    async fn generate_incremental_summary(
        &self,
        previous_summary: &str,
        new_item_titles: &[String],
    ) -> Result<String>;
}

#[async_trait]
impl SummaryGenerator for OpenAiAdjudicator {
    async fn generate_full_summary(&self, topic_title: &str, item_titles: &[String]) -> Result<String> {
        let system = "You write a concise, neutral summary of a trending topic from the \
            headlines that compose it. Answer only with the requested JSON."
            .to_string();
        let items = item_titles.join("; ");
        let user = format!("Topic: {topic_title}\nHeadlines: {items}\n\nWrite a 2-3 sentence summary.");

        let result: SummaryContent = self
            .structured_call("full_summary", system, user, 300)
            .await?;
        Ok(result.content)
    }

    async fn generate_incremental_summary(
        &self,
        previous_summary: &str,
        new_item_titles: &[String],
    ) -> Result<String> {
        let system = "You update a topic summary to incorporate new developments, keeping it \
            concise. Answer only with the requested JSON."
            .to_string();
        let items = new_item_titles.join("; ");
        let user = format!(
            "Previous summary: {previous_summary}\nNew headlines: {items}\n\n\
             Rewrite the summary to incorporate the new headlines."
        );

        let result: SummaryContent = self
            .structured_call("incremental_summary", system, user, 300)
            .await?;
        Ok(result.content)
    }
}
