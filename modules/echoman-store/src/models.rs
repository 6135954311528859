//! Row types for every entity in `spec.md` §3. Each carries the
//! `created_at`/`updated_at` pair the teacher stamps on every table it owns,
//! even where the distilled spec doesn't call it out.

use chrono::{DateTime, NaiveDate, Utc};
use echoman_common::{
    InteractionMetrics, JudgementKind, JudgementStatus, MergeStatus, Period, Platform, RunKind,
    RunStatus, SummaryMethod, TopicStatus,
};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SourceItemRow {
    pub id: i64,
    pub dedup_key: String,
    pub run_id: Uuid,
    pub platform: Platform,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub interactions: Json<InteractionMetrics>,
    pub heat_value: Option<f64>,
    pub period_date: NaiveDate,
    pub period: Period,
    pub merge_status: MergeStatus,
    pub period_merge_group_id: Option<Uuid>,
    pub occurrence_count: Option<i32>,
    pub heat_normalized: Option<f64>,
    pub embedding_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSourceItem {
    pub dedup_key: String,
    pub run_id: Uuid,
    pub platform: Platform,
    pub title: String,
    pub summary: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub interactions: InteractionMetrics,
    pub heat_value: Option<f64>,
    pub period_date: NaiveDate,
    pub period: Period,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TopicRow {
    pub id: i64,
    pub title_key: String,
    pub first_seen: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub status: TopicStatus,
    pub intensity_total: i32,
    pub current_heat_normalized: f64,
    pub heat_percentage: f64,
    pub summary_id: Option<i64>,
    pub category: Option<String>,
    pub category_confidence: Option<f64>,
    pub category_method: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TopicNodeRow {
    pub id: i64,
    pub topic_id: i64,
    pub source_item_id: i64,
    pub appended_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TopicPeriodHeatRow {
    pub id: i64,
    pub topic_id: i64,
    pub date: NaiveDate,
    pub period: Period,
    pub heat_normalized: f64,
    pub heat_percentage: f64,
    pub source_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SummaryRow {
    pub id: i64,
    pub topic_id: i64,
    pub content: String,
    pub method: SummaryMethod,
    pub generated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RunRecordRow {
    pub id: i64,
    pub kind: RunKind,
    pub period_date: Option<NaiveDate>,
    pub period: Option<Period>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub input_count: i32,
    pub kept_count: i32,
    pub dropped_count: i32,
    pub status: RunStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct LlmJudgementRow {
    pub id: i64,
    pub kind: JudgementKind,
    pub run_id: Option<Uuid>,
    pub request_summary: String,
    pub response_json: Option<serde_json::Value>,
    pub tokens_prompt: Option<i32>,
    pub tokens_completion: Option<i32>,
    pub provider: String,
    pub model: String,
    pub status: JudgementStatus,
    pub created_at: DateTime<Utc>,
}
