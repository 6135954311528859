//! `Topic`/`TopicNode`/`TopicPeriodHeat`/`Summary` repository.
//!
//! Writes that must commit atomically with a `SourceItemRepo::mark_merged`
//! call take `&mut sqlx::Transaction` explicitly (`spec.md` §9: "one worker
//! per group; each worker owns a private transactional session"). Read-only
//! lookups used for stage-two recall and RAG take the shared pool.

use chrono::{DateTime, NaiveDate, Utc};
use echoman_common::{Period, Result, TopicStatus};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{SummaryRow, TopicNodeRow, TopicPeriodHeatRow, TopicRow};

#[derive(Clone)]
pub struct TopicRepo {
    pool: PgPool,
}

impl TopicRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn fetch_topic(&self, topic_id: i64) -> Result<Option<TopicRow>> {
        let row = sqlx::query_as::<_, TopicRow>(
            r#"
            SELECT id, title_key, first_seen, last_active, status, intensity_total,
                   current_heat_normalized, heat_percentage, summary_id, category,
                   category_confidence, category_method, created_at, updated_at
            FROM topics WHERE id = $1
            "#,
        )
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Candidate topics for stage-two recall. `active_only` reflects the
    /// configurable scope named (but left unresolved) in `spec.md` §4.7;
    /// this implementation defaults to `true` (see `DESIGN.md`).
    pub async fn fetch_candidate_topics(&self, active_only: bool) -> Result<Vec<TopicRow>> {
        let rows = if active_only {
            sqlx::query_as::<_, TopicRow>(
                r#"
                SELECT id, title_key, first_seen, last_active, status, intensity_total,
                       current_heat_normalized, heat_percentage, summary_id, category,
                       category_confidence, category_method, created_at, updated_at
                FROM topics WHERE status = 'active'
                "#,
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, TopicRow>(
                r#"
                SELECT id, title_key, first_seen, last_active, status, intensity_total,
                       current_heat_normalized, heat_percentage, summary_id, category,
                       category_confidence, category_method, created_at, updated_at
                FROM topics
                "#,
            )
            .fetch_all(&self.pool)
            .await?
        };
        Ok(rows)
    }

    pub async fn fetch_current_summary(&self, topic_id: i64) -> Result<Option<SummaryRow>> {
        let row = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT s.id, s.topic_id, s.content, s.method, s.generated_at, s.created_at
            FROM summaries s JOIN topics t ON t.summary_id = s.id
            WHERE t.id = $1
            "#,
        )
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn fetch_nodes_for_topic(&self, topic_id: i64) -> Result<Vec<TopicNodeRow>> {
        let rows = sqlx::query_as::<_, TopicNodeRow>(
            "SELECT id, topic_id, source_item_id, appended_at, created_at \
             FROM topic_nodes WHERE topic_id = $1 ORDER BY appended_at DESC",
        )
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Create a new Topic inside `tx` (new-topic path of stage two,
    /// `spec.md` §4.6).
    pub async fn create_topic(
        tx: &mut Transaction<'_, Postgres>,
        title_key: &str,
        first_seen: DateTime<Utc>,
        last_active: DateTime<Utc>,
        intensity_total: i32,
        current_heat_normalized: f64,
        category: Option<&str>,
        category_confidence: Option<f64>,
        category_method: Option<&str>,
    ) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO topics
                (title_key, first_seen, last_active, status, intensity_total,
                 current_heat_normalized, heat_percentage, category,
                 category_confidence, category_method)
            VALUES ($1, $2, $3, 'active', $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(title_key)
        .bind(first_seen)
        .bind(last_active)
        .bind(intensity_total)
        .bind(current_heat_normalized)
        .bind(current_heat_normalized * 100.0)
        .bind(category)
        .bind(category_confidence)
        .bind(category_method)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    /// Merge path of stage two: advance `last_active`, bump
    /// `intensity_total`, and raise `current_heat_normalized` if this
    /// period's heat beats the prior peak.
    pub async fn advance_topic(
        tx: &mut Transaction<'_, Postgres>,
        topic_id: i64,
        last_active_candidate: DateTime<Utc>,
        added_nodes: i32,
        period_heat_normalized: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE topics
            SET last_active = GREATEST(last_active, $2),
                intensity_total = intensity_total + $3,
                current_heat_normalized = GREATEST(current_heat_normalized, $4),
                heat_percentage = GREATEST(current_heat_normalized, $4) * 100.0,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(topic_id)
        .bind(last_active_candidate)
        .bind(added_nodes)
        .bind(period_heat_normalized)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn insert_node(
        tx: &mut Transaction<'_, Postgres>,
        topic_id: i64,
        source_item_id: i64,
        appended_at: DateTime<Utc>,
    ) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO topic_nodes (topic_id, source_item_id, appended_at) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(topic_id)
        .bind(source_item_id)
        .bind(appended_at)
        .fetch_one(&mut **tx)
        .await?;
        Ok(id)
    }

    /// Upsert the `(topic_id, date, period)` heat row (`spec.md` §4.6).
    pub async fn upsert_period_heat(
        tx: &mut Transaction<'_, Postgres>,
        topic_id: i64,
        date: NaiveDate,
        period: Period,
        heat_normalized: f64,
        source_count: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO topic_period_heat
                (topic_id, date, period, heat_normalized, heat_percentage, source_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (topic_id, date, period) DO UPDATE SET
                heat_normalized = EXCLUDED.heat_normalized,
                heat_percentage = EXCLUDED.heat_percentage,
                source_count = EXCLUDED.source_count,
                updated_at = now()
            "#,
        )
        .bind(topic_id)
        .bind(date)
        .bind(period)
        .bind(heat_normalized)
        .bind(heat_normalized * 100.0)
        .bind(source_count)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Insert a Summary and point `topics.summary_id` at it, per the
    /// ownership invariant in `spec.md` §3.
    pub async fn insert_summary(
        tx: &mut Transaction<'_, Postgres>,
        topic_id: i64,
        content: &str,
        method: echoman_common::SummaryMethod,
    ) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO summaries (topic_id, content, method) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(topic_id)
        .bind(content)
        .bind(method)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query("UPDATE topics SET summary_id = $1, updated_at = now() WHERE id = $2")
            .bind(id)
            .bind(topic_id)
            .execute(&mut **tx)
            .await?;

        Ok(id)
    }

    pub async fn set_topic_status(&self, topic_id: i64, status: TopicStatus) -> Result<()> {
        sqlx::query("UPDATE topics SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status)
            .bind(topic_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
