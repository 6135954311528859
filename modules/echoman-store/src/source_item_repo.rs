//! `SourceItem` repository. Raw `sqlx::query_as` over a `PgPool`, grounded
//! on the teacher's `rootsignal-events::store::EventStore` shape: a thin
//! struct wrapping a pool, one method per access pattern, no ORM.

use chrono::NaiveDate;
use echoman_common::{MergeStatus, Period, Result};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NewSourceItem, SourceItemRow};

#[derive(Clone)]
pub struct SourceItemRepo {
    pool: PgPool,
}

impl SourceItemRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one ingested atom. Per-run dedup is enforced by the
    /// `(dedup_key, run_id)` unique constraint; a conflict means this atom
    /// was already ingested in this run and is silently skipped.
    pub async fn insert(&self, item: NewSourceItem) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO source_items
                (dedup_key, run_id, platform, title, summary, url, published_at,
                 fetched_at, interactions, heat_value, period_date, period,
                 merge_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 'pending_event_merge')
            ON CONFLICT (dedup_key, run_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&item.dedup_key)
        .bind(item.run_id)
        .bind(item.platform)
        .bind(&item.title)
        .bind(&item.summary)
        .bind(&item.url)
        .bind(item.published_at)
        .bind(item.fetched_at)
        .bind(Json(item.interactions))
        .bind(item.heat_value)
        .bind(item.period_date)
        .bind(item.period)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id,)| id))
    }

    /// All items awaiting stage one for this period, in ingestion order.
    pub async fn fetch_pending_event_merge(
        &self,
        period_date: NaiveDate,
        period: Period,
    ) -> Result<Vec<SourceItemRow>> {
        let rows = sqlx::query_as::<_, SourceItemRow>(
            r#"
            SELECT id, dedup_key, run_id, platform, title, summary, url,
                   published_at, fetched_at, interactions, heat_value,
                   period_date, period, merge_status, period_merge_group_id,
                   occurrence_count, heat_normalized, embedding_id,
                   created_at, updated_at
            FROM source_items
            WHERE period_date = $1 AND period = $2 AND merge_status = 'pending_event_merge'
            ORDER BY fetched_at ASC
            "#,
        )
        .bind(period_date)
        .bind(period)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// All items advanced to stage two for this period.
    pub async fn fetch_pending_global_merge(
        &self,
        period_date: NaiveDate,
        period: Period,
    ) -> Result<Vec<SourceItemRow>> {
        let rows = sqlx::query_as::<_, SourceItemRow>(
            r#"
            SELECT id, dedup_key, run_id, platform, title, summary, url,
                   published_at, fetched_at, interactions, heat_value,
                   period_date, period, merge_status, period_merge_group_id,
                   occurrence_count, heat_normalized, embedding_id,
                   created_at, updated_at
            FROM source_items
            WHERE period_date = $1 AND period = $2 AND merge_status = 'pending_global_merge'
            ORDER BY period_merge_group_id, fetched_at ASC
            "#,
        )
        .bind(period_date)
        .bind(period)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Write the normalizer's output back (`spec.md` §4.2).
    pub async fn update_heat_normalized(&self, id: i64, heat_normalized: f64) -> Result<()> {
        sqlx::query("UPDATE source_items SET heat_normalized = $1, updated_at = now() WHERE id = $2")
            .bind(heat_normalized)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Stage-one's per-cluster outcome: a confirmed group of `occurrence`
    /// items advances to `pending_global_merge` once it meets
    /// `min_occurrence` (`spec.md` §6 `HALFDAY_MERGE_MIN_OCCURRENCE`);
    /// anything short of that is `discarded`.
    pub async fn advance_group(&self, item_ids: &[i64], occurrence: i32, min_occurrence: u32) -> Result<()> {
        let group_id = Uuid::new_v4();
        let status = if occurrence >= min_occurrence as i32 {
            MergeStatus::PendingGlobalMerge
        } else {
            MergeStatus::Discarded
        };

        sqlx::query(
            r#"
            UPDATE source_items
            SET merge_status = $1, period_merge_group_id = $2, occurrence_count = $3,
                updated_at = now()
            WHERE id = ANY($4)
            "#,
        )
        .bind(status)
        .bind(group_id)
        .bind(occurrence)
        .bind(item_ids)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stage-two commits a group: every item it touched becomes `merged`.
    /// Runs inside the caller's transaction so it commits atomically with
    /// the Topic/Node/Heat writes (`spec.md` §9 per-group atomicity).
    pub async fn mark_merged(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        item_ids: &[i64],
    ) -> Result<()> {
        sqlx::query(
            "UPDATE source_items SET merge_status = 'merged', updated_at = now() WHERE id = ANY($1)",
        )
        .bind(item_ids)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<SourceItemRow>> {
        let rows = sqlx::query_as::<_, SourceItemRow>(
            r#"
            SELECT id, dedup_key, run_id, platform, title, summary, url,
                   published_at, fetched_at, interactions, heat_value,
                   period_date, period, merge_status, period_merge_group_id,
                   occurrence_count, heat_normalized, embedding_id,
                   created_at, updated_at
            FROM source_items
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn set_embedding_id(&self, id: i64, embedding_id: i64) -> Result<()> {
        sqlx::query("UPDATE source_items SET embedding_id = $1, updated_at = now() WHERE id = $2")
            .bind(embedding_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
