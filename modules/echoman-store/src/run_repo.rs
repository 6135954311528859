//! `RunRecord` repository — one row per pipeline invocation (`spec.md` §3).

use chrono::NaiveDate;
use echoman_common::{Period, Result, RunKind, RunStatus};
use sqlx::PgPool;

use crate::models::RunRecordRow;

#[derive(Clone)]
pub struct RunRepo {
    pool: PgPool,
}

impl RunRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn start(
        &self,
        kind: RunKind,
        period_date: Option<NaiveDate>,
        period: Option<Period>,
    ) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO run_records (kind, period_date, period, status) \
             VALUES ($1, $2, $3, 'running') RETURNING id",
        )
        .bind(kind)
        .bind(period_date)
        .bind(period)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn finish(
        &self,
        id: i64,
        input_count: i32,
        kept_count: i32,
        dropped_count: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE run_records
            SET finished_at = now(), status = 'completed',
                input_count = $2, kept_count = $3, dropped_count = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(input_count)
        .bind(kept_count)
        .bind(dropped_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail(&self, id: i64, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE run_records SET finished_at = now(), status = 'failed', error_message = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fetch_recent(&self, kind: RunKind, limit: i64) -> Result<Vec<RunRecordRow>> {
        let rows = sqlx::query_as::<_, RunRecordRow>(
            r#"
            SELECT id, kind, period_date, period, started_at, finished_at,
                   input_count, kept_count, dropped_count, status, error_message, created_at
            FROM run_records
            WHERE kind = $1
            ORDER BY started_at DESC
            LIMIT $2
            "#,
        )
        .bind(kind)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn status_of(&self, id: i64) -> Result<Option<RunStatus>> {
        let row: Option<(RunStatus,)> =
            sqlx::query_as("SELECT status FROM run_records WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(s,)| s))
    }
}
