//! `LLMJudgement` repository — an audit row for every adjudication call
//! (`spec.md` §3, §4.4).

use echoman_common::{JudgementKind, JudgementStatus, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::LlmJudgementRow;

#[derive(Clone)]
pub struct JudgementRepo {
    pool: PgPool,
}

pub struct NewJudgement {
    pub kind: JudgementKind,
    pub run_id: Option<Uuid>,
    pub request_summary: String,
    pub response_json: Option<serde_json::Value>,
    pub tokens_prompt: Option<i32>,
    pub tokens_completion: Option<i32>,
    pub provider: String,
    pub model: String,
    pub status: JudgementStatus,
}

impl JudgementRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, j: NewJudgement) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO llm_judgements
                (kind, run_id, request_summary, response_json, tokens_prompt,
                 tokens_completion, provider, model, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(j.kind)
        .bind(j.run_id)
        .bind(&j.request_summary)
        .bind(&j.response_json)
        .bind(j.tokens_prompt)
        .bind(j.tokens_completion)
        .bind(&j.provider)
        .bind(&j.model)
        .bind(j.status)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn fetch_for_run(&self, run_id: Uuid) -> Result<Vec<LlmJudgementRow>> {
        let rows = sqlx::query_as::<_, LlmJudgementRow>(
            r#"
            SELECT id, kind, run_id, request_summary, response_json, tokens_prompt,
                   tokens_completion, provider, model, status, created_at
            FROM llm_judgements WHERE run_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
