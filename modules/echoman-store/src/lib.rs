pub mod models;
pub mod source_item_repo;
pub mod topic_repo;
pub mod run_repo;
pub mod judgement_repo;

pub use models::*;
pub use source_item_repo::SourceItemRepo;
pub use topic_repo::TopicRepo;
pub use run_repo::RunRepo;
pub use judgement_repo::JudgementRepo;

/// Run all embedded migrations against `pool`. Mirrors the teacher's
/// `rootsignal-migrate` binary, folded into a library call since this
/// service owns one schema rather than a multi-tenant graph.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
