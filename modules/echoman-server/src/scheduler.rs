//! Cron triggers for ingestion-adjacent stage runs (`spec.md` §4.5, §4.6,
//! §6 "Schedule (conceptual cron, Asia/Shanghai)"). No teacher source file
//! in the pack reaches for `tokio-cron-scheduler` directly — it only shows
//! up in the workspace dependency table — so this wiring follows the
//! crate's own documented API rather than an in-pack usage site.

use std::sync::Arc;

use echoman_common::PeriodKey;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::state::AppState;

/// Stage one runs five minutes after each period boundary.
const STAGE_ONE_CRON: &str = "0 5 8,12,18,22 * * *";
/// Stage two follows twenty minutes after the boundary, once stage one has
/// had time to settle its period.
const STAGE_TWO_CRON: &str = "0 20 8,12,18,22 * * *";

pub async fn start(state: Arc<AppState>) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let stage_one_state = state.clone();
    let stage_one_job = Job::new_async_tz(STAGE_ONE_CRON, chrono_tz::Asia::Shanghai, move |_uuid, _lock| {
        let state = stage_one_state.clone();
        Box::pin(async move {
            let key = PeriodKey::now();
            info!(%key, "scheduled stage one firing");
            if let Err(e) = state.stage_one.run(key.date, key.period).await {
                error!(%key, error = %e, "scheduled stage one failed");
            }
        })
    })?;
    scheduler.add(stage_one_job).await?;

    let stage_two_state = state.clone();
    let stage_two_job = Job::new_async_tz(STAGE_TWO_CRON, chrono_tz::Asia::Shanghai, move |_uuid, _lock| {
        let state = stage_two_state.clone();
        Box::pin(async move {
            let key = PeriodKey::now();
            info!(%key, "scheduled stage two firing");
            if let Err(e) = state.stage_two.run(key.date, key.period).await {
                error!(%key, error = %e, "scheduled stage two failed");
            }
        })
    })?;
    scheduler.add(stage_two_job).await?;

    scheduler.start().await?;
    Ok(scheduler)
}
