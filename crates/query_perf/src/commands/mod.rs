//! CLI command implementations.

use std::time::Duration;

use anyhow::{Context, Result};
use query_perf::PredictorService;
use query_perf::jobs::Job;

pub mod evaluate;
pub mod models;
pub mod predict;
pub mod train;
pub mod validate;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Extra wait past the hard limit before giving up on a job.
const WAIT_GRACE: Duration = Duration::from_secs(5);

/// Waits for a submitted job, then drains the service.
///
/// A job dropped by the hard time limit never reaches a terminal status, so
/// the wait is bounded by that limit.
async fn finish_job(service: PredictorService, job_id: &str, hard_limit: Duration) -> Result<Job> {
    let waited = tokio::time::timeout(
        hard_limit.saturating_add(WAIT_GRACE),
        service.wait_for(job_id, POLL_INTERVAL),
    )
    .await;
    service.shutdown().await;

    waited
        .with_context(|| format!("Job {job_id} did not finish within the time limit"))?
        .with_context(|| format!("Job {job_id} disappeared"))
}
