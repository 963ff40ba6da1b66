use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use query_structs::{PredictorError, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Job, JobParams, JobResult, JobState, JobStatus, JobType, TrainingSummary};

/// Concurrent job store keyed by job id.
///
/// Every mutation runs under the entry's shard lock, so readers only ever
/// see whole records.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: DashMap<String, Job>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pending job and returns its snapshot.
    pub fn create(&self, params: JobParams) -> Job {
        let job_type = params.job_type();
        let now = Utc::now();
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        let id = format!("{job_type}-{}-{}", now.format("%Y%m%d-%H%M%S"), &uuid[..8]);

        let job = Job {
            id: id.clone(),
            params,
            created_at: now,
            updated_at: now,
            state: JobState::Pending,
        };
        self.jobs.insert(id, job.clone());

        info!(job_id = %job.id, %job_type, "Job created");
        job
    }

    #[must_use]
    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.get(job_id).map(|entry| entry.value().clone())
    }

    /// Moves a job to a non-terminal status.
    ///
    /// Only `pending → training` and same-status updates on non-terminal jobs
    /// are accepted. Use [`Self::set_result`] and [`Self::set_error`] to
    /// finish a job.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::NotFound`] for an unknown id and
    /// [`PredictorError::InvalidTransition`] for any other move.
    pub fn set_status(&self, job_id: &str, status: JobStatus) -> Result<Job> {
        self.update(job_id, |job, now| {
            let current = job.status();
            match (current, status) {
                (JobStatus::Pending, JobStatus::Pending)
                | (JobStatus::Training, JobStatus::Training) => Ok(()),
                (JobStatus::Pending, JobStatus::Training) => {
                    job.state = JobState::Training { started_at: now };
                    Ok(())
                }
                _ => Err(PredictorError::InvalidTransition(format!(
                    "{}: {current} -> {status}",
                    job.id
                ))),
            }
        })
    }

    /// Completes a job with `result`.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::NotFound`] for an unknown id and
    /// [`PredictorError::InvalidTransition`] if the job already finished.
    pub fn set_result(&self, job_id: &str, result: JobResult) -> Result<Job> {
        self.update(job_id, |job, now| {
            ensure_active(job, JobStatus::Completed)?;
            job.state = JobState::Completed {
                result,
                completed_at: now,
            };
            Ok(())
        })
    }

    /// Fails a job with `error`.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::NotFound`] for an unknown id and
    /// [`PredictorError::InvalidTransition`] if the job already finished.
    pub fn set_error(&self, job_id: &str, error: impl Into<String>) -> Result<Job> {
        let error = error.into();
        self.update(job_id, |job, now| {
            ensure_active(job, JobStatus::Failed)?;
            job.state = JobState::Failed {
                error,
                failed_at: now,
            };
            Ok(())
        })
    }

    /// Jobs matching the optional filters, oldest first.
    #[must_use]
    pub fn list(&self, job_type: Option<JobType>, status: Option<JobStatus>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| job_type.is_none_or(|t| entry.job_type() == t))
            .filter(|entry| status.is_none_or(|s| entry.status() == s))
            .map(|entry| entry.value().clone())
            .collect();

        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Deletes every job created more than `max_age_hours` ago.
    ///
    /// Jobs that are still running are deleted as well.
    pub fn purge_older_than(&self, max_age_hours: u64) -> usize {
        let hours = i64::try_from(max_age_hours).unwrap_or(i64::MAX);
        let age = TimeDelta::try_hours(hours).unwrap_or(TimeDelta::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.purge_before(cutoff)
    }

    /// Deletes every job created before `cutoff` and returns how many.
    pub fn purge_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.jobs.retain(|id, job| {
            let keep = job.created_at >= cutoff;
            if !keep {
                if !job.status().is_terminal() {
                    warn!(job_id = %id, status = %job.status(), "Purging unfinished job");
                }
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            info!(removed, "Purged old jobs");
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Training job by id. Jobs of other types are not returned.
    #[must_use]
    pub fn get_training_job(&self, job_id: &str) -> Option<Job> {
        self.get(job_id)
            .filter(|job| job.job_type() == JobType::Training)
    }

    /// Marks a job as running.
    ///
    /// # Errors
    ///
    /// See [`Self::set_status`].
    pub fn mark_training_started(&self, job_id: &str) -> Result<Job> {
        self.set_status(job_id, JobStatus::Training)
    }

    /// Completes a training job with its summary.
    ///
    /// # Errors
    ///
    /// See [`Self::set_result`].
    pub fn mark_training_completed(&self, job_id: &str, summary: TrainingSummary) -> Result<Job> {
        self.set_result(job_id, JobResult::Training(summary))
    }

    /// Fails a training job.
    ///
    /// # Errors
    ///
    /// See [`Self::set_error`].
    pub fn mark_training_failed(&self, job_id: &str, error: impl Into<String>) -> Result<Job> {
        self.set_error(job_id, error)
    }

    /// Applies `f` under the entry lock and stamps `updated_at`.
    fn update<F>(&self, job_id: &str, f: F) -> Result<Job>
    where
        F: FnOnce(&mut Job, DateTime<Utc>) -> Result<()>,
    {
        let mut entry = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| PredictorError::NotFound(format!("job {job_id}")))?;

        let now = Utc::now().max(entry.updated_at);
        f(entry.value_mut(), now)?;
        entry.updated_at = now;

        debug!(job_id, status = %entry.status(), "Job updated");
        Ok(entry.value().clone())
    }
}

fn ensure_active(job: &Job, target: JobStatus) -> Result<()> {
    let current = job.status();
    if current.is_terminal() {
        return Err(PredictorError::InvalidTransition(format!(
            "{}: {current} -> {target}",
            job.id
        )));
    }
    Ok(())
}

/// Runs [`JobRegistry::purge_older_than`] every `interval` until `shutdown`
/// flips to `true` or its sender is dropped.
pub fn spawn_purge_task(
    registry: Arc<JobRegistry>,
    max_age_hours: u64,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    registry.purge_older_than(max_age_hours);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Job purge task stopped");
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use query_structs::{ModelKind, ValidationRecord};

    use super::*;
    use crate::jobs::{TrainingParams, ValidationParams};

    fn training_params() -> JobParams {
        JobParams::Training(TrainingParams {
            model_kind: ModelKind::Linear,
            lookback_days: 90,
        })
    }

    fn validation_params() -> JobParams {
        JobParams::Validation(ValidationParams {
            prediction_id: "pred-1".into(),
            query_hash: 42,
            predicted_ms: 125.5,
            actual_ms: 118.2,
            model_version: "v1".into(),
        })
    }

    fn validation_result() -> JobResult {
        JobResult::Validation(ValidationRecord {
            prediction_id: "pred-1".into(),
            query_hash: 42,
            model_version: "v1".into(),
            predicted_ms: 125.5,
            actual_ms: 118.2,
            error_ms: 7.3,
            error_percent: 6.18,
            accuracy_score: 0.938,
            within_interval: true,
            validated_at: Utc::now(),
        })
    }

    #[test]
    fn test_create_assigns_typed_id() {
        let registry = JobRegistry::new();
        let job = registry.create(training_params());

        assert!(job.id.starts_with("training-"));
        let suffix = job.id.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert_eq!(job.status(), JobStatus::Pending);
        assert_eq!(job.created_at, job.updated_at);
        assert_eq!(registry.get(&job.id), Some(job));
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = JobRegistry::new();
        let a = registry.create(validation_params());
        let b = registry.create(validation_params());
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("validation-"));
    }

    #[test]
    fn test_happy_path_transitions() {
        let registry = JobRegistry::new();
        let job = registry.create(validation_params());

        let running = registry.set_status(&job.id, JobStatus::Training).unwrap();
        assert_eq!(running.status(), JobStatus::Training);
        assert!(running.updated_at >= job.updated_at);

        let done = registry.set_result(&job.id, validation_result()).unwrap();
        assert_eq!(done.status(), JobStatus::Completed);
        assert!(done.result().is_some());
        assert!(done.error().is_none());
        assert!(done.updated_at >= running.updated_at);
    }

    #[test]
    fn test_pending_can_fail_directly() {
        let registry = JobRegistry::new();
        let job = registry.create(training_params());

        let failed = registry.set_error(&job.id, "boom").unwrap();
        assert_eq!(failed.status(), JobStatus::Failed);
        assert_eq!(failed.error(), Some("boom"));
        assert!(failed.result().is_none());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let registry = JobRegistry::new();
        let job = registry.create(training_params());
        registry.set_error(&job.id, "first").unwrap();

        for status in [JobStatus::Pending, JobStatus::Training] {
            assert!(matches!(
                registry.set_status(&job.id, status),
                Err(PredictorError::InvalidTransition(_))
            ));
        }
        assert!(matches!(
            registry.set_result(&job.id, validation_result()),
            Err(PredictorError::InvalidTransition(_))
        ));
        assert!(matches!(
            registry.set_error(&job.id, "second"),
            Err(PredictorError::InvalidTransition(_))
        ));
        assert_eq!(registry.get(&job.id).unwrap().error(), Some("first"));
    }

    #[test]
    fn test_set_status_cannot_finish_or_rewind() {
        let registry = JobRegistry::new();
        let job = registry.create(training_params());

        assert!(registry.set_status(&job.id, JobStatus::Completed).is_err());
        assert!(registry.set_status(&job.id, JobStatus::Failed).is_err());

        registry.set_status(&job.id, JobStatus::Training).unwrap();
        registry.set_status(&job.id, JobStatus::Training).unwrap();
        assert!(registry.set_status(&job.id, JobStatus::Pending).is_err());
    }

    #[test]
    fn test_unknown_job() {
        let registry = JobRegistry::new();
        assert!(registry.get("missing").is_none());
        assert!(matches!(
            registry.set_status("missing", JobStatus::Training),
            Err(PredictorError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_filters_and_orders() {
        let registry = JobRegistry::new();
        let first = registry.create(training_params());
        let second = registry.create(validation_params());
        let third = registry.create(training_params());
        registry.set_status(&third.id, JobStatus::Training).unwrap();

        let all = registry.list(None, None);
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].created_at <= w[1].created_at));

        let training: Vec<String> = registry
            .list(Some(JobType::Training), None)
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(training.len(), 2);
        assert!(training.contains(&first.id) && training.contains(&third.id));

        let pending = registry.list(None, Some(JobStatus::Pending));
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().any(|j| j.id == second.id));
    }

    #[test]
    fn test_purge_removes_old_jobs_regardless_of_status() {
        let registry = JobRegistry::new();
        let running = registry.create(training_params());
        registry.set_status(&running.id, JobStatus::Training).unwrap();
        let done = registry.create(training_params());
        registry.set_error(&done.id, "x").unwrap();

        assert_eq!(registry.purge_older_than(24), 0);
        assert_eq!(registry.len(), 2);

        let removed = registry.purge_before(Utc::now() + ChronoDuration::seconds(1));
        assert_eq!(removed, 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_training_helpers() {
        let registry = JobRegistry::new();
        let training = registry.create(training_params());
        let validation = registry.create(validation_params());

        assert!(registry.get_training_job(&training.id).is_some());
        assert!(registry.get_training_job(&validation.id).is_none());

        registry.mark_training_started(&training.id).unwrap();
        let failed = registry.mark_training_failed(&training.id, "no data").unwrap();
        assert_eq!(failed.error(), Some("no data"));
    }

    #[test]
    fn test_concurrent_updates_keep_records_whole() {
        let registry = Arc::new(JobRegistry::new());
        let ids: Vec<String> = (0..32).map(|_| registry.create(training_params()).id).collect();

        std::thread::scope(|scope| {
            for id in &ids {
                let registry = Arc::clone(&registry);
                scope.spawn(move || {
                    let _ = registry.set_status(id, JobStatus::Training);
                    let _ = registry.set_error(id, "done");
                });
            }
        });

        for job in registry.list(None, None) {
            assert_eq!(job.status(), JobStatus::Failed);
            assert_eq!(job.error(), Some("done"));
            assert!(job.updated_at >= job.created_at);
        }
    }

    #[tokio::test]
    async fn test_purge_task_stops_on_shutdown() {
        let registry = Arc::new(JobRegistry::new());
        let (tx, rx) = watch::channel(false);
        let handle = spawn_purge_task(Arc::clone(&registry), 24, Duration::from_millis(5), rx);

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_task_removes_old_jobs_on_tick() {
        let registry = Arc::new(JobRegistry::new());
        let old = registry.create(training_params()).id;
        let fresh = registry.create(validation_params()).id;
        if let Some(mut job) = registry.jobs.get_mut(&old) {
            job.created_at -= TimeDelta::hours(2);
        }

        let (tx, rx) = watch::channel(false);
        let handle = spawn_purge_task(Arc::clone(&registry), 1, Duration::from_secs(60), rx);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(registry.get(&old).is_some(), "no purge before the first interval");

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert!(registry.get(&old).is_none());
        assert!(registry.get(&fresh).is_some());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
