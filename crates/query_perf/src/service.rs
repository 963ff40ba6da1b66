//! Lifecycle of the prediction backend: job registry, purge timer and workers.

use std::sync::Arc;
use std::time::Duration;

use config::Config;
use database::MetricsStore;
use query_structs::{PredictorError, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::jobs::{
    Job, JobParams, JobRegistry, JobStatus, JobType, TrainingParams, ValidationParams,
    spawn_purge_task,
};
use crate::orchestrators::{
    TrainingOrchestrator, TrainingSettings, ValidationOrchestrator, ValidationSettings,
};
use crate::retry::RetryPolicy;
use crate::worker::WorkerPool;

/// Runtime settings for [`PredictorService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    pub worker_concurrency: usize,
    /// Tasks running longer than this are dropped.
    pub hard_time_limit: Duration,
    pub job_max_age_hours: u64,
    pub job_purge_interval: Duration,
    pub training: TrainingSettings,
    pub validation: ValidationSettings,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            worker_concurrency: 2,
            hard_time_limit: Duration::from_secs(600),
            job_max_age_hours: 24,
            job_purge_interval: Duration::from_secs(3600),
            training: TrainingSettings::default(),
            validation: ValidationSettings::default(),
        }
    }
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            worker_concurrency: config.worker_concurrency,
            hard_time_limit: config.task_time_limit,
            job_max_age_hours: config.job_max_age_hours,
            job_purge_interval: config.job_purge_interval,
            training: TrainingSettings {
                min_training_samples: config.min_training_samples,
                model_dir: config.model_dir.clone(),
                soft_time_limit: config.task_soft_time_limit,
                retry: RetryPolicy::TRAINING,
            },
            validation: ValidationSettings {
                soft_time_limit: config.task_soft_time_limit,
                retry: RetryPolicy::VALIDATION,
            },
        }
    }
}

/// Accepts training and validation jobs and runs them in the background.
pub struct PredictorService {
    registry: Arc<JobRegistry>,
    training: Arc<TrainingOrchestrator>,
    validation: Arc<ValidationOrchestrator>,
    workers: WorkerPool,
    shutdown: watch::Sender<bool>,
    purge_task: JoinHandle<()>,
}

impl PredictorService {
    /// Builds the registry and spawns the purge timer and worker pool.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(settings: ServiceSettings, store: Arc<dyn MetricsStore>) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let purge_task = spawn_purge_task(
            Arc::clone(&registry),
            settings.job_max_age_hours,
            settings.job_purge_interval,
            shutdown_rx,
        );

        let training = Arc::new(TrainingOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            settings.training,
        ));
        let validation = Arc::new(ValidationOrchestrator::new(
            store,
            Arc::clone(&registry),
            settings.validation,
        ));
        let workers = WorkerPool::start(settings.worker_concurrency, settings.hard_time_limit);

        info!("Predictor service started");

        Self {
            registry,
            training,
            validation,
            workers,
            shutdown,
            purge_task,
        }
    }

    /// Shared job registry.
    #[must_use]
    pub fn registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.registry)
    }

    /// Creates a training job and queues it.
    ///
    /// # Errors
    ///
    /// Fails if the worker pool has stopped. The job is marked failed.
    pub fn submit_training(&self, params: TrainingParams) -> Result<Job> {
        let job = self.registry.create(JobParams::Training(params));
        let orchestrator = Arc::clone(&self.training);
        let job_id = job.id.clone();

        self.enqueue(job, async move {
            orchestrator.run(&job_id).await;
        })
    }

    /// Creates a validation job and queues it.
    ///
    /// # Errors
    ///
    /// Fails if the worker pool has stopped. The job is marked failed.
    pub fn submit_validation(&self, params: ValidationParams) -> Result<Job> {
        let job = self.registry.create(JobParams::Validation(params));
        let orchestrator = Arc::clone(&self.validation);
        let job_id = job.id.clone();

        self.enqueue(job, async move {
            orchestrator.run_job(&job_id).await;
        })
    }

    fn enqueue<F>(&self, job: Job, task: F) -> Result<Job>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Err(err) = self.workers.submit(job.id.clone(), task) {
            if let Err(update_err) = self.registry.set_error(&job.id, err.to_string()) {
                error!(job_id = %job.id, error = %update_err, "Could not fail unqueued job");
            }
            return Err(err);
        }

        info!(job_id = %job.id, job_type = %job.job_type(), "Job submitted");
        Ok(job)
    }

    #[must_use]
    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.registry.get(job_id)
    }

    #[must_use]
    pub fn list_jobs(&self, job_type: Option<JobType>, status: Option<JobStatus>) -> Vec<Job> {
        self.registry.list(job_type, status)
    }

    /// Polls until the job reaches a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::NotFound`] if the job is unknown or purged.
    pub async fn wait_for(&self, job_id: &str, poll: Duration) -> Result<Job> {
        loop {
            let job = self
                .registry
                .get(job_id)
                .ok_or_else(|| PredictorError::NotFound(format!("job {job_id}")))?;
            if job.status().is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Drains the worker pool, then stops the purge timer.
    pub async fn shutdown(self) {
        let Self {
            workers,
            shutdown,
            purge_task,
            ..
        } = self;

        workers.shutdown().await;
        shutdown.send_replace(true);
        if let Err(err) = purge_task.await {
            error!(error = %err, "Purge task crashed");
        }
        info!("Predictor service stopped");
    }
}
