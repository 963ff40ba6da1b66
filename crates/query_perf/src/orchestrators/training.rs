use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use database::MetricsStore;
use feature_extractor::{MissingValueStrategy, clip_outliers, handle_missing_values, validate};
use ml_model::{ModelKind, PerformanceModel, TrainingMetrics};
use query_structs::{PredictorError, Result, TrainingData};
use serde::Serialize;
use tracing::{error, info, warn};

use super::SoftDeadline;
use crate::jobs::{JobParams, JobRegistry, TrainingParams, TrainingSummary};
use crate::retry::{RetryPolicy, run_with_retry};

/// Upper percentile at which feature columns are clipped before training.
const CLIP_PERCENTILE: f64 = 99.0;

/// Limits and destinations for training runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSettings {
    pub min_training_samples: usize,
    /// Bundles are written to `{model_dir}/{model_id}.json` when set.
    pub model_dir: Option<PathBuf>,
    pub soft_time_limit: Duration,
    pub retry: RetryPolicy,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            min_training_samples: 100,
            model_dir: None,
            soft_time_limit: Duration::from_secs(540),
            retry: RetryPolicy::TRAINING,
        }
    }
}

/// Final state of a training job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrainingOutcome {
    Completed {
        job_id: String,
        summary: TrainingSummary,
        completed_at: DateTime<Utc>,
    },
    Failed {
        job_id: String,
        error: String,
        failed_at: DateTime<Utc>,
    },
}

/// Extracts data, fits a model, persists it, and finalizes the job.
pub struct TrainingOrchestrator {
    store: Arc<dyn MetricsStore>,
    registry: Arc<JobRegistry>,
    settings: TrainingSettings,
}

impl TrainingOrchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn MetricsStore>,
        registry: Arc<JobRegistry>,
        settings: TrainingSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    /// Runs the training job `job_id` to completion.
    ///
    /// Store failures are retried according to the settings. Insufficient
    /// data, invalid features, and the soft time limit fail the job at once.
    pub async fn run(&self, job_id: &str) -> TrainingOutcome {
        let params = match self.registry.get_training_job(job_id).map(|job| job.params) {
            Some(JobParams::Training(params)) => params,
            _ => {
                let err = PredictorError::NotFound(format!("training job {job_id}"));
                return self.fail(job_id, &err);
            }
        };

        if let Err(err) = self.registry.mark_training_started(job_id) {
            return self.fail(job_id, &err);
        }

        info!(
            job_id,
            kind = %params.model_kind,
            lookback_days = params.lookback_days,
            "Starting training job"
        );

        let result = run_with_retry(self.settings.retry, "training", || {
            self.attempt(job_id, &params)
        })
        .await;

        match result {
            Ok(summary) => match self.registry.mark_training_completed(job_id, summary.clone()) {
                Ok(job) => {
                    info!(
                        job_id,
                        model_id = %summary.metrics.model_id,
                        r_squared = summary.metrics.r_squared,
                        "Training job completed"
                    );
                    TrainingOutcome::Completed {
                        job_id: job_id.to_string(),
                        summary,
                        completed_at: job.updated_at,
                    }
                }
                Err(err) => self.fail(job_id, &err),
            },
            Err(err) => self.fail(job_id, &err),
        }
    }

    async fn attempt(&self, job_id: &str, params: &TrainingParams) -> Result<TrainingSummary> {
        let deadline = SoftDeadline::start(self.settings.soft_time_limit);

        info!(job_id, "Extracting training data");
        let data = self.store.extract_training_data(params.lookback_days).await?;
        if data.len() < self.settings.min_training_samples {
            warn!(
                job_id,
                found = data.len(),
                required = self.settings.min_training_samples,
                "Insufficient training data"
            );
            return Err(PredictorError::InsufficientData {
                found: data.len(),
                required: self.settings.min_training_samples,
            });
        }
        deadline.check("extraction")?;

        let kind = params.model_kind;
        let name = format!("{job_id}-{}", kind.as_metadata_name());
        let (model, metrics) = tokio::task::spawn_blocking(move || fit_model(kind, name, data))
            .await
            .map_err(PredictorError::internal)??;
        deadline.check("training")?;

        self.store.save_model_metadata(&model.to_record()?).await?;

        let bundle_path = match &self.settings.model_dir {
            Some(dir) => {
                let path = dir.join(format!("{}.json", model.model_id()));
                model.save(&path)?;
                Some(path)
            }
            None => None,
        };
        deadline.check("persistence")?;

        Ok(TrainingSummary {
            metrics,
            bundle_path,
        })
    }

    fn fail(&self, job_id: &str, err: &PredictorError) -> TrainingOutcome {
        let message = err.to_string();
        error!(job_id, code = err.code(), error = %message, "Training job failed");

        let failed_at = match self.registry.mark_training_failed(job_id, message.clone()) {
            Ok(job) => job.updated_at,
            Err(update_err) => {
                warn!(job_id, error = %update_err, "Could not record training failure");
                Utc::now()
            }
        };

        TrainingOutcome::Failed {
            job_id: job_id.to_string(),
            error: message,
            failed_at,
        }
    }
}

/// Cleans the batch and fits a model on it.
fn fit_model(
    kind: ModelKind,
    name: String,
    data: TrainingData,
) -> Result<(PerformanceModel, TrainingMetrics)> {
    if !validate(&data.features) {
        return Err(PredictorError::FeatureValidationFailure(
            "Feature validation failed".to_string(),
        ));
    }

    let features = handle_missing_values(&data.features, MissingValueStrategy::Zero);
    let features = clip_outliers(&features, CLIP_PERCENTILE);
    feature_extractor::log_feature_info(&features);

    let mut model = PerformanceModel::with_name(kind, name);
    let metrics = model.train(&features, &data.labels, None)?;
    Ok((model, metrics))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use database::{MemoryStore, StoreOp};
    use query_structs::FEATURE_COUNT;

    use super::*;
    use crate::jobs::JobStatus;

    const FAST_RETRY: RetryPolicy = RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(1),
    };

    fn settings() -> TrainingSettings {
        TrainingSettings {
            retry: FAST_RETRY,
            ..TrainingSettings::default()
        }
    }

    fn seeded_store(rows: usize) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.seed_training_rows(rows, |i| {
            let features: Vec<f64> = (0..FEATURE_COUNT)
                .map(|j| ((i * (j + 3)) % 17) as f64)
                .collect();
            let label = 50.0 + 5.0 * features[0] + 3.0 * features[1];
            (features, label)
        });
        store
    }

    fn setup(
        store: &Arc<MemoryStore>,
        settings: TrainingSettings,
        kind: ModelKind,
    ) -> (TrainingOrchestrator, Arc<JobRegistry>, String) {
        let registry = Arc::new(JobRegistry::new());
        let job = registry.create(JobParams::Training(TrainingParams {
            model_kind: kind,
            lookback_days: 90,
        }));
        let store: Arc<dyn MetricsStore> = Arc::clone(store) as Arc<dyn MetricsStore>;
        let orchestrator = TrainingOrchestrator::new(store, Arc::clone(&registry), settings);
        (orchestrator, registry, job.id)
    }

    #[tokio::test]
    async fn test_successful_training_completes_job() {
        let store = seeded_store(150);
        let (orchestrator, registry, job_id) = setup(&store, settings(), ModelKind::Linear);

        let outcome = orchestrator.run(&job_id).await;
        let TrainingOutcome::Completed { summary, .. } = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(summary.metrics.training_samples, 150);
        assert!(summary.metrics.model_name.starts_with(&job_id));
        assert!(summary.metrics.r_squared > 0.5);

        let job = registry.get(&job_id).unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.error().is_none());

        let models = store.models();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].model_name, summary.metrics.model_name);
    }

    #[tokio::test]
    async fn test_insufficient_data_fails_without_retry() {
        let store = seeded_store(12);
        let (orchestrator, registry, job_id) = setup(&store, settings(), ModelKind::Linear);

        let outcome = orchestrator.run(&job_id).await;
        assert!(matches!(outcome, TrainingOutcome::Failed { .. }));

        let job = registry.get(&job_id).unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.error().unwrap().contains("Insufficient training data"));
        assert_eq!(store.calls(StoreOp::ExtractTrainingData), 1);
        assert!(store.models().is_empty());
    }

    #[tokio::test]
    async fn test_store_failures_are_retried_then_reported_verbatim() {
        let store = seeded_store(150);
        store.fail_next_op(StoreOp::ExtractTrainingData, 10, "connection refused");
        let (orchestrator, registry, job_id) = setup(&store, settings(), ModelKind::Linear);

        let outcome = orchestrator.run(&job_id).await;
        let TrainingOutcome::Failed { error, .. } = outcome else {
            panic!("expected failure");
        };

        assert_eq!(error, "External store failure: connection refused");
        assert_eq!(store.calls(StoreOp::ExtractTrainingData), 4);
        assert_eq!(registry.get(&job_id).unwrap().error(), Some(error.as_str()));
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let store = seeded_store(150);
        store.fail_next_op(StoreOp::SaveModel, 2, "deadlock detected");
        let (orchestrator, registry, job_id) = setup(&store, settings(), ModelKind::Tree);

        let outcome = orchestrator.run(&job_id).await;
        assert!(matches!(outcome, TrainingOutcome::Completed { .. }));
        assert_eq!(store.calls(StoreOp::ExtractTrainingData), 3);
        assert_eq!(store.calls(StoreOp::SaveModel), 3);
        assert_eq!(registry.get(&job_id).unwrap().status(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_non_finite_features_fail_validation() {
        let store = seeded_store(150);
        let mut row = vec![1.0; FEATURE_COUNT];
        row[3] = f64::NAN;
        store.insert_training_row(row, 10.0, Utc::now());
        let (orchestrator, registry, job_id) = setup(&store, settings(), ModelKind::Linear);

        orchestrator.run(&job_id).await;

        let job = registry.get(&job_id).unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.error().unwrap().contains("Feature validation failed"));
        assert_eq!(store.calls(StoreOp::ExtractTrainingData), 1);
    }

    #[tokio::test]
    async fn test_soft_time_limit_fails_without_retry() {
        let store = seeded_store(150);
        let settings = TrainingSettings {
            soft_time_limit: Duration::ZERO,
            ..settings()
        };
        let (orchestrator, registry, job_id) = setup(&store, settings, ModelKind::Linear);

        orchestrator.run(&job_id).await;

        let job = registry.get(&job_id).unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.error().unwrap().contains("soft time limit"));
        assert_eq!(store.calls(StoreOp::ExtractTrainingData), 1);
    }

    #[tokio::test]
    async fn test_bundle_written_to_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(120);
        let settings = TrainingSettings {
            model_dir: Some(dir.path().to_path_buf()),
            ..settings()
        };
        let (orchestrator, _registry, job_id) = setup(&store, settings, ModelKind::Linear);

        let TrainingOutcome::Completed { summary, .. } = orchestrator.run(&job_id).await else {
            panic!("expected completion");
        };

        let path = summary.bundle_path.unwrap();
        assert!(path.ends_with(format!("{}.json", summary.metrics.model_id)));
        let restored = PerformanceModel::load(&path).unwrap();
        assert_eq!(restored.model_id(), summary.metrics.model_id);
    }

    #[tokio::test]
    async fn test_unknown_job_is_reported() {
        let store = seeded_store(0);
        let (orchestrator, _registry, _) = setup(&store, settings(), ModelKind::Linear);

        let outcome = orchestrator.run("training-missing").await;
        let TrainingOutcome::Failed { error, .. } = outcome else {
            panic!("expected failure");
        };
        assert!(error.contains("training-missing"));
    }

    #[tokio::test]
    async fn test_unrepresentable_soft_limit_does_not_expire() {
        let store = seeded_store(120);
        let settings = TrainingSettings {
            soft_time_limit: Duration::from_secs(u64::MAX),
            ..settings()
        };
        let (orchestrator, registry, job_id) = setup(&store, settings, ModelKind::Linear);

        let outcome = orchestrator.run(&job_id).await;
        assert!(matches!(outcome, TrainingOutcome::Completed { .. }));
        assert_eq!(registry.get(&job_id).unwrap().status(), JobStatus::Completed);
    }
}
