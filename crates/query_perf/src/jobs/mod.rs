//! Job records and their lifecycle.
//!
//! A job moves `pending → training → completed | failed`, or straight from
//! `pending` to `failed`. The state is a tagged enum so a result exists only
//! on completed jobs and an error only on failed ones.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ml_model::TrainingMetrics;
use query_structs::{ModelKind, ValidationRecord};
use serde::Serialize;

mod registry;

pub use registry::{JobRegistry, spawn_purge_task};

/// Kind of work a job performs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum JobType {
    Training,
    Validation,
}

/// Lifecycle status of a job.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum JobStatus {
    Pending,
    /// In progress. Validation jobs use this state too.
    Training,
    Completed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Inputs of a training job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingParams {
    pub model_kind: ModelKind,
    pub lookback_days: u32,
}

/// Inputs of a validation job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationParams {
    pub prediction_id: String,
    pub query_hash: i64,
    pub predicted_ms: f64,
    pub actual_ms: f64,
    pub model_version: String,
}

/// Job inputs. The job type follows from the variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum JobParams {
    Training(TrainingParams),
    Validation(ValidationParams),
}

impl JobParams {
    #[must_use]
    pub const fn job_type(&self) -> JobType {
        match self {
            Self::Training(_) => JobType::Training,
            Self::Validation(_) => JobType::Validation,
        }
    }
}

/// What a completed training run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSummary {
    #[serde(flatten)]
    pub metrics: TrainingMetrics,
    /// Where the model bundle was written, if a model directory is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_path: Option<PathBuf>,
}

/// Result attached to a completed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result_type", rename_all = "snake_case")]
pub enum JobResult {
    Training(TrainingSummary),
    Validation(ValidationRecord),
}

/// Lifecycle state together with the data that only exists in that state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Training {
        started_at: DateTime<Utc>,
    },
    Completed {
        result: JobResult,
        completed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl JobState {
    #[must_use]
    pub const fn status(&self) -> JobStatus {
        match self {
            Self::Pending => JobStatus::Pending,
            Self::Training { .. } => JobStatus::Training,
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Snapshot of a tracked job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: String,
    pub params: JobParams,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: JobState,
}

impl Job {
    #[must_use]
    pub const fn job_type(&self) -> JobType {
        self.params.job_type()
    }

    #[must_use]
    pub const fn status(&self) -> JobStatus {
        self.state.status()
    }

    #[must_use]
    pub const fn result(&self) -> Option<&JobResult> {
        match &self.state {
            JobState::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}
