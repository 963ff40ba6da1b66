//! Query execution time prediction backend.
//!
//! Training and validation run as tracked background jobs: callers create a
//! job through [`service::PredictorService`], a bounded worker pool runs the
//! matching orchestrator, and the [`jobs::JobRegistry`] records each job's
//! lifecycle until it is purged.

pub mod jobs;
pub mod orchestrators;
pub mod predict;
pub mod retry;
pub mod service;
pub mod worker;

pub use predict::predict_query;
pub use service::{PredictorService, ServiceSettings};
