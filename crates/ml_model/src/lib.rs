//! Regression models for query execution time prediction.
//!
//! A [`PerformanceModel`] pairs a [`StandardScaler`] with one of three
//! deterministic regression algorithms. Both are fitted together on the same
//! batch and are replaced together on every call to
//! [`PerformanceModel::train`].

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2, ArrayView1};
use query_structs::{FEATURE_NAMES, ModelRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

mod bundle;
mod forest;
mod linear;
pub mod metrics;
mod scaler;
mod tree;

pub use bundle::{BUNDLE_FORMAT_VERSION, ModelBundle};
pub use forest::{ForestParams, RandomForest};
pub use linear::LinearRegression;
pub use query_structs::{ModelKind, PredictorError, Result};
pub use scaler::StandardScaler;
pub use tree::{RegressionTree, TreeParams};

use metrics::{mae, percent_errors, r_squared, rmse, round_to};

/// Upper bound on the confidence score.
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Lower bound on the confidence score.
pub const MIN_CONFIDENCE: f64 = 0.5;

/// Training sets smaller than this have their confidence reduced.
pub const SMALL_SAMPLE_THRESHOLD: usize = 100;

const SMALL_SAMPLE_PENALTY: f64 = 0.8;

/// Confidence score for a model with the given fit and sample count.
#[must_use]
pub fn compute_confidence(r_squared: f64, samples: usize) -> f64 {
    let mut confidence = r_squared.min(MAX_CONFIDENCE);
    if samples < SMALL_SAMPLE_THRESHOLD {
        confidence *= SMALL_SAMPLE_PENALTY;
    }
    confidence.max(MIN_CONFIDENCE)
}

/// A fitted regression algorithm, tagged by kind when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedAlgorithm {
    Linear(LinearRegression),
    Tree(RegressionTree),
    Forest(RandomForest),
}

impl FittedAlgorithm {
    /// Fits the algorithm for `kind` on an already scaled batch.
    #[must_use]
    pub fn fit(kind: ModelKind, features: &Array2<f64>, labels: &Array1<f64>) -> Self {
        match kind {
            ModelKind::Linear => Self::Linear(LinearRegression::fit(features, labels)),
            ModelKind::Tree => {
                Self::Tree(RegressionTree::fit(features, labels, TreeParams::default()))
            }
            ModelKind::Forest => {
                Self::Forest(RandomForest::fit(features, labels, ForestParams::default()))
            }
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ModelKind {
        match self {
            Self::Linear(_) => ModelKind::Linear,
            Self::Tree(_) => ModelKind::Tree,
            Self::Forest(_) => ModelKind::Forest,
        }
    }

    #[must_use]
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        match self {
            Self::Linear(model) => model.predict_row(row),
            Self::Tree(model) => model.predict_row(row),
            Self::Forest(model) => model.predict_row(row),
        }
    }

    #[must_use]
    pub fn predict(&self, features: &Array2<f64>) -> Array1<f64> {
        match self {
            Self::Linear(model) => model.predict(features),
            Self::Tree(model) => model.predict(features),
            Self::Forest(model) => model.predict(features),
        }
    }

    /// Whether the fitted parameters are consistent with `n_features` inputs.
    fn is_well_formed(&self, n_features: usize) -> bool {
        match self {
            Self::Linear(model) => {
                model.n_features() == n_features
                    && model.intercept.is_finite()
                    && model.coefficients.iter().all(|c| c.is_finite())
            }
            Self::Tree(model) => model.is_well_formed(n_features),
            Self::Forest(model) => model.is_well_formed(n_features),
        }
    }
}

/// Fit quality on the training set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub r_squared: f64,
    pub rmse: f64,
    pub mae: f64,
}

/// Summary returned by [`PerformanceModel::train`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub model_id: String,
    pub model_name: String,
    pub model_kind: ModelKind,
    pub training_samples: usize,
    /// Rounded to 4 decimal places.
    pub r_squared: f64,
    /// Rounded to 2 decimal places.
    pub rmse: f64,
    /// Rounded to 2 decimal places.
    pub mae: f64,
    /// Held-out R², rounded to 4 decimal places.
    pub test_r_squared: Option<f64>,
    pub training_timestamp: DateTime<Utc>,
    pub feature_count: usize,
}

/// Uncertainty band around a point prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower_bound_ms: f64,
    pub upper_bound_ms: f64,
    pub std_dev_ms: f64,
}

/// A single execution time prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_execution_time_ms: f64,
    /// Name of the model that produced the prediction.
    pub model_version: String,
    pub model_kind: ModelKind,
    pub prediction_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<ConfidenceInterval>,
}

/// Accuracy on a held-out batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub r_squared: f64,
    pub rmse: f64,
    pub mae: f64,
    pub median_error_percent: f64,
    pub mean_error_percent: f64,
    pub max_error_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct FittedState {
    scaler: StandardScaler,
    algorithm: FittedAlgorithm,
    metrics: ModelMetrics,
    training_sample_count: usize,
    training_timestamp: DateTime<Utc>,
}

/// Query execution time model.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceModel {
    model_id: String,
    model_name: String,
    kind: ModelKind,
    feature_names: Vec<String>,
    fitted: Option<FittedState>,
}

impl PerformanceModel {
    /// Creates an untrained model with a timestamped default name.
    #[must_use]
    pub fn new(kind: ModelKind) -> Self {
        let name = format!("Q-Exec-Predictor-{}", Utc::now().format("%Y%m%d-%H%M%S"));
        Self::with_name(kind, name)
    }

    /// Creates an untrained model with the given name.
    #[must_use]
    pub fn with_name(kind: ModelKind, name: impl Into<String>) -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        let model = Self {
            model_id: format!("model-{}-{}", kind.as_metadata_name(), &uuid[..8]),
            model_name: name.into(),
            kind,
            feature_names: FEATURE_NAMES.iter().map(ToString::to_string).collect(),
            fitted: None,
        };
        info!(
            model_id = %model.model_id,
            model_name = %model.model_name,
            kind = %kind,
            "Initialized performance model"
        );
        model
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    #[must_use]
    pub const fn kind(&self) -> ModelKind {
        self.kind
    }

    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    #[must_use]
    pub const fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    /// Training-set metrics, if trained.
    #[must_use]
    pub fn metrics(&self) -> Option<ModelMetrics> {
        self.fitted.as_ref().map(|f| f.metrics)
    }

    #[must_use]
    pub fn training_sample_count(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.training_sample_count)
    }

    #[must_use]
    pub fn training_timestamp(&self) -> Option<DateTime<Utc>> {
        self.fitted.as_ref().map(|f| f.training_timestamp)
    }

    /// Confidence score of this model. Untrained models score the minimum.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.fitted.as_ref().map_or(MIN_CONFIDENCE, |f| {
            compute_confidence(f.metrics.r_squared, f.training_sample_count)
        })
    }

    /// Fits the scaler and the algorithm on the training batch.
    ///
    /// If a held-out batch is given its R² is reported as well. The model is
    /// left unchanged when any input is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::FeatureValidationFailure`] if a batch is
    /// empty, has the wrong width, has a label count that differs from its
    /// row count, or contains non-finite values.
    pub fn train(
        &mut self,
        features: &Array2<f64>,
        labels: &Array1<f64>,
        test: Option<(&Array2<f64>, &Array1<f64>)>,
    ) -> Result<TrainingMetrics> {
        self.check_batch(features, labels)?;
        if let Some((test_features, test_labels)) = test {
            self.check_batch(test_features, test_labels)?;
        }

        info!(
            model_id = %self.model_id,
            kind = %self.kind,
            samples = features.nrows(),
            "Training model"
        );

        let (scaler, scaled) = StandardScaler::fit_transform(features);
        let algorithm = FittedAlgorithm::fit(self.kind, &scaled, labels);

        let fitted = algorithm.predict(&scaled);
        let metrics = ModelMetrics {
            r_squared: r_squared(labels, &fitted),
            rmse: rmse(labels, &fitted),
            mae: mae(labels, &fitted),
        };

        let test_r_squared = test.map(|(test_features, test_labels)| {
            let predicted = algorithm.predict(&scaler.transform(test_features));
            round_to(r_squared(test_labels, &predicted), 4)
        });

        let training_timestamp = Utc::now();
        self.fitted = Some(FittedState {
            scaler,
            algorithm,
            metrics,
            training_sample_count: features.nrows(),
            training_timestamp,
        });

        info!(
            model_id = %self.model_id,
            r_squared = metrics.r_squared,
            rmse = metrics.rmse,
            mae = metrics.mae,
            "Training complete"
        );

        Ok(TrainingMetrics {
            model_id: self.model_id.clone(),
            model_name: self.model_name.clone(),
            model_kind: self.kind,
            training_samples: features.nrows(),
            r_squared: round_to(metrics.r_squared, 4),
            rmse: round_to(metrics.rmse, 2),
            mae: round_to(metrics.mae, 2),
            test_r_squared,
            training_timestamp,
            feature_count: self.feature_names.len(),
        })
    }

    /// Predicts the execution time of one feature vector.
    ///
    /// With `with_confidence` the result carries the confidence score and an
    /// interval of two standard deviations, where the standard deviation is
    /// estimated as half the training RMSE.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::NotTrained`] before the first successful
    /// training run and [`PredictorError::FeatureValidationFailure`] if the
    /// vector has the wrong length.
    pub fn predict(&self, features: &[f64], with_confidence: bool) -> Result<Prediction> {
        let fitted = self.fitted.as_ref().ok_or(PredictorError::NotTrained)?;
        self.check_width(features.len())?;

        let scaled = fitted.scaler.transform_row(ArrayView1::from(features));
        let point = fitted.algorithm.predict_row(scaled.view());

        let mut prediction = Prediction {
            predicted_execution_time_ms: point,
            model_version: self.model_name.clone(),
            model_kind: self.kind,
            prediction_timestamp: Utc::now(),
            confidence_score: None,
            confidence_interval: None,
        };

        if with_confidence {
            let std_dev = fitted.metrics.rmse / 2.0;
            prediction.confidence_score = Some(self.confidence());
            prediction.confidence_interval = Some(ConfidenceInterval {
                lower_bound_ms: 2.0f64.mul_add(-std_dev, point),
                upper_bound_ms: 2.0f64.mul_add(std_dev, point),
                std_dev_ms: std_dev,
            });
        }

        debug!(
            model_id = %self.model_id,
            predicted_ms = point,
            "Prediction"
        );

        Ok(prediction)
    }

    /// Predicts every row of an unscaled batch.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::NotTrained`] before training and
    /// [`PredictorError::FeatureValidationFailure`] on a width mismatch.
    pub fn predict_batch(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or(PredictorError::NotTrained)?;
        self.check_width(features.ncols())?;
        Ok(fitted.algorithm.predict(&fitted.scaler.transform(features)))
    }

    /// Scores the model on a held-out batch.
    ///
    /// Percentage errors treat samples with a non-positive actual time as
    /// exact.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::NotTrained`] before training and
    /// [`PredictorError::FeatureValidationFailure`] for an invalid batch.
    #[expect(clippy::cast_precision_loss, reason = "sample counts are far below 2^52")]
    pub fn evaluate(
        &self,
        features: &Array2<f64>,
        labels: &Array1<f64>,
    ) -> Result<EvaluationReport> {
        if self.fitted.is_none() {
            return Err(PredictorError::NotTrained);
        }
        self.check_batch(features, labels)?;

        let predicted = self.predict_batch(features)?;
        let errors = percent_errors(labels, &predicted);

        let median = feature_extractor::stats::median(&errors).unwrap_or(0.0);
        let mean = errors.iter().sum::<f64>() / errors.len() as f64;
        let max = errors.iter().copied().fold(0.0, f64::max);

        Ok(EvaluationReport {
            r_squared: round_to(r_squared(labels, &predicted), 4),
            rmse: round_to(rmse(labels, &predicted), 2),
            mae: round_to(mae(labels, &predicted), 2),
            median_error_percent: round_to(median, 2),
            mean_error_percent: round_to(mean, 2),
            max_error_percent: round_to(max, 2),
        })
    }

    /// Metadata row for the metrics store.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::NotTrained`] if the model has not been fitted.
    pub fn to_record(&self) -> Result<ModelRecord> {
        let fitted = self.fitted.as_ref().ok_or(PredictorError::NotTrained)?;
        Ok(ModelRecord {
            model_id: self.model_id.clone(),
            model_name: self.model_name.clone(),
            model_kind: self.kind,
            feature_names: self.feature_names.clone(),
            training_sample_size: fitted.training_sample_count,
            r_squared: fitted.metrics.r_squared,
            rmse: fitted.metrics.rmse,
            mae: fitted.metrics.mae,
            created_at: fitted.training_timestamp,
        })
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width == self.feature_names.len() {
            Ok(())
        } else {
            Err(PredictorError::FeatureValidationFailure(format!(
                "expected {} features, found {width}",
                self.feature_names.len()
            )))
        }
    }

    fn check_batch(&self, features: &Array2<f64>, labels: &Array1<f64>) -> Result<()> {
        if features.nrows() == 0 {
            return Err(PredictorError::FeatureValidationFailure(
                "empty feature batch".to_string(),
            ));
        }
        if features.nrows() != labels.len() {
            return Err(PredictorError::FeatureValidationFailure(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        self.check_width(features.ncols())?;
        if !features.iter().chain(labels).all(|v| v.is_finite()) {
            return Err(PredictorError::FeatureValidationFailure(
                "batch contains NaN or infinite values".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for PerformanceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PerformanceModel(id={}, kind={}, samples={})",
            self.model_id,
            self.kind,
            self.training_sample_count()
        )
    }
}
