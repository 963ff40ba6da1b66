//! Versioned JSON persistence for trained models.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    FittedAlgorithm, FittedState, ModelMetrics, PerformanceModel, PredictorError, Result,
    StandardScaler,
};

/// Bundle layout version written by this crate.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Everything needed to restore a trained [`PerformanceModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub format_version: u32,
    pub model_id: String,
    pub model_name: String,
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub algorithm: FittedAlgorithm,
    pub metrics: ModelMetrics,
    pub training_sample_count: usize,
    pub training_timestamp: DateTime<Utc>,
}

impl ModelBundle {
    /// Serializes the bundle as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a bundle, checking the format version before the payload.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::InvalidConfiguration`] for malformed JSON,
    /// an unsupported version, or an unknown algorithm kind.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;

        let version = value
            .get("format_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| {
                PredictorError::InvalidConfiguration(
                    "model bundle has no format_version".to_string(),
                )
            })?;
        if version != u64::from(BUNDLE_FORMAT_VERSION) {
            return Err(PredictorError::InvalidConfiguration(format!(
                "unsupported model bundle version {version}"
            )));
        }

        Ok(serde_json::from_value(value)?)
    }

    fn check_consistency(&self) -> Result<()> {
        let width = self.feature_names.len();
        let consistent = width > 0
            && self.scaler.n_features() == width
            && self.scaler.std.len() == width
            && self.scaler.std.iter().all(|s| s.is_finite() && *s != 0.0)
            && self.scaler.mean.iter().all(|m| m.is_finite())
            && self.algorithm.is_well_formed(width);

        if consistent {
            Ok(())
        } else {
            Err(PredictorError::InvalidConfiguration(format!(
                "model bundle {} is inconsistent with {width} features",
                self.model_id
            )))
        }
    }
}

impl PerformanceModel {
    /// Captures the trained model as a bundle.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::NotTrained`] if the model has not been fitted.
    pub fn to_bundle(&self) -> Result<ModelBundle> {
        let fitted = self.fitted.as_ref().ok_or(PredictorError::NotTrained)?;
        Ok(ModelBundle {
            format_version: BUNDLE_FORMAT_VERSION,
            model_id: self.model_id.clone(),
            model_name: self.model_name.clone(),
            feature_names: self.feature_names.clone(),
            scaler: fitted.scaler.clone(),
            algorithm: fitted.algorithm.clone(),
            metrics: fitted.metrics,
            training_sample_count: fitted.training_sample_count,
            training_timestamp: fitted.training_timestamp,
        })
    }

    /// Rebuilds a trained model from a bundle.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::InvalidConfiguration`] if the version is
    /// unsupported or the parameters disagree with the feature list.
    pub fn from_bundle(bundle: ModelBundle) -> Result<Self> {
        if bundle.format_version != BUNDLE_FORMAT_VERSION {
            return Err(PredictorError::InvalidConfiguration(format!(
                "unsupported model bundle version {}",
                bundle.format_version
            )));
        }
        bundle.check_consistency()?;

        Ok(Self {
            model_id: bundle.model_id,
            model_name: bundle.model_name,
            kind: bundle.algorithm.kind(),
            feature_names: bundle.feature_names,
            fitted: Some(FittedState {
                scaler: bundle.scaler,
                algorithm: bundle.algorithm,
                metrics: bundle.metrics,
                training_sample_count: bundle.training_sample_count,
                training_timestamp: bundle.training_timestamp,
            }),
        })
    }

    /// Writes the model bundle to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::NotTrained`] for an untrained model and
    /// [`PredictorError::ExternalStoreFailure`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_bundle()?.to_json()?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;

        info!(model_id = %self.model_id, path = %path.display(), "Model saved");
        Ok(())
    }

    /// Loads a model bundle from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PredictorError::ExternalStoreFailure`] if the file cannot be
    /// read and [`PredictorError::InvalidConfiguration`] if it is not a valid
    /// bundle.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let model = Self::from_bundle(ModelBundle::from_json(&json)?)?;

        info!(model_id = %model.model_id, path = %path.display(), "Model loaded");
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, Array2};
    use query_structs::{FEATURE_COUNT, ModelKind};

    use super::*;

    fn trained(kind: ModelKind) -> (PerformanceModel, Array2<f64>) {
        let features =
            Array2::from_shape_fn((60, FEATURE_COUNT), |(i, j)| ((i * 31 + j * 17) % 23) as f64);
        let labels: Array1<f64> = features
            .rows()
            .into_iter()
            .map(|r| 20.0 + 4.0 * r[0] + r[3])
            .collect();

        let mut model = PerformanceModel::new(kind);
        model.train(&features, &labels, None).unwrap();
        (model, features)
    }

    #[test]
    fn test_save_and_load_preserves_predictions() {
        let dir = tempfile::tempdir().unwrap();

        for kind in [ModelKind::Linear, ModelKind::Tree, ModelKind::Forest] {
            let (model, features) = trained(kind);
            let path = dir.path().join("models").join(format!("{}.json", model.model_id()));

            model.save(&path).unwrap();
            let restored = PerformanceModel::load(&path).unwrap();

            assert!(restored.is_trained());
            assert_eq!(restored.kind(), kind);
            assert_eq!(restored.model_id(), model.model_id());
            assert_eq!(restored.metrics(), model.metrics());
            assert_eq!(
                restored.predict_batch(&features).unwrap(),
                model.predict_batch(&features).unwrap()
            );
        }
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let (model, _) = trained(ModelKind::Linear);
        let mut value = serde_json::to_value(model.to_bundle().unwrap()).unwrap();
        value["format_version"] = serde_json::json!(99);

        let err = ModelBundle::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, PredictorError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let (model, _) = trained(ModelKind::Linear);
        let mut value = serde_json::to_value(model.to_bundle().unwrap()).unwrap();
        value["algorithm"]["kind"] = serde_json::json!("gradient_boosting");

        let err = ModelBundle::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, PredictorError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_inconsistent_bundle_is_rejected() {
        let (model, _) = trained(ModelKind::Linear);
        let mut bundle = model.to_bundle().unwrap();
        bundle.feature_names.pop();

        let err = PerformanceModel::from_bundle(bundle).unwrap_err();
        assert!(matches!(err, PredictorError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_untrained_model_cannot_be_saved() {
        let dir = tempfile::tempdir().unwrap();
        let model = PerformanceModel::new(ModelKind::Linear);
        assert_eq!(
            model.save(dir.path().join("m.json")),
            Err(PredictorError::NotTrained)
        );
    }

    #[test]
    fn test_missing_file_is_store_failure() {
        let err = PerformanceModel::load("/nonexistent/model.json").unwrap_err();
        assert!(matches!(err, PredictorError::ExternalStoreFailure(_)));
    }
}
