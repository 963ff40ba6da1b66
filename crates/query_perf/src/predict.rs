//! Serving a prediction for a known query.

use database::MetricsStore;
use ml_model::{PerformanceModel, Prediction};
use query_structs::{PredictorError, Result};
use tracing::{info, warn};

/// Predicts the execution time of the query identified by `query_hash`.
///
/// The prediction is recorded in the store on a best-effort basis; a failed
/// write is logged and the prediction is still returned.
///
/// # Errors
///
/// Returns [`PredictorError::NotFound`] if the store has no metrics for the
/// query, [`PredictorError::NotTrained`] for an unfitted model, and store
/// errors from the feature lookup.
pub async fn predict_query(
    store: &dyn MetricsStore,
    model: &PerformanceModel,
    query_hash: i64,
) -> Result<Prediction> {
    let metrics = store
        .extract_features_for_query(query_hash)
        .await?
        .ok_or_else(|| PredictorError::NotFound(format!("query {query_hash}")))?;

    let features = feature_extractor::extract(&metrics);
    let prediction = model.predict(features.values(), true)?;
    let confidence = prediction.confidence_score.unwrap_or_default();

    if let Err(err) = store
        .record_prediction(query_hash, prediction.predicted_execution_time_ms, confidence)
        .await
    {
        warn!(query_hash, error = %err, "Failed to record prediction");
    }

    info!(
        query_hash,
        predicted_ms = prediction.predicted_execution_time_ms,
        confidence,
        model = %prediction.model_version,
        "Prediction served"
    );

    Ok(prediction)
}

#[cfg(test)]
mod tests {
    use database::{MemoryStore, StoreOp};
    use ml_model::ModelKind;
    use ndarray::{Array1, Array2};
    use query_structs::{FEATURE_COUNT, FEATURE_NAMES, QueryMetrics};
    use serde_json::json;

    use super::*;

    fn trained_model() -> PerformanceModel {
        let rows = 120;
        let features = Array2::from_shape_fn((rows, FEATURE_COUNT), |(i, j)| {
            if j == 0 { i as f64 } else { 1.0 }
        });
        let labels = Array1::from_shape_fn(rows, |i| 10.0 + 2.0 * i as f64);

        let mut model = PerformanceModel::with_name(ModelKind::Linear, "predict-test");
        model.train(&features, &labels, None).unwrap();
        model
    }

    fn metrics(calls: f64) -> QueryMetrics {
        let mut metrics = QueryMetrics::new();
        for name in FEATURE_NAMES {
            metrics.insert(name.into(), json!(1));
        }
        metrics.insert("query_calls_per_hour".into(), json!(calls));
        metrics
    }

    #[tokio::test]
    async fn test_predict_known_query() {
        let store = MemoryStore::new();
        store.insert_query(7, metrics(50.0));
        let model = trained_model();

        let prediction = predict_query(&store, &model, 7).await.unwrap();
        assert!((prediction.predicted_execution_time_ms - 110.0).abs() < 1e-6);
        assert_eq!(prediction.model_version, "predict-test");

        let score = prediction.confidence_score.unwrap();
        assert!((0.5..=0.95).contains(&score));
        let interval = prediction.confidence_interval.unwrap();
        assert!(interval.lower_bound_ms <= prediction.predicted_execution_time_ms);
        assert!(interval.upper_bound_ms >= prediction.predicted_execution_time_ms);

        let recorded = store.predictions();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].query_hash, 7);
    }

    #[tokio::test]
    async fn test_unknown_query_is_not_found() {
        let store = MemoryStore::new();
        let err = predict_query(&store, &trained_model(), 99).await.unwrap_err();
        assert!(matches!(err, PredictorError::NotFound(_)));
        assert!(store.predictions().is_empty());
    }

    #[tokio::test]
    async fn test_record_failure_still_returns_prediction() {
        let store = MemoryStore::new();
        store.insert_query(7, metrics(10.0));
        store.fail_next_op(StoreOp::RecordPrediction, 1, "disk full");

        let prediction = predict_query(&store, &trained_model(), 7).await.unwrap();
        assert!((prediction.predicted_execution_time_ms - 30.0).abs() < 1e-6);
        assert_eq!(store.calls(StoreOp::RecordPrediction), 1);
    }

    #[tokio::test]
    async fn test_untrained_model_is_rejected() {
        let store = MemoryStore::new();
        store.insert_query(7, metrics(10.0));
        let model = PerformanceModel::new(ModelKind::Linear);

        let err = predict_query(&store, &model, 7).await.unwrap_err();
        assert_eq!(err, PredictorError::NotTrained);
    }
}
