use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use query_structs::{
    FEATURE_COUNT, ModelRecord, PredictorError, QueryMetrics, Result, TrainingData,
    ValidationRecord,
};
use tracing::debug;

use crate::{MetricsStore, StoredModel, TRAINING_ROW_LIMIT};

/// Store operations, used to count calls and target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Ping,
    ExtractTrainingData,
    ExtractFeatures,
    SaveModel,
    LatestModel,
    ListModels,
    RecordPrediction,
    RecordValidation,
}

#[derive(Debug, Clone)]
struct MetricRow {
    last_seen: DateTime<Utc>,
    features: Vec<f64>,
    execution_time_ms: f64,
}

/// A prediction captured by [`MemoryStore`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedPrediction {
    pub query_hash: i64,
    pub predicted_ms: f64,
    pub confidence: f64,
}

#[derive(Debug, Default)]
struct State {
    rows: Vec<MetricRow>,
    queries: HashMap<i64, QueryMetrics>,
    models: Vec<StoredModel>,
    predictions: Vec<RecordedPrediction>,
    validations: Vec<ValidationRecord>,
    failures: VecDeque<(Option<StoreOp>, String)>,
    calls: HashMap<StoreOp, usize>,
    next_model_id: i64,
}

/// In-process [`MetricsStore`] with failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a training row last seen at `last_seen`.
    ///
    /// # Panics
    ///
    /// Panics if `features` does not have one value per schema column.
    pub fn insert_training_row(
        &self,
        features: Vec<f64>,
        execution_time_ms: f64,
        last_seen: DateTime<Utc>,
    ) {
        assert_eq!(features.len(), FEATURE_COUNT, "training row width");
        self.state.lock().rows.push(MetricRow {
            last_seen,
            features,
            execution_time_ms,
        });
    }

    /// Adds `rows` training rows seen now, produced by `f(index)`.
    pub fn seed_training_rows<F>(&self, rows: usize, mut f: F)
    where
        F: FnMut(usize) -> (Vec<f64>, f64),
    {
        let now = Utc::now();
        for idx in 0..rows {
            let (features, label) = f(idx);
            self.insert_training_row(features, label, now);
        }
    }

    /// Registers the raw metrics for a query hash.
    pub fn insert_query(&self, query_hash: i64, metrics: QueryMetrics) {
        self.state.lock().queries.insert(query_hash, metrics);
    }

    /// Makes the next `count` calls to any operation fail.
    pub fn fail_next(&self, count: usize, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.state.lock();
        state
            .failures
            .extend(std::iter::repeat_n((None, message), count));
    }

    /// Makes the next `count` calls to `op` fail.
    pub fn fail_next_op(&self, op: StoreOp, count: usize, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.state.lock();
        state
            .failures
            .extend(std::iter::repeat_n((Some(op), message), count));
    }

    /// Number of times `op` was called, including failed calls.
    #[must_use]
    pub fn calls(&self, op: StoreOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn models(&self) -> Vec<StoredModel> {
        self.state.lock().models.clone()
    }

    #[must_use]
    pub fn predictions(&self) -> Vec<RecordedPrediction> {
        self.state.lock().predictions.clone()
    }

    #[must_use]
    pub fn validations(&self) -> Vec<ValidationRecord> {
        self.state.lock().validations.clone()
    }

    fn newest_models(&self, limit: usize) -> Vec<StoredModel> {
        let mut models = self.state.lock().models.clone();
        models.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        models.truncate(limit);
        models
    }

    /// Counts the call and consumes a matching injected failure, if any.
    fn enter(&self, op: StoreOp) -> Result<()> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_default() += 1;

        let position = state
            .failures
            .iter()
            .position(|(target, _)| target.is_none_or(|t| t == op));

        match position.and_then(|idx| state.failures.remove(idx)) {
            Some((_, message)) => {
                debug!(?op, %message, "Injected store failure");
                Err(PredictorError::ExternalStoreFailure(message))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.enter(StoreOp::Ping)
    }

    async fn extract_training_data(&self, lookback_days: u32) -> Result<TrainingData> {
        self.enter(StoreOp::ExtractTrainingData)?;

        let cutoff = Utc::now() - Duration::days(i64::from(lookback_days));
        let mut rows: Vec<MetricRow> = self
            .state
            .lock()
            .rows
            .iter()
            .filter(|r| r.last_seen >= cutoff && r.execution_time_ms > 0.0)
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        rows.truncate(TRAINING_ROW_LIMIT);

        TrainingData::from_rows(rows.into_iter().map(|r| (r.features, r.execution_time_ms)))
    }

    async fn extract_features_for_query(&self, query_hash: i64) -> Result<Option<QueryMetrics>> {
        self.enter(StoreOp::ExtractFeatures)?;
        Ok(self.state.lock().queries.get(&query_hash).cloned())
    }

    async fn save_model_metadata(&self, record: &ModelRecord) -> Result<()> {
        self.enter(StoreOp::SaveModel)?;

        let mut state = self.state.lock();
        let now = Utc::now();

        if let Some(existing) = state
            .models
            .iter_mut()
            .find(|m| m.model_name == record.model_name)
        {
            existing.r_squared = Some(record.r_squared);
            existing.training_sample_size =
                i64::try_from(record.training_sample_size).unwrap_or(i64::MAX);
            existing.last_updated = Some(now);
            return Ok(());
        }

        state.next_model_id += 1;
        let id = state.next_model_id;
        state.models.push(StoredModel {
            id,
            model_kind: record.model_kind,
            model_name: record.model_name.clone(),
            feature_names: record.feature_names.clone(),
            training_sample_size: i64::try_from(record.training_sample_size).unwrap_or(i64::MAX),
            r_squared: Some(record.r_squared),
            created_at: Some(now),
            last_updated: None,
        });
        Ok(())
    }

    async fn latest_model(&self) -> Result<Option<StoredModel>> {
        self.enter(StoreOp::LatestModel)?;
        Ok(self.newest_models(1).into_iter().next())
    }

    async fn list_models(&self, limit: usize) -> Result<Vec<StoredModel>> {
        self.enter(StoreOp::ListModels)?;
        Ok(self.newest_models(limit))
    }

    async fn record_prediction(
        &self,
        query_hash: i64,
        predicted_ms: f64,
        confidence: f64,
    ) -> Result<()> {
        self.enter(StoreOp::RecordPrediction)?;
        self.state.lock().predictions.push(RecordedPrediction {
            query_hash,
            predicted_ms,
            confidence,
        });
        Ok(())
    }

    async fn record_validation(&self, record: &ValidationRecord) -> Result<()> {
        self.enter(StoreOp::RecordValidation)?;
        self.state.lock().validations.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use query_structs::ModelKind;

    use super::*;

    fn record(name: &str, r_squared: f64, samples: usize) -> ModelRecord {
        ModelRecord {
            model_id: format!("model-{name}"),
            model_name: name.to_string(),
            model_kind: ModelKind::Linear,
            feature_names: vec!["query_calls_per_hour".into()],
            training_sample_size: samples,
            r_squared,
            rmse: 1.0,
            mae: 1.0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_training_extraction_filters_and_orders() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store.insert_training_row(vec![1.0; FEATURE_COUNT], 10.0, now - Duration::days(2));
        store.insert_training_row(vec![2.0; FEATURE_COUNT], 20.0, now - Duration::hours(1));
        store.insert_training_row(vec![3.0; FEATURE_COUNT], 30.0, now - Duration::days(100));
        store.insert_training_row(vec![4.0; FEATURE_COUNT], 0.0, now);

        let data = store.extract_training_data(90).await.unwrap();
        assert_eq!(data.len(), 2);
        assert!((data.labels[0] - 20.0).abs() < f64::EPSILON);
        assert!((data.labels[1] - 10.0).abs() < f64::EPSILON);
        assert_eq!(store.calls(StoreOp::ExtractTrainingData), 1);
    }

    #[tokio::test]
    async fn test_upsert_keyed_by_name() {
        let store = MemoryStore::new();
        store.save_model_metadata(&record("a", 0.5, 100)).await.unwrap();
        store.save_model_metadata(&record("a", 0.7, 150)).await.unwrap();
        store.save_model_metadata(&record("b", 0.9, 200)).await.unwrap();

        let models = store.models();
        assert_eq!(models.len(), 2);

        let a = models.iter().find(|m| m.model_name == "a").unwrap();
        assert_eq!(a.r_squared, Some(0.7));
        assert_eq!(a.training_sample_size, 150);
        assert!(a.last_updated.is_some());

        let latest = store.latest_model().await.unwrap().unwrap();
        assert_eq!(latest.model_name, "b");
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next(2, "connection reset");

        assert!(matches!(
            store.ping().await,
            Err(PredictorError::ExternalStoreFailure(_))
        ));
        assert!(store.extract_features_for_query(1).await.is_err());
        assert_eq!(store.extract_features_for_query(1).await, Ok(None));
        assert_eq!(store.calls(StoreOp::ExtractFeatures), 2);
    }

    #[tokio::test]
    async fn test_targeted_failure_skips_other_ops() {
        let store = MemoryStore::new();
        store.fail_next_op(StoreOp::SaveModel, 1, "disk full");

        store.ping().await.unwrap();
        let err = store
            .save_model_metadata(&record("x", 0.1, 1))
            .await
            .unwrap_err();
        assert_eq!(err, PredictorError::ExternalStoreFailure("disk full".into()));
        store.save_model_metadata(&record("x", 0.1, 1)).await.unwrap();
    }
}
