use async_trait::async_trait;
use query_structs::{FEATURE_NAMES, ModelRecord, PredictorError, QueryMetrics, Result, TrainingData};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::models::{FeatureRow, ModelRow, TrainingRow};
use crate::{MetricsStore, StoredModel, TRAINING_ROW_LIMIT};

const FEATURE_COLUMNS: &str = r"
    pqs.query_calls_per_hour::float8 AS query_calls_per_hour,
    pqs.mean_table_size_mb::float8 AS mean_table_size_mb,
    pqs.index_count::float8 AS index_count,
    (CASE WHEN pqs.scan_type = 'Seq Scan' THEN 1 ELSE 0 END)::float8 AS has_seq_scan,
    (CASE WHEN pqs.scan_type LIKE '%Nested Loop%' THEN 1 ELSE 0 END)::float8 AS has_nested_loop,
    COALESCE(pqs.subquery_depth, 0)::float8 AS subquery_depth,
    COALESCE(pqs.concurrent_queries_avg, 0)::float8 AS concurrent_queries_avg,
    COALESCE(pqs.available_memory_pct, 60)::float8 AS available_memory_pct,
    COALESCE(pqs.std_dev_calls, 0)::float8 AS std_dev_calls,
    COALESCE(pqs.peak_hour_calls, 0)::float8 AS peak_hour_calls,
    COALESCE(pqs.table_row_count, 0)::float8 AS table_row_count,
    COALESCE(pqs.avg_row_width_bytes, 0)::float8 AS avg_row_width_bytes";

const MODEL_COLUMNS: &str = r"
    id::int8 AS id,
    model_type,
    model_name,
    feature_names,
    training_sample_size::int8 AS training_sample_size,
    r_squared::float8 AS r_squared,
    created_at,
    last_updated";

/// [`MetricsStore`] backed by a `PostgreSQL` connection pool.
#[derive(Debug, Clone)]
pub struct PgMetricsStore {
    pool: PgPool,
}

impl PgMetricsStore {
    /// Connects a pool of at most `max_connections` connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection to the database fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(PredictorError::store)?;

        info!(max_connections, "Database connection pool initialized");
        Ok(Self { pool })
    }

    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes every connection in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

#[async_trait]
impl MetricsStore for PgMetricsStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(PredictorError::store)?;
        Ok(())
    }

    async fn extract_training_data(&self, lookback_days: u32) -> Result<TrainingData> {
        let sql = format!(
            "SELECT {FEATURE_COLUMNS},
                pqs.mean_execution_time_ms::float8 AS target
            FROM metrics_pg_stats_query pqs
            WHERE pqs.last_seen >= NOW() - make_interval(days => $1)
              AND pqs.mean_execution_time_ms > 0
              AND pqs.calls_per_minute > 0
            ORDER BY pqs.last_seen DESC
            LIMIT $2"
        );

        let rows: Vec<TrainingRow> = sqlx::query_as(&sql)
            .bind(i32::try_from(lookback_days).unwrap_or(i32::MAX))
            .bind(i64::try_from(TRAINING_ROW_LIMIT).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(PredictorError::store)?;

        let data = TrainingData::from_rows(
            rows.into_iter()
                .map(|row| (row.features.to_features(), row.target.unwrap_or(f64::NAN))),
        )?;

        info!(
            samples = data.len(),
            features = FEATURE_NAMES.len(),
            lookback_days,
            "Extracted training data"
        );
        Ok(data)
    }

    async fn extract_features_for_query(&self, query_hash: i64) -> Result<Option<QueryMetrics>> {
        let sql = format!(
            "SELECT {FEATURE_COLUMNS}
            FROM metrics_pg_stats_query pqs
            WHERE pqs.query_hash = $1"
        );

        let row: Option<FeatureRow> = sqlx::query_as(&sql)
            .bind(query_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(PredictorError::store)?;

        if row.is_none() {
            warn!(query_hash, "Query not found");
        }
        Ok(row.map(|r| r.to_metrics()))
    }

    async fn save_model_metadata(&self, record: &ModelRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO query_performance_models
                (model_type, model_name, feature_names, training_sample_size, r_squared, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (model_name) DO UPDATE SET
                r_squared = EXCLUDED.r_squared,
                training_sample_size = EXCLUDED.training_sample_size,
                last_updated = NOW()
            ",
        )
        .bind(record.model_kind.as_metadata_name())
        .bind(&record.model_name)
        .bind(&record.feature_names)
        .bind(i64::try_from(record.training_sample_size).unwrap_or(i64::MAX))
        .bind(record.r_squared)
        .execute(&self.pool)
        .await
        .map_err(PredictorError::store)?;

        info!(
            model_name = %record.model_name,
            r_squared = record.r_squared,
            "Saved model metadata"
        );
        Ok(())
    }

    async fn latest_model(&self) -> Result<Option<StoredModel>> {
        let sql = format!(
            "SELECT {MODEL_COLUMNS}
            FROM query_performance_models
            ORDER BY created_at DESC
            LIMIT 1"
        );

        let row: Option<ModelRow> = sqlx::query_as(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(PredictorError::store)?;

        row.map(StoredModel::try_from).transpose()
    }

    async fn list_models(&self, limit: usize) -> Result<Vec<StoredModel>> {
        let sql = format!(
            "SELECT {MODEL_COLUMNS}
            FROM query_performance_models
            ORDER BY created_at DESC
            LIMIT $1"
        );

        let rows: Vec<ModelRow> = sqlx::query_as(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(PredictorError::store)?;

        rows.into_iter().map(StoredModel::try_from).collect()
    }
}
