//! Query performance predictor CLI.
//!
//! Trains execution time models from the metrics database, serves
//! predictions for known queries and validates them against observed times.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use database::PgMetricsStore;
use ml_model::ModelKind;
use tracing_subscriber::EnvFilter;

mod commands;

/// Query performance predictor
#[derive(Parser)]
#[command(name = "query-perf")]
#[command(about = "Predicts database query execution times from historical metrics")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model on recent query metrics
    Train {
        /// Algorithm: linear, tree or forest (defaults to MODEL_TYPE)
        #[arg(short, long)]
        model_type: Option<ModelKind>,

        /// Days of history to train on (defaults to LOOKBACK_DAYS)
        #[arg(short, long)]
        lookback_days: Option<u32>,
    },

    /// Predict the execution time of a known query
    Predict {
        /// Query hash as stored in the metrics database
        #[arg(short, long, allow_hyphen_values = true)]
        query_hash: i64,

        /// Path to a saved model bundle
        #[arg(short, long)]
        model: PathBuf,
    },

    /// Compare a prediction with the observed execution time
    Validate {
        /// Identifier of the prediction being validated
        #[arg(short, long)]
        prediction_id: String,

        /// Query hash the prediction was made for
        #[arg(short, long, allow_hyphen_values = true)]
        query_hash: i64,

        /// Predicted execution time in milliseconds
        #[arg(long)]
        predicted_ms: f64,

        /// Observed execution time in milliseconds
        #[arg(long)]
        actual_ms: f64,

        /// Name of the model that produced the prediction
        #[arg(long, default_value = "unknown")]
        model_version: String,
    },

    /// Score a saved model against recent query metrics
    Evaluate {
        /// Path to a saved model bundle
        #[arg(short, long)]
        model: PathBuf,

        /// Days of history to evaluate on (defaults to LOOKBACK_DAYS)
        #[arg(short, long)]
        lookback_days: Option<u32>,
    },

    /// List stored model metadata
    Models {
        /// Maximum number of models to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Initialize tracing subscriber
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&config.log_level).context("Invalid LOG_LEVEL")?
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = PgMetricsStore::connect(&config.database_url, config.db_pool_size).await?;

    match cli.command {
        Commands::Train {
            model_type,
            lookback_days,
        } => {
            commands::train::run(&config, &store, model_type, lookback_days).await?;
        }
        Commands::Predict { query_hash, model } => {
            commands::predict::run(&store, &model, query_hash).await?;
        }
        Commands::Validate {
            prediction_id,
            query_hash,
            predicted_ms,
            actual_ms,
            model_version,
        } => {
            let params = query_perf::jobs::ValidationParams {
                prediction_id,
                query_hash,
                predicted_ms,
                actual_ms,
                model_version,
            };
            commands::validate::run(&config, &store, params).await?;
        }
        Commands::Evaluate {
            model,
            lookback_days,
        } => {
            let lookback_days = lookback_days.unwrap_or(config.lookback_days);
            commands::evaluate::run(&store, &model, lookback_days).await?;
        }
        Commands::Models { limit } => {
            commands::models::run(&store, limit).await?;
        }
    }

    store.close().await;
    Ok(())
}
