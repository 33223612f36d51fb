//! Storage manager owning the SQLite pool and the repositories

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crewplan_core::settings::DedupPolicy;

use crate::repositories::{FeedbackRepository, RunRepository, WeightRepository};
use crate::{migrations, Result};

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    pub migrate_on_startup: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://crewplan.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
            migrate_on_startup: true,
        }
    }
}

impl DatabaseConfig {
    pub fn for_path(path: &std::path::Path) -> Self {
        Self {
            url: format!("sqlite://{}", path.display()),
            ..Self::default()
        }
    }
}

/// Main storage manager coordinating the repositories
pub struct StorageManager {
    pool: Pool<Sqlite>,
    feedback: Arc<FeedbackRepository>,
    weights: Arc<WeightRepository>,
    runs: Arc<RunRepository>,
}

impl StorageManager {
    /// Connect, migrate when configured, and build the repositories
    pub async fn new(config: &DatabaseConfig, dedup: DedupPolicy) -> Result<Self> {
        info!(url = %config.url, "Connecting to database");

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        info!("Database connection established");

        if config.migrate_on_startup {
            migrations::run_migrations(&pool).await?;
        }

        let feedback = Arc::new(FeedbackRepository::new(pool.clone(), dedup));
        let weights = Arc::new(WeightRepository::new(pool.clone()));
        let runs = Arc::new(RunRepository::new(pool.clone()));

        Ok(Self {
            pool,
            feedback,
            weights,
            runs,
        })
    }

    /// Get feedback repository
    pub fn feedback(&self) -> Arc<FeedbackRepository> {
        self.feedback.clone()
    }

    /// Get weight history repository
    pub fn weights(&self) -> Arc<WeightRepository> {
        self.weights.clone()
    }

    /// Get run state repository
    pub fn runs(&self) -> Arc<RunRepository> {
        self.runs.clone()
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Get database statistics
    pub async fn stats(&self) -> Result<DatabaseStats> {
        Ok(DatabaseStats {
            feedback_count: self.feedback.count().await?,
            weight_versions: self.weights.count().await?,
            stored_runs: self.runs.count().await?,
            schema_version: migrations::applied_version(&self.pool).await?,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseStats {
    pub feedback_count: i64,
    pub weight_versions: i64,
    pub stored_runs: i64,
    pub schema_version: Option<i64>,
}
