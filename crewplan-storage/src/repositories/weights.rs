//! Ranking weight history repository

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::info;

use crewplan_core::store::WeightHistory;
use crewplan_core::weights::{RankingWeights, WeightSnapshot};

use super::parse_timestamp;
use crate::{Error, Result};

const TABLE: &str = "weight_versions";

/// Repository for published weight versions
pub struct WeightRepository {
    pool: Pool<Sqlite>,
}

impl WeightRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Store a version. Re-saving an identical snapshot is a no-op; a different
    /// snapshot under an existing version is a conflict.
    pub async fn insert(&self, snapshot: &WeightSnapshot) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO weight_versions (
                version, feasibility, complexity, deadline, reason, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(snapshot.version as i64)
        .bind(snapshot.weights.feasibility)
        .bind(snapshot.weights.complexity)
        .bind(snapshot.weights.deadline)
        .bind(&snapshot.reason)
        .bind(snapshot.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let stored = self.find_version(snapshot.version).await?;
            if stored.map(|s| s.weights) != Some(snapshot.weights) {
                return Err(Error::Conflict(format!(
                    "weight version {} is already stored with different weights",
                    snapshot.version
                )));
            }
            return Ok(());
        }

        info!(version = snapshot.version, reason = %snapshot.reason, "Persisted ranking weights");
        Ok(())
    }

    pub async fn find_version(&self, version: u64) -> Result<Option<WeightSnapshot>> {
        let row = sqlx::query("SELECT * FROM weight_versions WHERE version = ?")
            .bind(version as i64)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_snapshot).transpose()
    }

    pub async fn find_latest(&self) -> Result<Option<WeightSnapshot>> {
        let row = sqlx::query("SELECT * FROM weight_versions ORDER BY version DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_snapshot).transpose()
    }

    pub async fn list(&self) -> Result<Vec<WeightSnapshot>> {
        let rows = sqlx::query("SELECT * FROM weight_versions ORDER BY version ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_snapshot).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM weight_versions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn row_to_snapshot(row: SqliteRow) -> Result<WeightSnapshot> {
    let version: i64 = row.try_get("version")?;
    let created_at: String = row.try_get("created_at")?;
    let weights = RankingWeights {
        feasibility: row.try_get("feasibility")?,
        complexity: row.try_get("complexity")?,
        deadline: row.try_get("deadline")?,
    };
    weights
        .validate()
        .map_err(|e| Error::corrupt(TABLE, format!("version {}: {}", version, e)))?;

    Ok(WeightSnapshot {
        version: u64::try_from(version)
            .map_err(|_| Error::corrupt(TABLE, format!("negative version {}", version)))?,
        weights,
        created_at: parse_timestamp(TABLE, &created_at)?,
        reason: row.try_get("reason")?,
    })
}

#[async_trait]
impl WeightHistory for WeightRepository {
    async fn save(&self, snapshot: &WeightSnapshot) -> crewplan_core::Result<()> {
        Ok(self.insert(snapshot).await?)
    }

    async fn latest(&self) -> crewplan_core::Result<Option<WeightSnapshot>> {
        Ok(self.find_latest().await?)
    }

    async fn all(&self) -> crewplan_core::Result<Vec<WeightSnapshot>> {
        Ok(self.list().await?)
    }
}
