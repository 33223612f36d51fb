//! Run state repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;
use uuid::Uuid;

use crewplan_core::orchestration::RunState;
use crewplan_core::store::RunStore;

use super::parse_timestamp;
use crate::{Error, Result};

const TABLE: &str = "runs";

/// Listing entry for a stored execution
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoredRun {
    pub execution_id: Uuid,
    pub stage: String,
    pub iterations: u32,
    pub updated_at: DateTime<Utc>,
}

/// Repository holding the latest resting state of each execution
pub struct RunRepository {
    pool: Pool<Sqlite>,
}

impl RunRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Insert or replace the stored state of an execution
    pub async fn upsert(&self, state: &RunState) -> Result<()> {
        let body = serde_json::to_string(state)?;
        sqlx::query(
            r#"
            INSERT INTO runs (execution_id, stage, iterations, state, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (execution_id) DO UPDATE SET
                stage = excluded.stage,
                iterations = excluded.iterations,
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(state.execution_id.to_string())
        .bind(state.stage.as_str())
        .bind(state.iterations as i64)
        .bind(body)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(execution_id = %state.execution_id, stage = %state.stage, "Stored run state");
        Ok(())
    }

    pub async fn find(&self, execution_id: Uuid) -> Result<Option<RunState>> {
        let row = sqlx::query("SELECT state FROM runs WHERE execution_id = ?")
            .bind(execution_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let body: String = row.try_get("state")?;
        let state: RunState = serde_json::from_str(&body)
            .map_err(|e| Error::corrupt(TABLE, format!("execution {}: {}", execution_id, e)))?;
        if state.execution_id != execution_id {
            return Err(Error::corrupt(
                TABLE,
                format!("row {} holds execution {}", execution_id, state.execution_id),
            ));
        }
        Ok(Some(state))
    }

    /// Most recently updated executions first
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<StoredRun>> {
        let rows = sqlx::query(
            "SELECT execution_id, stage, iterations, updated_at FROM runs ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_stored_run).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM runs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn row_to_stored_run(row: SqliteRow) -> Result<StoredRun> {
    let id: String = row.try_get("execution_id")?;
    let execution_id =
        Uuid::parse_str(&id).map_err(|e| Error::corrupt(TABLE, format!("bad execution id '{}': {}", id, e)))?;
    let iterations: i64 = row.try_get("iterations")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(StoredRun {
        execution_id,
        stage: row.try_get("stage")?,
        iterations: u32::try_from(iterations)
            .map_err(|_| Error::corrupt(TABLE, format!("bad iteration count {}", iterations)))?,
        updated_at: parse_timestamp(TABLE, &updated_at)?,
    })
}

#[async_trait]
impl RunStore for RunRepository {
    async fn save(&self, state: &RunState) -> crewplan_core::Result<()> {
        Ok(self.upsert(state).await?)
    }

    async fn load(&self, execution_id: Uuid) -> crewplan_core::Result<Option<RunState>> {
        Ok(self.find(execution_id).await?)
    }
}
