//! Feedback repository implementation

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use tracing::debug;
use uuid::Uuid;

use crewplan_core::feedback::{FeedbackRecord, FeedbackScope, ImplementationOutcome};
use crewplan_core::settings::DedupPolicy;
use crewplan_core::solution::Strategy;
use crewplan_core::store::FeedbackStore;

use super::parse_timestamp;
use crate::{Error, Result};

const TABLE: &str = "feedback";

/// Append-only feedback log
pub struct FeedbackRepository {
    pool: Pool<Sqlite>,
    policy: DedupPolicy,
}

impl FeedbackRepository {
    /// Create a new feedback repository
    pub fn new(pool: Pool<Sqlite>, policy: DedupPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    /// Insert a record. Returns `false` when first-wins dedup ignored it.
    pub async fn insert(&self, record: &FeedbackRecord) -> Result<bool> {
        let context = serde_json::to_string(&record.context)?;
        let statement = match self.policy {
            DedupPolicy::FirstWins => {
                r#"
                INSERT OR IGNORE INTO feedback (
                    id, execution_id, solution_id, revision, manager_id, strategy,
                    feasibility, complexity, preserves_deadline, accepted, rating,
                    outcome, effectiveness, context, weights_version, submitted_at
                ) VALUES (?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#
            }
            DedupPolicy::AllowDuplicates => {
                r#"
                INSERT INTO feedback (
                    id, execution_id, solution_id, revision, manager_id, strategy,
                    feasibility, complexity, preserves_deadline, accepted, rating,
                    outcome, effectiveness, context, weights_version, submitted_at
                ) VALUES (
                    ?1, ?2, ?3,
                    (SELECT COALESCE(MAX(revision) + 1, 0) FROM feedback
                     WHERE execution_id = ?2 AND solution_id = ?3),
                    ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15
                )
                "#
            }
        };

        let result = sqlx::query(statement)
            .bind(record.id.to_string())
            .bind(record.execution_id.to_string())
            .bind(record.solution_id.to_string())
            .bind(&record.manager_id)
            .bind(record.strategy.as_str())
            .bind(record.feasibility)
            .bind(record.complexity)
            .bind(record.preserves_deadline)
            .bind(record.accepted)
            .bind(i64::from(record.rating))
            .bind(outcome_to_string(record.outcome))
            .bind(record.effectiveness)
            .bind(context)
            .bind(record.weights_version as i64)
            .bind(record.submitted_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        let inserted = result.rows_affected() > 0;
        debug!(
            execution_id = %record.execution_id,
            solution_id = %record.solution_id,
            inserted,
            "Stored feedback"
        );
        Ok(inserted)
    }

    /// First stored record for an (execution, solution) pair
    pub async fn find_first(&self, execution_id: Uuid, solution_id: Uuid) -> Result<Option<FeedbackRecord>> {
        let row = sqlx::query(
            "SELECT * FROM feedback WHERE execution_id = ? AND solution_id = ? ORDER BY revision ASC LIMIT 1",
        )
        .bind(execution_id.to_string())
        .bind(solution_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| self.row_to_record(row)).transpose()
    }

    /// Records in submission order
    pub async fn list_all(&self) -> Result<Vec<FeedbackRecord>> {
        let rows = sqlx::query("SELECT * FROM feedback ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|row| self.row_to_record(row)).collect()
    }

    /// One manager's records in submission order
    pub async fn list_by_manager(&self, manager_id: &str) -> Result<Vec<FeedbackRecord>> {
        let rows = sqlx::query("SELECT * FROM feedback WHERE manager_id = ? ORDER BY seq ASC")
            .bind(manager_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|row| self.row_to_record(row)).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    fn row_to_record(&self, row: SqliteRow) -> Result<FeedbackRecord> {
        let id: String = row.try_get("id")?;
        let execution_id: String = row.try_get("execution_id")?;
        let solution_id: String = row.try_get("solution_id")?;
        let strategy: String = row.try_get("strategy")?;
        let rating: i64 = row.try_get("rating")?;
        let outcome: String = row.try_get("outcome")?;
        let context: String = row.try_get("context")?;
        let weights_version: i64 = row.try_get("weights_version")?;
        let submitted_at: String = row.try_get("submitted_at")?;

        Ok(FeedbackRecord {
            id: parse_uuid(&id)?,
            execution_id: parse_uuid(&execution_id)?,
            solution_id: parse_uuid(&solution_id)?,
            manager_id: row.try_get("manager_id")?,
            strategy: Strategy::from_tag(&strategy),
            feasibility: row.try_get("feasibility")?,
            complexity: row.try_get("complexity")?,
            preserves_deadline: row.try_get("preserves_deadline")?,
            accepted: row.try_get("accepted")?,
            rating: u8::try_from(rating)
                .map_err(|_| Error::corrupt(TABLE, format!("rating {} out of range", rating)))?,
            outcome: outcome_from_string(&outcome)?,
            effectiveness: row.try_get("effectiveness")?,
            context: serde_json::from_str(&context)?,
            weights_version: u64::try_from(weights_version)
                .map_err(|_| Error::corrupt(TABLE, format!("negative weights version {}", weights_version)))?,
            submitted_at: parse_timestamp(TABLE, &submitted_at)?,
        })
    }
}

#[async_trait]
impl FeedbackStore for FeedbackRepository {
    async fn append(&self, record: &FeedbackRecord) -> crewplan_core::Result<bool> {
        Ok(self.insert(record).await?)
    }

    async fn find(&self, execution_id: Uuid, solution_id: Uuid) -> crewplan_core::Result<Option<FeedbackRecord>> {
        Ok(self.find_first(execution_id, solution_id).await?)
    }

    async fn list(&self, scope: &FeedbackScope) -> crewplan_core::Result<Vec<FeedbackRecord>> {
        let records = match scope {
            FeedbackScope::Global => self.list_all().await?,
            FeedbackScope::Manager(id) => self.list_by_manager(id).await?,
        };
        Ok(records)
    }
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::corrupt(TABLE, format!("bad uuid '{}': {}", value, e)))
}

fn outcome_to_string(outcome: ImplementationOutcome) -> &'static str {
    match outcome {
        ImplementationOutcome::Success => "success",
        ImplementationOutcome::Partial => "partial",
        ImplementationOutcome::Failed => "failed",
    }
}

fn outcome_from_string(value: &str) -> Result<ImplementationOutcome> {
    match value {
        "success" => Ok(ImplementationOutcome::Success),
        "partial" => Ok(ImplementationOutcome::Partial),
        "failed" => Ok(ImplementationOutcome::Failed),
        other => Err(Error::corrupt(TABLE, format!("unknown outcome '{}'", other))),
    }
}
