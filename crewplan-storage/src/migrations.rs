//! Embedded schema migrations

use sqlx::migrate::Migrator;
use sqlx::SqlitePool;
use tracing::info;

use crate::{Error, Result};

/// Migrations under `crewplan-storage/migrations`, embedded at compile time
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Apply pending migrations. A database carrying migrations this build does
/// not know is rejected.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations");

    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| Error::Migration(e.to_string()))?;

    info!(version = latest_version(), "Database migrations completed successfully");
    Ok(())
}

/// Highest migration version shipped with this build
pub fn latest_version() -> i64 {
    MIGRATOR.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Highest successfully applied migration, `None` before the first run
pub async fn applied_version(pool: &SqlitePool) -> Result<Option<i64>> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if tracked == 0 {
        return Ok(None);
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;
    Ok(version)
}
