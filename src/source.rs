//! Allocation data loaded from a JSON snapshot file

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crewplan_core::calendar::DateRange;
use crewplan_core::resource::AllocationSnapshot;
use crewplan_core::store::{AllocationSource, StaticAllocationSource};
use crewplan_core::{Error, Result};

/// Re-reads the file on every load so edits are picked up between runs
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub async fn read_snapshot(&self) -> Result<AllocationSnapshot> {
        read_snapshot(&self.path).await
    }
}

/// Parse an allocation snapshot file
pub async fn read_snapshot(path: &Path) -> Result<AllocationSnapshot> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        Error::not_found("Snapshot file", format!("{} ({})", path.display(), e))
    })?;
    let snapshot: AllocationSnapshot = serde_json::from_str(&content)
        .map_err(|e| Error::validation(format!("Invalid snapshot {}: {}", path.display(), e)))?;
    debug!(
        path = %path.display(),
        projects = snapshot.projects.len(),
        resources = snapshot.resources.len(),
        assignments = snapshot.assignments.len(),
        "Loaded allocation snapshot"
    );
    Ok(snapshot)
}

#[async_trait]
impl AllocationSource for JsonFileSource {
    async fn load(&self, project_ids: &[String], range: Option<DateRange>) -> Result<AllocationSnapshot> {
        let snapshot = self.read_snapshot().await?;
        StaticAllocationSource::new(snapshot).load(project_ids, range).await
    }
}
