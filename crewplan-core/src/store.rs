//! Seams to durable storage and outbound collaborators
//!
//! The pipeline only talks to these traits. In-memory implementations are
//! provided here for tests and offline runs; the storage crate provides the
//! SQLite-backed ones.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::calendar::DateRange;
use crate::feedback::{FeedbackRecord, FeedbackScope};
use crate::orchestration::{AnalysisSummary, RunState};
use crate::resource::AllocationSnapshot;
use crate::settings::DedupPolicy;
use crate::weights::WeightSnapshot;
use crate::Result;

/// Durable, append-only feedback log
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Append a record. Returns `false` when the dedup policy ignored it.
    async fn append(&self, record: &FeedbackRecord) -> Result<bool>;

    /// Previously stored record for an (execution, solution) pair
    async fn find(&self, execution_id: Uuid, solution_id: Uuid) -> Result<Option<FeedbackRecord>>;

    /// Records in submission order
    async fn list(&self, scope: &FeedbackScope) -> Result<Vec<FeedbackRecord>>;
}

/// Durable log of published ranking weight versions
#[async_trait]
pub trait WeightHistory: Send + Sync {
    async fn save(&self, snapshot: &WeightSnapshot) -> Result<()>;

    async fn latest(&self) -> Result<Option<WeightSnapshot>>;

    /// Every snapshot, oldest first
    async fn all(&self) -> Result<Vec<WeightSnapshot>>;
}

/// Durable copy of each execution's state, written whenever a run comes to rest
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or replace the state of `state.execution_id`
    async fn save(&self, state: &RunState) -> Result<()>;

    async fn load(&self, execution_id: Uuid) -> Result<Option<RunState>>;
}

/// Provides allocation data for the requested projects
#[async_trait]
pub trait AllocationSource: Send + Sync {
    async fn load(&self, project_ids: &[String], range: Option<DateRange>) -> Result<AllocationSnapshot>;
}

/// Completion notification sent after an analysis pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionNotice {
    pub callback_url: String,
    pub summary: AnalysisSummary,
}

#[async_trait]
pub trait CallbackNotifier: Send + Sync {
    async fn notify(&self, notice: &CompletionNotice) -> Result<()>;
}

/// In-memory feedback store honouring a dedup policy
#[derive(Debug, Clone)]
pub struct InMemoryFeedbackStore {
    policy: DedupPolicy,
    records: Arc<RwLock<Vec<FeedbackRecord>>>,
    seen: Arc<RwLock<HashSet<(Uuid, Uuid)>>>,
}

impl InMemoryFeedbackStore {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            policy,
            records: Arc::new(RwLock::new(Vec::new())),
            seen: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Default for InMemoryFeedbackStore {
    fn default() -> Self {
        Self::new(DedupPolicy::FirstWins)
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn append(&self, record: &FeedbackRecord) -> Result<bool> {
        let key = (record.execution_id, record.solution_id);
        // Both locks are taken together so a concurrent append of the same pair sees one winner
        let mut seen = self.seen.write();
        let mut records = self.records.write();
        let first = seen.insert(key);
        if !first && self.policy == DedupPolicy::FirstWins {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn find(&self, execution_id: Uuid, solution_id: Uuid) -> Result<Option<FeedbackRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .find(|r| r.execution_id == execution_id && r.solution_id == solution_id)
            .cloned())
    }

    async fn list(&self, scope: &FeedbackScope) -> Result<Vec<FeedbackRecord>> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| scope.matches(r))
            .cloned()
            .collect())
    }
}

/// In-memory weight history
#[derive(Debug, Clone, Default)]
pub struct InMemoryWeightHistory {
    snapshots: Arc<RwLock<Vec<WeightSnapshot>>>,
}

impl InMemoryWeightHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WeightHistory for InMemoryWeightHistory {
    async fn save(&self, snapshot: &WeightSnapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write();
        if !snapshots.iter().any(|s| s.version == snapshot.version) {
            snapshots.push(snapshot.clone());
            snapshots.sort_by_key(|s| s.version);
        }
        Ok(())
    }

    async fn latest(&self) -> Result<Option<WeightSnapshot>> {
        Ok(self.snapshots.read().last().cloned())
    }

    async fn all(&self) -> Result<Vec<WeightSnapshot>> {
        Ok(self.snapshots.read().clone())
    }
}

/// In-memory run store
#[derive(Debug, Clone, Default)]
pub struct InMemoryRunStore {
    runs: Arc<RwLock<HashMap<Uuid, RunState>>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, state: &RunState) -> Result<()> {
        self.runs.write().insert(state.execution_id, state.clone());
        Ok(())
    }

    async fn load(&self, execution_id: Uuid) -> Result<Option<RunState>> {
        Ok(self.runs.read().get(&execution_id).cloned())
    }
}

/// Serves a fixed snapshot, scoped to the requested projects
#[derive(Debug, Clone)]
pub struct StaticAllocationSource {
    snapshot: AllocationSnapshot,
}

impl StaticAllocationSource {
    pub fn new(snapshot: AllocationSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl AllocationSource for StaticAllocationSource {
    async fn load(&self, project_ids: &[String], _range: Option<DateRange>) -> Result<AllocationSnapshot> {
        Ok(self.snapshot.scoped(project_ids))
    }
}

/// Notifier that drops every notice
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl CallbackNotifier for NoopNotifier {
    async fn notify(&self, _notice: &CompletionNotice) -> Result<()> {
        Ok(())
    }
}
