//! Shared fixtures and stub collaborators for the crewplan-core test suite.
//!
//! This module provides:
//! - Allocation snapshot factories
//! - Deterministic proposal providers that count their calls
//! - Recording and failing completion notifiers
//! - An advisor factory with fast retry settings

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crewplan_core::pipeline::{ProposalProvider, ProposalRequest, RawProposal, RuleBasedProvider};
use crewplan_core::resource::{AllocationSnapshot, Assignment, Project, RawResource};
use crewplan_core::settings::{PipelineSettings, RetryPolicy};
use crewplan_core::store::{CallbackNotifier, CompletionNotice, StaticAllocationSource};
use crewplan_core::{AllocationAdvisor, Error, Result};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid test date")
}

pub fn assignment(id: &str, project: &str, resource: &str, day: &str, hours: f64) -> Assignment {
    Assignment::builder()
        .id(id)
        .project_id(project)
        .resource_id(resource)
        .task(format!("T-{}", id), format!("Task {}", id))
        .dates(date(day), date(day))
        .hours(hours)
        .slack_days(2)
        .build()
        .expect("valid test assignment")
}

/// R1 (capacity 8) has 5h on A and 6h on B on 2025-02-15; R2 is within capacity
pub fn single_conflict_snapshot() -> AllocationSnapshot {
    AllocationSnapshot {
        projects: vec![Project::new("A", "Tower"), Project::new("B", "Bridge")],
        resources: vec![
            RawResource::new("R1", "Ana Souza", "Carpenter", 8.0).with_email("ana@site.com"),
            RawResource::new("R2", "Bruno Lima", "Electrician", 8.0),
        ],
        assignments: vec![
            assignment("a1", "A", "R1", "2025-02-15", 5.0),
            assignment("b1", "B", "R1", "2025-02-15", 6.0),
            assignment("a2", "A", "R2", "2025-02-15", 4.0),
        ],
    }
}

/// Two conflicts for R1 on consecutive weekdays
pub fn two_conflict_snapshot() -> AllocationSnapshot {
    AllocationSnapshot {
        projects: vec![Project::new("A", "Tower"), Project::new("B", "Bridge")],
        resources: vec![RawResource::new("R1", "Ana Souza", "Carpenter", 8.0)],
        assignments: vec![
            assignment("a1", "A", "R1", "2025-02-17", 6.0),
            assignment("b1", "B", "R1", "2025-02-17", 6.0),
            assignment("a2", "A", "R1", "2025-02-18", 7.0),
            assignment("b2", "B", "R1", "2025-02-18", 7.0),
        ],
    }
}

pub fn quiet_snapshot() -> AllocationSnapshot {
    AllocationSnapshot {
        projects: vec![Project::new("A", "Tower")],
        resources: vec![RawResource::new("R1", "Ana Souza", "Carpenter", 8.0)],
        assignments: vec![assignment("a1", "A", "R1", "2025-02-17", 8.0)],
    }
}

/// Rule-based provider that counts its calls
#[derive(Default)]
pub struct CountingProvider {
    inner: RuleBasedProvider,
    pub calls: AtomicUsize,
}

impl CountingProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProposalProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    async fn propose(&self, request: &ProposalRequest) -> Result<Vec<RawProposal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.propose(request).await
    }
}

/// Provider whose answers are never usable
pub struct EmptyProvider;

#[async_trait]
impl ProposalProvider for EmptyProvider {
    fn name(&self) -> &str {
        "empty"
    }

    async fn propose(&self, _request: &ProposalRequest) -> Result<Vec<RawProposal>> {
        Ok(vec![RawProposal {
            strategy: Some("MOVE_NONCRITICAL".into()),
            feasibility: Some(2.0),
            ..RawProposal::default()
        }])
    }
}

/// Provider that is always down
pub struct DownProvider;

#[async_trait]
impl ProposalProvider for DownProvider {
    fn name(&self) -> &str {
        "down"
    }

    async fn propose(&self, _request: &ProposalRequest) -> Result<Vec<RawProposal>> {
        Err(Error::provider("down", "connection refused"))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<CompletionNotice>>,
}

#[async_trait]
impl CallbackNotifier for RecordingNotifier {
    async fn notify(&self, notice: &CompletionNotice) -> Result<()> {
        self.notices.lock().push(notice.clone());
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl CallbackNotifier for FailingNotifier {
    async fn notify(&self, _notice: &CompletionNotice) -> Result<()> {
        Err(Error::provider("callback", "503 Service Unavailable"))
    }
}

/// Default settings with millisecond retries
pub fn fast_settings() -> PipelineSettings {
    let mut settings = PipelineSettings::default();
    settings.generator.request_timeout_secs = 5;
    settings.generator.retry = RetryPolicy {
        max_attempts: 2,
        initial_delay_ms: 1,
        backoff_multiplier: 1.0,
        max_delay_ms: 1,
    };
    settings
}

pub async fn advisor_with(
    snapshot: AllocationSnapshot,
    provider: Arc<dyn ProposalProvider>,
) -> AllocationAdvisor {
    AllocationAdvisor::builder(fast_settings())
        .source(Arc::new(StaticAllocationSource::new(snapshot)))
        .provider(provider)
        .build()
        .await
        .expect("advisor builds")
}
