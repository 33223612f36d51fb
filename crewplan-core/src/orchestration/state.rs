//! Per-execution run state and the stage enumeration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::calendar::DateRange;
use crate::conflict::{Conflict, ConflictMetrics, Severity};
use crate::feedback::FeedbackRecord;
use crate::learning::{PatternReport, WeightAdjustment};
use crate::resource::{AllocationSnapshot, ConsolidatedResource};
use crate::solution::{CandidateSolution, ConflictRanking, RankedSolution, Strategy};
use crate::weights::WeightSnapshot;
use crate::{Error, Result};

/// Externally observable progress marker of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Consolidating,
    Detecting,
    Generating,
    Ranking,
    RankingComplete,
    NoConflictsDone,
    FeedbackReceived,
    PatternAnalysis,
    WeightAdjusted,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Consolidating => "consolidating",
            Stage::Detecting => "detecting",
            Stage::Generating => "generating",
            Stage::Ranking => "ranking",
            Stage::RankingComplete => "ranking_complete",
            Stage::NoConflictsDone => "no_conflicts_done",
            Stage::FeedbackReceived => "feedback_received",
            Stage::PatternAnalysis => "pattern_analysis",
            Stage::WeightAdjusted => "weight_adjusted",
            Stage::Done => "done",
        }
    }

    /// Stages where a pass has ended and the run waits for input
    pub fn is_resting(&self) -> bool {
        matches!(self, Stage::RankingComplete | Stage::NoConflictsDone | Stage::Done)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Degraded path taken during a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// The conflict received the default candidate
    FallbackCandidate { conflict_id: String, reason: String },
    /// A strategy had too few samples to emit a signal
    SkippedSignal {
        strategy: Strategy,
        samples: usize,
        required: usize,
    },
    /// A weight update could not be applied or persisted
    WeightUpdate { reason: String },
    /// The completion callback could not be delivered
    Callback { reason: String },
    /// The run state could not be written to the run store
    RunPersistence { reason: String },
}

/// Inbound start-analysis request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AnalysisRequest {
    #[serde(default)]
    pub project_ids: Vec<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl AnalysisRequest {
    pub fn validate(&self) -> Result<()> {
        if let Some(range) = &self.date_range {
            DateRange::new(range.start, range.end)?;
        }
        if self.project_ids.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::validation("Project ids cannot be blank"));
        }
        if let Some(url) = &self.callback_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::validation(format!("Callback url {} is not http(s)", url)));
            }
        }
        Ok(())
    }
}

/// Full state of one execution. Exactly one writer at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    pub execution_id: Uuid,
    pub stage: Stage,
    /// Number of learning-driven re-entries into detection
    pub iterations: u32,
    pub request: AnalysisRequest,
    pub snapshot: AllocationSnapshot,
    pub resources: Vec<ConsolidatedResource>,
    pub conflicts: Vec<Conflict>,
    pub candidates: Vec<CandidateSolution>,
    pub rankings: Vec<ConflictRanking>,
    pub feedback_history: Vec<FeedbackRecord>,
    pub weights: WeightSnapshot,
    pub patterns: Option<PatternReport>,
    pub last_adjustment: Option<WeightAdjustment>,
    /// Decision of the most recent feedback
    pub continued: bool,
    pub degradations: Vec<Degradation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(
        execution_id: Uuid,
        request: AnalysisRequest,
        snapshot: AllocationSnapshot,
        weights: WeightSnapshot,
    ) -> Self {
        let now = Utc::now();
        Self {
            execution_id,
            stage: Stage::Consolidating,
            iterations: 0,
            request,
            snapshot,
            resources: Vec::new(),
            conflicts: Vec::new(),
            candidates: Vec::new(),
            rankings: Vec::new(),
            feedback_history: Vec::new(),
            weights,
            patterns: None,
            last_adjustment: None,
            continued: false,
            degradations: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next` if the graph allows it
    pub fn transition(&mut self, next: Stage) -> Result<()> {
        if !super::graph::can_transition(self.stage, next) {
            return Err(Error::state_transition(format!(
                "Cannot move execution {} from {} to {}",
                self.execution_id, self.stage, next
            )));
        }
        if self.stage == Stage::WeightAdjusted && next == Stage::Detecting {
            self.iterations += 1;
        }
        self.stage = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Ranked solution with the given id, if this run ranked it
    pub fn find_ranked(&self, solution_id: Uuid) -> Option<&RankedSolution> {
        self.rankings
            .iter()
            .flat_map(|r| r.solutions.iter())
            .find(|r| r.solution.id == solution_id)
    }

    /// Conflicts that have no candidate yet
    pub fn conflicts_without_candidates(&self) -> Vec<Conflict> {
        self.conflicts
            .iter()
            .filter(|c| !self.candidates.iter().any(|s| s.conflict_id == c.id))
            .cloned()
            .collect()
    }

    pub fn solution_count(&self) -> usize {
        self.rankings.iter().map(|r| r.solutions.len()).sum()
    }

    pub fn critical_conflicts(&self) -> usize {
        self.conflicts
            .iter()
            .filter(|c| c.severity == Severity::Critical)
            .count()
    }

    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            execution_id: self.execution_id,
            stage: self.stage,
            conflict_count: self.conflicts.len(),
            critical_conflicts: self.critical_conflicts(),
            solution_count: self.solution_count(),
            iterations: self.iterations,
            weights_version: self.weights.version,
        }
    }

    pub fn status(&self) -> RunStatus {
        RunStatus {
            execution_id: self.execution_id,
            stage: self.stage,
            iterations: self.iterations,
            metrics: ConflictMetrics::from_conflicts(&self.conflicts),
            conflicts: self.conflicts.clone(),
            rankings: self.rankings.clone(),
            feedback_history: self.feedback_history.clone(),
            degradations: self.degradations.clone(),
            weights: self.weights.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Response to start-analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisSummary {
    pub execution_id: Uuid,
    pub stage: Stage,
    pub conflict_count: usize,
    pub critical_conflicts: usize,
    pub solution_count: usize,
    pub iterations: u32,
    pub weights_version: u64,
}

/// Response to a status query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunStatus {
    pub execution_id: Uuid,
    pub stage: Stage,
    pub iterations: u32,
    pub metrics: ConflictMetrics,
    pub conflicts: Vec<Conflict>,
    pub rankings: Vec<ConflictRanking>,
    pub feedback_history: Vec<FeedbackRecord>,
    pub degradations: Vec<Degradation>,
    pub weights: WeightSnapshot,
    pub updated_at: DateTime<Utc>,
}

/// Response to a feedback submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackResponse {
    /// The collector's decision for this feedback
    pub continued: bool,
    /// Whether the run actually re-entered detection
    pub reentered: bool,
    /// The submission repeated an already recorded (execution, solution) pair
    pub duplicate: bool,
    pub stage: Stage,
    pub iterations: u32,
    pub weights_version: u64,
}
