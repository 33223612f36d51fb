//! Manager feedback on ranked solutions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::solution::{CandidateSolution, Strategy};
use crate::{Error, Result};

/// What happened when the solution was put into practice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ImplementationOutcome {
    Success,
    Partial,
    Failed,
}

/// Inbound feedback as submitted by a manager
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackSubmission {
    pub execution_id: Uuid,
    pub solution_id: Uuid,
    #[serde(default)]
    pub manager_id: Option<String>,
    pub accepted: bool,
    pub rating: u8,
    pub outcome: ImplementationOutcome,
    #[serde(default)]
    pub context: serde_json::Value,
}

/// Append-only stored feedback, carrying a snapshot of the rated candidate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub solution_id: Uuid,
    pub manager_id: Option<String>,
    pub strategy: Strategy,
    pub feasibility: f64,
    pub complexity: f64,
    pub preserves_deadline: bool,
    pub accepted: bool,
    pub rating: u8,
    pub outcome: ImplementationOutcome,
    pub effectiveness: f64,
    pub context: serde_json::Value,
    /// Weights version the solution was ranked under
    pub weights_version: u64,
    pub submitted_at: DateTime<Utc>,
}

/// Which feedback the pattern analyzer should look at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackScope {
    Global,
    Manager(String),
}

impl FeedbackScope {
    pub fn matches(&self, record: &FeedbackRecord) -> bool {
        match self {
            FeedbackScope::Global => true,
            FeedbackScope::Manager(id) => record.manager_id.as_deref() == Some(id.as_str()),
        }
    }
}

impl FeedbackSubmission {
    pub fn validate(&self) -> Result<()> {
        if !(1..=5).contains(&self.rating) {
            return Err(Error::validation(format!(
                "Rating must be between 1 and 5, got {}",
                self.rating
            )));
        }
        if let Some(manager) = &self.manager_id {
            if manager.trim().is_empty() {
                return Err(Error::validation("Manager id cannot be blank"));
            }
        }
        Ok(())
    }
}

/// Effectiveness in [0, 1] derived from acceptance, outcome and rating
pub fn effectiveness(accepted: bool, outcome: ImplementationOutcome, rating: u8) -> f64 {
    let normalized = f64::from(rating.min(5)) / 5.0;
    match (accepted, outcome) {
        (true, ImplementationOutcome::Success) => normalized,
        (true, ImplementationOutcome::Partial) => 0.7 * normalized,
        _ => 0.0,
    }
}

impl FeedbackRecord {
    /// Build the stored record for a validated submission against a ranked candidate
    pub fn from_submission(
        submission: &FeedbackSubmission,
        solution: &CandidateSolution,
        weights_version: u64,
    ) -> Result<Self> {
        submission.validate()?;
        if submission.solution_id != solution.id {
            return Err(Error::validation("Submission does not reference the given solution"));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            execution_id: submission.execution_id,
            solution_id: submission.solution_id,
            manager_id: submission.manager_id.clone(),
            strategy: solution.strategy,
            feasibility: solution.feasibility,
            complexity: solution.complexity,
            preserves_deadline: solution.preserves_deadline,
            accepted: submission.accepted,
            rating: submission.rating,
            outcome: submission.outcome,
            effectiveness: effectiveness(submission.accepted, submission.outcome, submission.rating),
            context: submission.context.clone(),
            weights_version,
            submitted_at: Utc::now(),
        })
    }
}
