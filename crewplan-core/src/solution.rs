//! Candidate remediation proposals and their ranked form

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{Error, Result};

/// Longest description kept on a candidate, in characters
pub const MAX_DESCRIPTION_CHARS: usize = 150;

/// Closed set of remediation strategies.
///
/// Declaration order is the ranking tie-break order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    RedistributeWithSlack,
    MoveNoncritical,
    ExtendDuration,
    #[serde(other)]
    Unknown,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::RedistributeWithSlack,
        Strategy::MoveNoncritical,
        Strategy::ExtendDuration,
        Strategy::Unknown,
    ];

    /// Parse a provider tag; anything outside the known set is `Unknown`
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "REDISTRIBUTE_WITH_SLACK" => Strategy::RedistributeWithSlack,
            "MOVE_NONCRITICAL" | "MOVE_NON_CRITICAL" => Strategy::MoveNoncritical,
            "EXTEND_DURATION" => Strategy::ExtendDuration,
            _ => Strategy::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RedistributeWithSlack => "REDISTRIBUTE_WITH_SLACK",
            Strategy::MoveNoncritical => "MOVE_NONCRITICAL",
            Strategy::ExtendDuration => "EXTEND_DURATION",
            Strategy::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a candidate came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    Provider,
    Fallback,
}

/// Expected side effects of applying a candidate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ImpactAnalysis {
    #[serde(default)]
    pub affected_tasks: Vec<String>,
    #[serde(default)]
    pub days_impact: i64,
    #[serde(default)]
    pub resources_needed: u32,
}

/// Validated remediation proposal for one conflict
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateSolution {
    pub id: Uuid,
    pub conflict_id: String,
    pub strategy: Strategy,
    pub description: String,
    pub reasoning: String,
    pub feasibility: f64,
    pub complexity: f64,
    pub preserves_deadline: bool,
    pub impact: ImpactAnalysis,
    pub origin: CandidateOrigin,
}

impl CandidateSolution {
    /// Create a candidate, checking score ranges and trimming the description
    pub fn new<S: Into<String>>(
        conflict_id: S,
        strategy: Strategy,
        description: &str,
        reasoning: &str,
        feasibility: f64,
        complexity: f64,
        preserves_deadline: bool,
    ) -> Result<Self> {
        Self::validate_score("feasibility", feasibility)?;
        Self::validate_score("complexity", complexity)?;
        if description.trim().is_empty() {
            return Err(Error::validation("Candidate description cannot be empty"));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            conflict_id: conflict_id.into(),
            strategy,
            description: truncate_chars(description.trim(), MAX_DESCRIPTION_CHARS),
            reasoning: reasoning.trim().to_string(),
            feasibility,
            complexity,
            preserves_deadline,
            impact: ImpactAnalysis::default(),
            origin: CandidateOrigin::Provider,
        })
    }

    /// Default candidate used when nothing usable came back for a conflict
    pub fn fallback<S: Into<String>>(conflict_id: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            conflict_id: conflict_id.into(),
            strategy: Strategy::Unknown,
            description: "Manual review required: no usable remediation was proposed".to_string(),
            reasoning: "Fallback candidate".to_string(),
            feasibility: 0.0,
            complexity: 1.0,
            preserves_deadline: false,
            impact: ImpactAnalysis::default(),
            origin: CandidateOrigin::Fallback,
        }
    }

    pub fn with_impact(mut self, impact: ImpactAnalysis) -> Self {
        self.impact = impact;
        self
    }

    pub fn is_fallback(&self) -> bool {
        self.origin == CandidateOrigin::Fallback
    }

    fn validate_score(name: &str, value: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&value) {
            return Err(Error::validation(format!(
                "Candidate {} score {} is outside [0, 1]",
                name, value
            )));
        }
        Ok(())
    }
}

/// Cut a string to at most `max` characters without splitting a character
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

/// Candidate with its score under a specific weights version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedSolution {
    pub solution: CandidateSolution,
    pub rank_score: f64,
    /// 1-based position within its conflict
    pub rank: usize,
    pub weights_version: u64,
}

/// Ordered candidates for one conflict
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictRanking {
    pub conflict_id: String,
    pub solutions: Vec<RankedSolution>,
}

impl ConflictRanking {
    pub fn best(&self) -> Option<&RankedSolution> {
        self.solutions.first()
    }
}
