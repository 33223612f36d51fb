//! Overallocation conflicts and their summary metrics

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Severity of an overallocation, ordered from least to most severe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Classify an overallocation ratio `(allocated - capacity) / capacity`
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 1.0 {
            Severity::Critical
        } else if ratio >= 0.5 {
            Severity::High
        } else if ratio >= 0.25 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One assignment's share of a conflicting day
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskInvolvement {
    pub assignment_id: String,
    pub project_id: String,
    pub task_id: String,
    pub task_name: String,
    pub hours: f64,
    pub on_critical_path: bool,
    pub slack_days: i64,
}

/// A resource allocated beyond capacity on one date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conflict {
    /// `<resource_id>:<date>`
    pub id: String,
    pub resource_id: String,
    pub resource_name: String,
    pub role: String,
    pub date: NaiveDate,
    pub allocated_hours: f64,
    pub capacity_hours: f64,
    pub overallocation_hours: f64,
    pub overallocation_ratio: f64,
    pub severity: Severity,
    pub tasks: Vec<TaskInvolvement>,
    pub project_ids: BTreeSet<String>,
}

impl Conflict {
    pub fn make_id(resource_id: &str, date: NaiveDate) -> String {
        format!("{}:{}", resource_id, date)
    }

    pub fn overallocation_percent(&self) -> f64 {
        self.overallocation_ratio * 100.0
    }

    /// Tasks that could move without touching the critical path
    pub fn flexible_tasks(&self) -> impl Iterator<Item = &TaskInvolvement> {
        self.tasks.iter().filter(|t| !t.on_critical_path)
    }
}

/// Aggregate view of a conflict set, used for run statistics and simulations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConflictMetrics {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total_overallocation_hours: f64,
    pub affected_resources: usize,
}

impl ConflictMetrics {
    pub fn from_conflicts(conflicts: &[Conflict]) -> Self {
        let mut by_severity: BTreeMap<Severity, usize> = BTreeMap::new();
        let mut resources = BTreeSet::new();
        let mut hours = 0.0;
        for conflict in conflicts {
            *by_severity.entry(conflict.severity).or_default() += 1;
            resources.insert(conflict.resource_id.as_str());
            hours += conflict.overallocation_hours;
        }
        let count = |s: Severity| by_severity.get(&s).copied().unwrap_or(0);

        Self {
            total: conflicts.len(),
            critical: count(Severity::Critical),
            high: count(Severity::High),
            medium: count(Severity::Medium),
            low: count(Severity::Low),
            total_overallocation_hours: hours,
            affected_resources: resources.len(),
        }
    }
}
