//! What-if scenarios over an allocation snapshot
//!
//! A simulation detects conflicts on the supplied snapshot, applies the
//! scenario, detects again and compares the two conflict sets.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::calendar::{shift_date, DateRange};
use crate::conflict::{Conflict, ConflictMetrics, Severity};
use crate::pipeline::detector::sort_conflicts;
use crate::pipeline::{consolidate, detect_conflicts};
use crate::resource::{AllocationSnapshot, Assignment};
use crate::{Error, Result};

/// Largest delay, in either direction, a delay_project scenario accepts
pub const MAX_DELAY_DAYS: i64 = 3650;

fn default_capacity() -> f64 {
    8.0
}

fn full_availability() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scenario {
    /// A helper of `role` with `capacity × availability` hours per day
    AddResource {
        role: String,
        #[serde(default = "default_capacity")]
        capacity_hours_per_day: f64,
        #[serde(default = "full_availability")]
        availability: f64,
    },
    /// Shift every assignment of the project by `days` calendar days
    DelayProject { project_id: String, days: i64 },
    /// Push colliding work of other projects past the project's assignments
    PrioritizeProject { project_id: String },
}

impl Scenario {
    /// Build a scenario from its kind and a JSON object of parameters
    pub fn from_parts(kind: &str, params: serde_json::Value) -> Result<Self> {
        let mut object = match params {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            _ => return Err(Error::validation("Scenario parameters must be a JSON object")),
        };
        object.insert("kind".to_string(), serde_json::Value::String(kind.to_string()));
        serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| Error::validation(format!("Invalid {} scenario: {}", kind, e)))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Scenario::AddResource { .. } => "add_resource",
            Scenario::DelayProject { .. } => "delay_project",
            Scenario::PrioritizeProject { .. } => "prioritize_project",
        }
    }

    pub fn validate(&self, snapshot: &AllocationSnapshot) -> Result<()> {
        match self {
            Scenario::AddResource {
                role,
                capacity_hours_per_day,
                availability,
            } => {
                if role.trim().is_empty() {
                    return Err(Error::validation("add_resource requires a role"));
                }
                if !capacity_hours_per_day.is_finite() || *capacity_hours_per_day <= 0.0 {
                    return Err(Error::validation("add_resource capacity must be positive"));
                }
                if !(*availability > 0.0 && *availability <= 1.0) {
                    return Err(Error::validation("add_resource availability must be within (0, 1]"));
                }
                Ok(())
            }
            Scenario::DelayProject { days, .. } if days.unsigned_abs() > MAX_DELAY_DAYS.unsigned_abs() => Err(Error::validation(format!(
                "delay_project days must be within ±{}, got {}",
                MAX_DELAY_DAYS, days
            ))),
            Scenario::DelayProject { project_id, .. } | Scenario::PrioritizeProject { project_id } => {
                if snapshot.project(project_id).is_none() {
                    return Err(Error::validation(format!("Unknown project {}", project_id)));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationRequest {
    pub scenario: Scenario,
    pub snapshot: AllocationSnapshot,
    #[serde(default)]
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationResult {
    pub scenario: String,
    pub before: ConflictMetrics,
    pub after: ConflictMetrics,
    /// Relative reduction of overallocation hours, in [-1, 1]
    pub improvement_score: f64,
    pub recommendation: String,
    pub changes: Vec<String>,
}

/// Run a scenario and compare conflicts before and after it
pub fn simulate(request: &SimulationRequest) -> Result<SimulationResult> {
    let scenario = &request.scenario;
    scenario.validate(&request.snapshot)?;
    let range = request.date_range.as_ref();

    let baseline = detect_conflicts(&consolidate(&request.snapshot)?, range);
    let (after, changes) = match scenario {
        Scenario::AddResource {
            role,
            capacity_hours_per_day,
            availability,
        } => absorb_with_helper(&baseline, role, capacity_hours_per_day * availability),
        Scenario::DelayProject { project_id, days } => {
            let mut snapshot = request.snapshot.clone();
            let mut moved = 0;
            for assignment in snapshot.assignments.iter_mut().filter(|a| &a.project_id == project_id) {
                assignment.shift_days(*days)?;
                moved += 1;
            }
            let after = detect_conflicts(&consolidate(&snapshot)?, range);
            let change = format!("Shifted {} assignment(s) of {} by {} day(s)", moved, project_id, days);
            (after, vec![change])
        }
        Scenario::PrioritizeProject { project_id } => {
            let (snapshot, changes) = prioritize(&request.snapshot, &baseline, project_id)?;
            (detect_conflicts(&consolidate(&snapshot)?, range), changes)
        }
    };

    let before = ConflictMetrics::from_conflicts(&baseline);
    let after = ConflictMetrics::from_conflicts(&after);
    let improvement_score = improvement(&before, &after);
    info!(
        scenario = scenario.kind(),
        conflicts_before = before.total,
        conflicts_after = after.total,
        improvement_score,
        "Simulation finished"
    );

    Ok(SimulationResult {
        scenario: scenario.kind().to_string(),
        recommendation: recommendation(improvement_score).to_string(),
        before,
        after,
        improvement_score,
        changes,
    })
}

/// `(before - after) / before` on overallocation hours, clamped to [-1, 1]
pub fn improvement(before: &ConflictMetrics, after: &ConflictMetrics) -> f64 {
    if before.total_overallocation_hours <= f64::EPSILON {
        return 0.0;
    }
    ((before.total_overallocation_hours - after.total_overallocation_hours)
        / before.total_overallocation_hours)
        .clamp(-1.0, 1.0)
}

pub fn recommendation(score: f64) -> &'static str {
    if score >= 0.5 {
        "Strongly recommended: removes most of the overallocation"
    } else if score >= 0.2 {
        "Recommended: noticeably reduces overallocation"
    } else if score > 0.0 {
        "Marginal: small reduction in overallocation"
    } else {
        "Not recommended: no reduction in overallocation"
    }
}

fn absorb_with_helper(baseline: &[Conflict], role: &str, daily_hours: f64) -> (Vec<Conflict>, Vec<String>) {
    let role = role.trim();
    let mut budget: HashMap<NaiveDate, f64> = HashMap::new();
    let mut after = Vec::new();
    let mut changes = Vec::new();

    // Baseline is ordered most severe first, so the helper goes where it hurts most
    for conflict in baseline {
        if !conflict.role.trim().eq_ignore_ascii_case(role) {
            after.push(conflict.clone());
            continue;
        }
        let remaining = budget.entry(conflict.date).or_insert(daily_hours);
        let absorbed = remaining.min(conflict.overallocation_hours);
        *remaining -= absorbed;
        if absorbed > 0.0 {
            changes.push(format!(
                "Helper takes {:.1}h from {} on {}",
                absorbed, conflict.resource_name, conflict.date
            ));
        }

        let over = conflict.overallocation_hours - absorbed;
        if over > 1e-9 {
            let mut reduced = conflict.clone();
            reduced.allocated_hours -= absorbed;
            reduced.overallocation_hours = over;
            reduced.overallocation_ratio = over / reduced.capacity_hours;
            reduced.severity = Severity::from_ratio(reduced.overallocation_ratio);
            after.push(reduced);
        }
    }

    sort_conflicts(&mut after);
    (after, changes)
}

fn prioritize(
    snapshot: &AllocationSnapshot,
    baseline: &[Conflict],
    project_id: &str,
) -> Result<(AllocationSnapshot, Vec<String>)> {
    let by_id: HashMap<&str, &Assignment> = snapshot
        .assignments
        .iter()
        .map(|a| (a.id.as_str(), a))
        .collect();
    let mut new_starts: HashMap<String, NaiveDate> = HashMap::new();

    for conflict in baseline.iter().filter(|c| c.project_ids.contains(project_id) && c.project_ids.len() > 1) {
        let prioritized_end = conflict
            .tasks
            .iter()
            .filter(|t| t.project_id == project_id)
            .filter_map(|t| by_id.get(t.assignment_id.as_str()).map(|a| a.end_date))
            .max();
        let Some(end) = prioritized_end else {
            continue;
        };
        let start = shift_date(end, 1)?;
        for task in conflict.tasks.iter().filter(|t| t.project_id != project_id) {
            new_starts
                .entry(task.assignment_id.clone())
                .and_modify(|s| *s = (*s).max(start))
                .or_insert(start);
        }
    }

    let mut adjusted = snapshot.clone();
    let mut changes = Vec::new();
    for assignment in adjusted.assignments.iter_mut() {
        let Some(start) = new_starts.get(&assignment.id) else {
            continue;
        };
        if *start > assignment.start_date {
            let offset = (*start - assignment.start_date).num_days();
            assignment.shift_days(offset)?;
            changes.push(format!(
                "Moved {} ({}) to start {}",
                assignment.task_name, assignment.project_id, assignment.start_date
            ));
        }
    }
    Ok((adjusted, changes))
}
