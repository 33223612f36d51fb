//! Deterministic, rule-based proposal provider for offline runs

use async_trait::async_trait;

use crate::conflict::{Conflict, Severity, TaskInvolvement};
use crate::pipeline::generator::{ProposalProvider, ProposalRequest, RawProposal};
use crate::solution::{ImpactAnalysis, Strategy};
use crate::Result;

/// Derives proposals from the tasks involved in a conflict
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedProvider;

impl RuleBasedProvider {
    pub fn new() -> Self {
        Self
    }

    /// Proposals for a conflict, most promising first
    pub fn proposals_for(&self, conflict: &Conflict, max: usize) -> Vec<RawProposal> {
        let penalty = match conflict.severity {
            Severity::Critical => 0.15,
            Severity::High => 0.05,
            _ => 0.0,
        };
        let mut proposals = Vec::new();

        let with_slack = conflict
            .flexible_tasks()
            .filter(|t| t.slack_days > 0)
            .max_by_key(|t| t.slack_days);
        if let Some(task) = with_slack {
            let days = spread_days(conflict, task);
            proposals.push(raw(
                Strategy::RedistributeWithSlack,
                format!(
                    "Spread {} over {} additional day(s) of its {} days of slack",
                    task.task_name, days, task.slack_days
                ),
                format!(
                    "{} is off the critical path, so using slack absorbs {:.1}h without moving the deadline",
                    task.task_name, conflict.overallocation_hours
                ),
                0.85 - penalty,
                0.3,
                true,
                ImpactAnalysis {
                    affected_tasks: vec![task.task_id.clone()],
                    days_impact: 0,
                    resources_needed: 0,
                },
            ));
        }

        let movable: Vec<&TaskInvolvement> = conflict.flexible_tasks().collect();
        if !movable.is_empty() {
            let smallest = movable
                .iter()
                .min_by(|a, b| a.hours.total_cmp(&b.hours))
                .map(|t| t.task_name.as_str())
                .unwrap_or_default();
            proposals.push(raw(
                Strategy::MoveNoncritical,
                format!("Move {} to the next day with spare capacity", smallest),
                format!(
                    "{} non-critical task(s) can move without affecting the critical path",
                    movable.len()
                ),
                0.75 - penalty,
                0.4,
                movable.iter().any(|t| t.slack_days > 0),
                ImpactAnalysis {
                    affected_tasks: movable.iter().map(|t| t.task_id.clone()).collect(),
                    days_impact: 1,
                    resources_needed: 0,
                },
            ));
        }

        let extend_days = (conflict.overallocation_hours / conflict.capacity_hours).ceil().max(1.0) as i64;
        proposals.push(raw(
            Strategy::ExtendDuration,
            format!(
                "Extend the affected tasks by {} day(s) to fit {}'s capacity",
                extend_days, conflict.resource_name
            ),
            "Lowers the daily load at the cost of a later finish".to_string(),
            0.6 - penalty,
            0.5,
            false,
            ImpactAnalysis {
                affected_tasks: conflict.tasks.iter().map(|t| t.task_id.clone()).collect(),
                days_impact: extend_days,
                resources_needed: 0,
            },
        ));

        proposals.truncate(max.max(1));
        proposals
    }
}

/// Extra days needed to absorb the overallocation within the task's slack
fn spread_days(conflict: &Conflict, task: &TaskInvolvement) -> i64 {
    let needed = (conflict.overallocation_hours / conflict.capacity_hours).ceil().max(1.0) as i64;
    needed.min(task.slack_days)
}

fn raw(
    strategy: Strategy,
    description: String,
    reasoning: String,
    feasibility: f64,
    complexity: f64,
    preserves_deadline: bool,
    impact: ImpactAnalysis,
) -> RawProposal {
    RawProposal {
        strategy: Some(strategy.as_str().to_string()),
        description: Some(description),
        reasoning: Some(reasoning),
        feasibility: Some(feasibility.clamp(0.0, 1.0)),
        complexity: Some(complexity),
        preserves_deadline: Some(preserves_deadline),
        impact: Some(impact),
    }
}

#[async_trait]
impl ProposalProvider for RuleBasedProvider {
    fn name(&self) -> &str {
        "rule-based"
    }

    async fn propose(&self, request: &ProposalRequest) -> Result<Vec<RawProposal>> {
        Ok(self.proposals_for(&request.conflict, request.max_proposals))
    }
}
