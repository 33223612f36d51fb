//! Conflict detection over consolidated resources

use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::calendar::DateRange;
use crate::conflict::{Conflict, Severity, TaskInvolvement};
use crate::resource::ConsolidatedResource;

/// Overallocation below this many hours is floating-point noise
const HOURS_EPSILON: f64 = 1e-9;

/// Detect every resource/day whose allocated hours exceed capacity.
///
/// Days outside `range` are ignored. The result is ordered most severe first,
/// then by descending overallocation.
pub fn detect_conflicts(
    resources: &[ConsolidatedResource],
    range: Option<&DateRange>,
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for resource in resources {
        let capacity = resource.capacity_hours_per_day;
        for (date, entries) in resource.daily_load() {
            if range.is_some_and(|r| !r.contains(date)) {
                continue;
            }
            let allocated: f64 = entries.iter().map(|(_, hours)| hours).sum();
            let over = allocated - capacity;
            if over <= HOURS_EPSILON {
                continue;
            }

            let ratio = over / capacity;
            let tasks: Vec<TaskInvolvement> = entries
                .iter()
                .map(|(assignment, hours)| TaskInvolvement {
                    assignment_id: assignment.id.clone(),
                    project_id: assignment.project_id.clone(),
                    task_id: assignment.task_id.clone(),
                    task_name: assignment.task_name.clone(),
                    hours: *hours,
                    on_critical_path: assignment.on_critical_path,
                    slack_days: assignment.slack_days,
                })
                .collect();
            let project_ids: BTreeSet<String> =
                tasks.iter().map(|t| t.project_id.clone()).collect();

            debug!(resource_id = %resource.id, %date, allocated, capacity, "Overallocation found");
            conflicts.push(Conflict {
                id: Conflict::make_id(&resource.id, date),
                resource_id: resource.id.clone(),
                resource_name: resource.name.clone(),
                role: resource.role.clone(),
                date,
                allocated_hours: allocated,
                capacity_hours: capacity,
                overallocation_hours: over,
                overallocation_ratio: ratio,
                severity: Severity::from_ratio(ratio),
                tasks,
                project_ids,
            });
        }
    }

    sort_conflicts(&mut conflicts);
    info!(
        conflicts = conflicts.len(),
        critical = conflicts.iter().filter(|c| c.severity == Severity::Critical).count(),
        "Conflict detection finished"
    );
    conflicts
}

/// Severity descending, overallocation ratio descending, then hours, resource and date
pub fn sort_conflicts(conflicts: &mut [Conflict]) {
    conflicts.sort_by(compare_conflicts);
}

fn compare_conflicts(a: &Conflict, b: &Conflict) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| b.overallocation_ratio.total_cmp(&a.overallocation_ratio))
        .then_with(|| b.overallocation_hours.total_cmp(&a.overallocation_hours))
        .then_with(|| a.resource_id.cmp(&b.resource_id))
        .then_with(|| a.date.cmp(&b.date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Assignment;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn resource(id: &str, capacity: f64, assignments: Vec<Assignment>) -> ConsolidatedResource {
        ConsolidatedResource {
            id: id.into(),
            key: id.to_lowercase(),
            name: id.into(),
            email: None,
            role: "Carpenter".into(),
            capacity_hours_per_day: capacity,
            department: None,
            skills: BTreeSet::new(),
            aliases: vec![id.into()],
            assignments,
        }
    }

    fn single_day(id: &str, project: &str, resource: &str, day: &str, hours: f64) -> Assignment {
        Assignment::builder()
            .id(id)
            .project_id(project)
            .resource_id(resource)
            .dates(date(day), date(day))
            .hours(hours)
            .build()
            .unwrap()
    }

    #[test]
    fn test_two_projects_on_one_day() {
        let r1 = resource(
            "R1",
            8.0,
            vec![
                single_day("a", "A", "R1", "2025-02-15", 5.0),
                single_day("b", "B", "R1", "2025-02-15", 6.0),
            ],
        );

        let conflicts = detect_conflicts(&[r1], None);
        assert_eq!(conflicts.len(), 1);
        let conflict = &conflicts[0];
        assert_eq!(conflict.allocated_hours, 11.0);
        assert_eq!(conflict.capacity_hours, 8.0);
        assert!((conflict.overallocation_ratio - 0.375).abs() < 1e-12);
        assert_eq!(conflict.severity, Severity::Medium);
        assert_eq!(conflict.id, "R1:2025-02-15");
        assert_eq!(conflict.project_ids.len(), 2);
        assert_eq!(conflict.tasks.len(), 2);
    }

    #[test]
    fn test_exact_capacity_is_not_a_conflict() {
        let r1 = resource(
            "R1",
            8.0,
            vec![
                single_day("a", "A", "R1", "2025-02-17", 4.0),
                single_day("b", "B", "R1", "2025-02-17", 4.0),
            ],
        );
        assert!(detect_conflicts(&[r1], None).is_empty());
    }

    #[test]
    fn test_sorted_by_severity_then_magnitude() {
        let r1 = resource("R1", 8.0, vec![single_day("a", "A", "R1", "2025-02-17", 10.0)]);
        let r2 = resource("R2", 8.0, vec![single_day("b", "A", "R2", "2025-02-17", 16.0)]);
        let r3 = resource("R3", 8.0, vec![single_day("c", "A", "R3", "2025-02-17", 9.0)]);
        let r4 = resource("R4", 4.0, vec![single_day("d", "A", "R4", "2025-02-17", 5.9)]);

        let conflicts = detect_conflicts(&[r1, r2, r3, r4], None);
        let order: Vec<&str> = conflicts.iter().map(|c| c.resource_id.as_str()).collect();
        assert_eq!(order, vec!["R2", "R4", "R1", "R3"]);
        assert_eq!(conflicts[0].severity, Severity::Critical);
    }

    #[test]
    fn test_range_filter() {
        let r1 = resource(
            "R1",
            8.0,
            vec![
                single_day("a", "A", "R1", "2025-02-17", 10.0),
                single_day("b", "A", "R1", "2025-02-18", 10.0),
            ],
        );
        let range = DateRange::new(date("2025-02-18"), date("2025-02-28")).unwrap();
        let conflicts = detect_conflicts(&[r1], Some(&range));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].date, date("2025-02-18"));
    }
}
