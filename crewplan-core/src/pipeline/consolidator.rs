//! Resource consolidation
//!
//! Folds duplicate person records into canonical resources and attaches
//! every assignment to its canonical owner.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::resource::{AllocationSnapshot, ConsolidatedResource, RawResource};
use crate::{Error, Result};

/// Consolidate a snapshot into canonical resources, in first-declared order.
///
/// Records sharing a normalization key (or a raw id) are merged: capacities
/// take the maximum, skills and assignments are unioned. Any assignment
/// pointing at an unknown project or resource fails the whole snapshot.
pub fn consolidate(snapshot: &AllocationSnapshot) -> Result<Vec<ConsolidatedResource>> {
    let mut resources: Vec<ConsolidatedResource> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    let mut by_raw_id: HashMap<String, usize> = HashMap::new();

    for raw in &snapshot.resources {
        raw.validate()?;
        let key = raw.normalization_key();
        let existing = by_raw_id
            .get(&raw.id)
            .or_else(|| by_key.get(&key))
            .copied();

        let index = match existing {
            Some(index) => {
                merge_into(&mut resources[index], raw);
                index
            }
            None => {
                resources.push(canonical_from(raw, key.clone()));
                resources.len() - 1
            }
        };
        by_key.entry(key).or_insert(index);
        by_raw_id.insert(raw.id.clone(), index);
    }

    let project_ids: HashSet<&str> = snapshot.projects.iter().map(|p| p.id.as_str()).collect();
    let mut seen_assignments: Vec<HashSet<String>> = vec![HashSet::new(); resources.len()];

    for assignment in &snapshot.assignments {
        assignment.validate()?;
        if !project_ids.contains(assignment.project_id.as_str()) {
            return Err(Error::validation(format!(
                "Assignment {} references unknown project {}",
                assignment.id, assignment.project_id
            )));
        }
        let index = *by_raw_id.get(&assignment.resource_id).ok_or_else(|| {
            Error::validation(format!(
                "Assignment {} references unknown resource {}",
                assignment.id, assignment.resource_id
            ))
        })?;

        if seen_assignments[index].insert(assignment.id.clone()) {
            resources[index].assignments.push(assignment.clone());
        } else {
            debug!(assignment_id = %assignment.id, "Skipping duplicate assignment");
        }
    }

    info!(
        raw_resources = snapshot.resources.len(),
        consolidated = resources.len(),
        assignments = snapshot.assignments.len(),
        "Consolidated resources"
    );
    Ok(resources)
}

fn canonical_from(raw: &RawResource, key: String) -> ConsolidatedResource {
    ConsolidatedResource {
        id: raw.id.clone(),
        key,
        name: raw.name.trim().to_string(),
        email: raw.email.as_ref().map(|e| e.trim().to_lowercase()),
        role: raw.role.trim().to_string(),
        capacity_hours_per_day: raw.capacity_hours_per_day,
        department: raw.department.clone(),
        skills: raw.skills.iter().map(|s| s.trim().to_string()).collect(),
        aliases: vec![raw.id.clone()],
        assignments: Vec::new(),
    }
}

fn merge_into(target: &mut ConsolidatedResource, raw: &RawResource) {
    debug!(canonical_id = %target.id, raw_id = %raw.id, "Merging duplicate resource");
    target.capacity_hours_per_day = target.capacity_hours_per_day.max(raw.capacity_hours_per_day);
    target
        .skills
        .extend(raw.skills.iter().map(|s| s.trim().to_string()));
    if target.department.is_none() {
        target.department = raw.department.clone();
    }
    if target.email.is_none() {
        target.email = raw.email.as_ref().map(|e| e.trim().to_lowercase());
    }
    if !target.is_alias(&raw.id) {
        target.aliases.push(raw.id.clone());
    }
}
