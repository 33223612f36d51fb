//! Allocation model: projects, people and their assignments
//!
//! Raw records arrive as an [`AllocationSnapshot`] and may describe the same
//! person several times under different ids. The consolidator folds them into
//! [`ConsolidatedResource`] values, which the detector reads.
//!
//! # Examples
//!
//! ```rust
//! use crewplan_core::resource::*;
//! use chrono::NaiveDate;
//!
//! let day = NaiveDate::from_ymd_opt(2025, 2, 17).unwrap();
//! let assignment = Assignment::builder()
//!     .id("as-1")
//!     .project_id("P1")
//!     .resource_id("R1")
//!     .task("T1", "Formwork")
//!     .dates(day, day)
//!     .hours(6.0)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(assignment.daily_hours(), vec![(day, 6.0)]);
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::calendar::{spread_hours, DateRange};
use crate::{Error, Result};

/// Construction project referenced by assignments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// 1 is the highest priority
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub status: ProjectStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Active,
    Planning,
    Completed,
    OnHold,
}

fn default_priority() -> u8 {
    2
}

fn default_capacity() -> f64 {
    8.0
}

/// Person record as delivered by the allocation source, possibly duplicated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawResource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
    #[serde(default = "default_capacity", alias = "max_capacity_hours_per_day")]
    pub capacity_hours_per_day: f64,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default, alias = "skill_tags")]
    pub skills: Vec<String>,
}

/// Work committed by one resource to one task of a project over a date range
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: String,
    pub project_id: String,
    pub resource_id: String,
    pub task_id: String,
    pub task_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_work_hours: f64,
    #[serde(default, alias = "is_on_critical_path")]
    pub on_critical_path: bool,
    #[serde(default)]
    pub slack_days: i64,
}

/// Canonical person after deduplication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsolidatedResource {
    /// First declared raw id
    pub id: String,
    /// Normalization key shared by every merged raw record
    pub key: String,
    pub name: String,
    pub email: Option<String>,
    pub role: String,
    pub capacity_hours_per_day: f64,
    pub department: Option<String>,
    pub skills: BTreeSet<String>,
    /// Every raw id folded into this resource, including `id`
    pub aliases: Vec<String>,
    pub assignments: Vec<Assignment>,
}

/// Complete input for one analysis or simulation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AllocationSnapshot {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub resources: Vec<RawResource>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

impl Project {
    pub fn new<S1: Into<String>, S2: Into<String>>(id: S1, name: S2) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            start_date: None,
            end_date: None,
            priority: default_priority(),
            status: ProjectStatus::Active,
        }
    }
}

impl RawResource {
    pub fn new<S1, S2, S3>(id: S1, name: S2, role: S3, capacity_hours_per_day: f64) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            role: role.into(),
            capacity_hours_per_day,
            department: None,
            skills: Vec::new(),
        }
    }

    pub fn with_email<S: Into<String>>(mut self, email: S) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Key used to recognise the same person across records.
    ///
    /// The trimmed, lower-cased e-mail when present, otherwise the
    /// whitespace-collapsed, lower-cased `name|role`.
    pub fn normalization_key(&self) -> String {
        match self.email.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            Some(email) => email.to_lowercase(),
            None => format!("{}|{}", collapse(&self.name), collapse(&self.role)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("Resource id cannot be empty"));
        }
        if !self.capacity_hours_per_day.is_finite() || self.capacity_hours_per_day <= 0.0 {
            return Err(Error::validation(format!(
                "Resource {} must have a positive daily capacity",
                self.id
            )));
        }
        Ok(())
    }
}

fn collapse(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl Assignment {
    /// Create a builder for constructing an Assignment
    pub fn builder() -> AssignmentBuilder {
        AssignmentBuilder::default()
    }

    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// Hours this assignment places on each working day of its range
    pub fn daily_hours(&self) -> Vec<(NaiveDate, f64)> {
        spread_hours(&self.range(), self.total_work_hours)
    }

    /// Hours placed on a single date, zero when the date is not a working day of the range
    pub fn hours_on(&self, date: NaiveDate) -> f64 {
        self.daily_hours()
            .into_iter()
            .find(|(d, _)| *d == date)
            .map(|(_, h)| h)
            .unwrap_or(0.0)
    }

    /// Move the whole assignment by a number of calendar days
    pub fn shift_days(&mut self, days: i64) -> Result<()> {
        let shifted = self.range().shifted(days)?;
        self.start_date = shifted.start;
        self.end_date = shifted.end;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("Assignment id cannot be empty"));
        }
        if self.start_date > self.end_date {
            return Err(Error::validation(format!(
                "Assignment {} starts on {} after it ends on {}",
                self.id, self.start_date, self.end_date
            )));
        }
        if self.total_work_hours < 0.0 || !self.total_work_hours.is_finite() {
            return Err(Error::validation(format!(
                "Assignment {} has invalid work hours {}",
                self.id, self.total_work_hours
            )));
        }
        Ok(())
    }
}

impl ConsolidatedResource {
    /// Per-day load: every assignment touching the date with the hours it contributes
    pub fn daily_load(&self) -> BTreeMap<NaiveDate, Vec<(&Assignment, f64)>> {
        let mut load: BTreeMap<NaiveDate, Vec<(&Assignment, f64)>> = BTreeMap::new();
        for assignment in &self.assignments {
            for (date, hours) in assignment.daily_hours() {
                load.entry(date).or_default().push((assignment, hours));
            }
        }
        load
    }

    pub fn is_alias(&self, raw_id: &str) -> bool {
        self.aliases.iter().any(|a| a == raw_id)
    }
}

impl AllocationSnapshot {
    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Restrict the snapshot to the given projects; an empty list keeps everything
    pub fn scoped(&self, project_ids: &[String]) -> Self {
        if project_ids.is_empty() {
            return self.clone();
        }
        let wanted: HashSet<&str> = project_ids.iter().map(String::as_str).collect();
        Self {
            projects: self
                .projects
                .iter()
                .filter(|p| wanted.contains(p.id.as_str()))
                .cloned()
                .collect(),
            resources: self.resources.clone(),
            assignments: self
                .assignments
                .iter()
                .filter(|a| wanted.contains(a.project_id.as_str()))
                .cloned()
                .collect(),
        }
    }
}

/// Builder for creating Assignment instances
#[derive(Debug, Default)]
pub struct AssignmentBuilder {
    id: Option<String>,
    project_id: Option<String>,
    resource_id: Option<String>,
    task_id: Option<String>,
    task_name: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    total_work_hours: Option<f64>,
    on_critical_path: bool,
    slack_days: i64,
}

impl AssignmentBuilder {
    pub fn id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn project_id<S: Into<String>>(mut self, project_id: S) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn resource_id<S: Into<String>>(mut self, resource_id: S) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn task<S1: Into<String>, S2: Into<String>>(mut self, task_id: S1, task_name: S2) -> Self {
        self.task_id = Some(task_id.into());
        self.task_name = Some(task_name.into());
        self
    }

    pub fn dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn hours(mut self, total_work_hours: f64) -> Self {
        self.total_work_hours = Some(total_work_hours);
        self
    }

    pub fn critical(mut self, on_critical_path: bool) -> Self {
        self.on_critical_path = on_critical_path;
        self
    }

    pub fn slack_days(mut self, slack_days: i64) -> Self {
        self.slack_days = slack_days;
        self
    }

    /// Build the Assignment instance
    pub fn build(self) -> Result<Assignment> {
        let id = self
            .id
            .ok_or_else(|| Error::validation("Assignment id is required"))?;
        let task_id = self.task_id.unwrap_or_else(|| id.clone());
        let assignment = Assignment {
            project_id: self
                .project_id
                .ok_or_else(|| Error::validation("Assignment project_id is required"))?,
            resource_id: self
                .resource_id
                .ok_or_else(|| Error::validation("Assignment resource_id is required"))?,
            task_name: self.task_name.unwrap_or_else(|| task_id.clone()),
            task_id,
            start_date: self
                .start_date
                .ok_or_else(|| Error::validation("Assignment start_date is required"))?,
            end_date: self
                .end_date
                .ok_or_else(|| Error::validation("Assignment end_date is required"))?,
            total_work_hours: self
                .total_work_hours
                .ok_or_else(|| Error::validation("Assignment total_work_hours is required"))?,
            on_critical_path: self.on_critical_path,
            slack_days: self.slack_days,
            id,
        };
        assignment.validate()?;
        Ok(assignment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, d).unwrap()
    }

    #[test]
    fn test_normalization_key_prefers_email() {
        let a = RawResource::new("R1", "Ana Souza", "Carpenter", 8.0).with_email(" Ana@Site.com ");
        let b = RawResource::new("R9", "A. Souza", "carpenter", 6.0).with_email("ana@site.com");
        assert_eq!(a.normalization_key(), b.normalization_key());

        let c = RawResource::new("R2", "  Bruno   Lima ", "Electrician", 8.0);
        assert_eq!(c.normalization_key(), "bruno lima|electrician");
    }

    #[test]
    fn test_resource_validation() {
        assert!(RawResource::new("R1", "Ana", "Carpenter", 0.0).validate().is_err());
        assert!(RawResource::new("R1", "Ana", "Carpenter", f64::NAN).validate().is_err());
        assert!(RawResource::new("R1", "Ana", "Carpenter", 8.0).validate().is_ok());
    }

    #[test]
    fn test_assignment_builder_validation() {
        let result = Assignment::builder()
            .id("as-1")
            .project_id("P1")
            .resource_id("R1")
            .dates(day(12), day(10))
            .hours(8.0)
            .build();
        assert!(result.unwrap_err().is_validation());

        let result = Assignment::builder().id("as-1").project_id("P1").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_daily_load_groups_by_date() {
        let a = Assignment::builder()
            .id("a")
            .project_id("P1")
            .resource_id("R1")
            .dates(day(17), day(18))
            .hours(10.0)
            .build()
            .unwrap();
        let b = Assignment::builder()
            .id("b")
            .project_id("P2")
            .resource_id("R1")
            .dates(day(18), day(18))
            .hours(4.0)
            .build()
            .unwrap();
        let resource = ConsolidatedResource {
            id: "R1".into(),
            key: "ana|carpenter".into(),
            name: "Ana".into(),
            email: None,
            role: "Carpenter".into(),
            capacity_hours_per_day: 8.0,
            department: None,
            skills: BTreeSet::new(),
            aliases: vec!["R1".into()],
            assignments: vec![a, b],
        };

        let load = resource.daily_load();
        assert_eq!(load.len(), 2);
        let total: f64 = load[&day(18)].iter().map(|(_, h)| h).sum();
        assert!((total - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_scoping() {
        let snapshot = AllocationSnapshot {
            projects: vec![Project::new("P1", "Tower"), Project::new("P2", "Bridge")],
            resources: vec![RawResource::new("R1", "Ana", "Carpenter", 8.0)],
            assignments: vec![
                Assignment::builder()
                    .id("a")
                    .project_id("P1")
                    .resource_id("R1")
                    .dates(day(17), day(17))
                    .hours(4.0)
                    .build()
                    .unwrap(),
                Assignment::builder()
                    .id("b")
                    .project_id("P2")
                    .resource_id("R1")
                    .dates(day(17), day(17))
                    .hours(4.0)
                    .build()
                    .unwrap(),
            ],
        };

        let scoped = snapshot.scoped(&["P2".to_string()]);
        assert_eq!(scoped.projects.len(), 1);
        assert_eq!(scoped.assignments[0].id, "b");
        assert_eq!(snapshot.scoped(&[]).assignments.len(), 2);
    }
}
