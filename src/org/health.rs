// 🩺 Department Health - per-department task load, overdue and near-due counts
//
// Single pass over the active instances of one organization. Nothing is
// stored; every fetch recomputes from scratch.
//
// Target resolution per instance:
//   1. assigned_department_id
//   2. else department of assigned_position_id
//   3. else every department the assigned user holds a position in
// An instance that resolves to nothing is left out.

use crate::config::OrgConfig;
use crate::org::model::{Activity, Department, Position, ProcessInstance, UserPosition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentHealth {
    pub active_tasks: usize,
    pub overdue_tasks: usize,
    pub near_due_tasks: usize,
}

/// department id -> health
pub type HealthMap = BTreeMap<String, DepartmentHealth>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    /// Used when the activity is unknown or has no `due_date_hours`
    pub default_due_hours: f64,
    /// Remaining-time window that counts as near due
    pub near_due_hours: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self::from(&OrgConfig::default())
    }
}

impl From<&OrgConfig> for HealthThresholds {
    fn from(config: &OrgConfig) -> Self {
        Self {
            default_due_hours: config.default_due_hours,
            near_due_hours: config.near_due_hours,
        }
    }
}

// ============================================================================
// LOOKUPS
// ============================================================================

/// position -> department, and user -> departments via held positions
#[derive(Debug, Clone, Default)]
pub struct OrgIndex {
    position_department: HashMap<String, String>,
    user_departments: HashMap<String, BTreeSet<String>>,
}

impl OrgIndex {
    pub fn build(positions: &[Position], user_positions: &[UserPosition]) -> Self {
        let position_department: HashMap<String, String> = positions
            .iter()
            .filter_map(|p| p.department_id.clone().map(|d| (p.id.clone(), d)))
            .collect();

        let mut user_departments: HashMap<String, BTreeSet<String>> = HashMap::new();
        for membership in user_positions {
            if let Some(department) = position_department.get(&membership.position_id) {
                user_departments
                    .entry(membership.user_id.clone())
                    .or_default()
                    .insert(department.clone());
            }
        }

        OrgIndex {
            position_department,
            user_departments,
        }
    }

    pub fn department_of_position(&self, position_id: &str) -> Option<&str> {
        self.position_department.get(position_id).map(String::as_str)
    }

    pub fn departments_of_user(&self, user_id: &str) -> impl Iterator<Item = &str> {
        self.user_departments
            .get(user_id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Departments an instance counts towards; blank ids count as unset
    pub fn target_departments<'a>(&'a self, instance: &'a ProcessInstance) -> Vec<&'a str> {
        if let Some(department) = present(&instance.assigned_department_id) {
            return vec![department];
        }
        if let Some(position) = present(&instance.assigned_position_id) {
            return self.department_of_position(position).into_iter().collect();
        }
        if let Some(user) = present(&instance.assigned_user_id) {
            return self.departments_of_user(user).collect();
        }
        Vec::new()
    }
}

fn present(id: &Option<String>) -> Option<&str> {
    id.as_deref().filter(|v| !v.trim().is_empty())
}

// ============================================================================
// AGGREGATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Urgency {
    Overdue,
    NearDue,
    OnTrack,
}

fn urgency(elapsed_hours: f64, due_hours: f64, near_due_hours: f64) -> Urgency {
    if elapsed_hours > due_hours {
        Urgency::Overdue
    } else if due_hours - elapsed_hours <= near_due_hours {
        Urgency::NearDue
    } else {
        Urgency::OnTrack
    }
}

pub fn compute_department_health(
    activities: &[Activity],
    instances: &[ProcessInstance],
    index: &OrgIndex,
    now: DateTime<Utc>,
    thresholds: &HealthThresholds,
) -> HealthMap {
    let due_hours: HashMap<&str, f64> = activities
        .iter()
        .filter_map(|a| a.due_date_hours.map(|h| (a.id.as_str(), h)))
        .collect();

    let mut health = HealthMap::new();

    for instance in instances.iter().filter(|i| i.is_active()) {
        let targets = index.target_departments(instance);
        if targets.is_empty() {
            continue;
        }

        let due = instance
            .current_activity_id
            .as_deref()
            .and_then(|id| due_hours.get(id).copied())
            .unwrap_or(thresholds.default_due_hours);
        let elapsed_hours = (now - instance.created_at).num_seconds() as f64 / 3600.0;
        let state = urgency(elapsed_hours, due, thresholds.near_due_hours);

        for department in targets {
            let entry = health.entry(department.to_string()).or_default();
            entry.active_tasks += 1;
            match state {
                Urgency::Overdue => entry.overdue_tasks += 1,
                Urgency::NearDue => entry.near_due_tasks += 1,
                Urgency::OnTrack => {}
            }
        }
    }

    health
}

/// Give every known department an entry, zeros when it has no tasks
pub fn seed_departments(health: &mut HealthMap, departments: &[Department]) {
    for department in departments {
        health.entry(department.id.clone()).or_default();
    }
}
