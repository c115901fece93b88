// 🌳 Org Chart - department tree with positions, holders and health attached

use crate::org::health::{DepartmentHealth, HealthMap};
use crate::org::model::{Department, Position, UserPosition};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionNode {
    pub position: Position,
    /// User ids, sorted
    pub holders: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrgNode {
    pub department: Department,
    pub positions: Vec<PositionNode>,
    pub health: DepartmentHealth,
    pub children: Vec<OrgNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrgChart {
    pub roots: Vec<OrgNode>,
    /// Positions not attached to any known department
    pub unassigned_positions: Vec<PositionNode>,
}

impl OrgChart {
    /// Depth-first walk over every department node
    pub fn departments(&self) -> Vec<&OrgNode> {
        let mut out = Vec::new();
        let mut stack: Vec<&OrgNode> = self.roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

/// Build the department forest.
///
/// A department whose parent is unknown becomes a root, and so does every
/// department sitting on a parent cycle. Each department appears once.
pub fn build_org_chart(
    departments: &[Department],
    positions: &[Position],
    user_positions: &[UserPosition],
    health: Option<&HealthMap>,
) -> OrgChart {
    let known: HashSet<&str> = departments.iter().map(|d| d.id.as_str()).collect();

    let mut holders: HashMap<&str, Vec<String>> = HashMap::new();
    for membership in user_positions {
        holders
            .entry(membership.position_id.as_str())
            .or_default()
            .push(membership.user_id.clone());
    }

    let mut positions_by_department: HashMap<&str, Vec<PositionNode>> = HashMap::new();
    let mut unassigned_positions = Vec::new();
    for position in positions {
        let mut node = PositionNode {
            position: position.clone(),
            holders: holders.get(position.id.as_str()).cloned().unwrap_or_default(),
        };
        node.holders.sort();
        node.holders.dedup();

        match position.department_id.as_deref().filter(|d| known.contains(d)) {
            Some(department) => positions_by_department.entry(department).or_default().push(node),
            None => unassigned_positions.push(node),
        }
    }
    for nodes in positions_by_department.values_mut() {
        nodes.sort_by(|a, b| a.position.title.cmp(&b.position.title));
    }
    unassigned_positions.sort_by(|a, b| a.position.title.cmp(&b.position.title));

    let parents: HashMap<&str, &str> = departments
        .iter()
        .filter_map(|d| d.parent_id.as_deref().map(|p| (d.id.as_str(), p)))
        .collect();

    let mut children: HashMap<&str, Vec<&Department>> = HashMap::new();
    let mut roots: Vec<&Department> = Vec::new();
    for department in departments {
        match department.parent_id.as_deref().filter(|p| known.contains(p)) {
            Some(parent) if !reaches(&parents, parent, &department.id) => {
                children.entry(parent).or_default().push(department)
            }
            _ => roots.push(department),
        }
    }
    roots.sort_by(|a, b| a.name.cmp(&b.name));

    let mut emitted: HashSet<String> = HashSet::new();
    let roots = roots
        .into_iter()
        .filter_map(|d| {
            build_node(
                d,
                &children,
                &mut positions_by_department,
                health,
                &mut emitted,
            )
        })
        .collect();

    OrgChart {
        roots,
        unassigned_positions,
    }
}

/// Does walking up from `start` hit `target`?
fn reaches(parents: &HashMap<&str, &str>, start: &str, target: &str) -> bool {
    let mut current = start;
    for _ in 0..=parents.len() {
        if current == target {
            return true;
        }
        match parents.get(current) {
            Some(parent) => current = *parent,
            None => return false,
        }
    }
    false
}

fn build_node(
    department: &Department,
    children: &HashMap<&str, Vec<&Department>>,
    positions: &mut HashMap<&str, Vec<PositionNode>>,
    health: Option<&HealthMap>,
    emitted: &mut HashSet<String>,
) -> Option<OrgNode> {
    if !emitted.insert(department.id.clone()) {
        return None;
    }

    let mut kids: Vec<&Department> = children
        .get(department.id.as_str())
        .cloned()
        .unwrap_or_default();
    kids.sort_by(|a, b| a.name.cmp(&b.name));

    let child_nodes = kids
        .into_iter()
        .filter_map(|child| build_node(child, children, positions, health, emitted))
        .collect();

    Some(OrgNode {
        department: department.clone(),
        positions: positions.remove(department.id.as_str()).unwrap_or_default(),
        health: health
            .and_then(|h| h.get(&department.id).copied())
            .unwrap_or_default(),
        children: child_nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dept(id: &str, name: &str, parent: Option<&str>) -> Department {
        Department {
            id: id.to_string(),
            org_id: "o1".to_string(),
            name: name.to_string(),
            parent_id: parent.map(String::from),
        }
    }

    fn position(id: &str, title: &str, department: Option<&str>) -> Position {
        Position {
            id: id.to_string(),
            org_id: "o1".to_string(),
            title: title.to_string(),
            department_id: department.map(String::from),
        }
    }

    fn holds(user: &str, position: &str) -> UserPosition {
        UserPosition {
            org_id: "o1".to_string(),
            user_id: user.to_string(),
            position_id: position.to_string(),
        }
    }

    #[test]
    fn test_tree_shape_and_positions() {
        let departments = vec![
            dept("root", "Company", None),
            dept("eng", "Engineering", Some("root")),
            dept("ops", "Operations", Some("root")),
            dept("web", "Web", Some("eng")),
        ];
        let positions = vec![
            position("p1", "Developer", Some("web")),
            position("p2", "CTO", Some("eng")),
            position("p3", "Advisor", None),
        ];
        let memberships = vec![holds("carol", "p1"), holds("alice", "p1"), holds("dan", "p3")];

        let mut health = HealthMap::new();
        health.insert(
            "web".to_string(),
            DepartmentHealth {
                active_tasks: 2,
                overdue_tasks: 1,
                near_due_tasks: 0,
            },
        );

        let chart = build_org_chart(&departments, &positions, &memberships, Some(&health));

        assert_eq!(chart.roots.len(), 1);
        let company = &chart.roots[0];
        let child_names: Vec<&str> = company
            .children
            .iter()
            .map(|c| c.department.name.as_str())
            .collect();
        assert_eq!(child_names, vec!["Engineering", "Operations"]);

        let web = &company.children[0].children[0];
        assert_eq!(web.department.id, "web");
        assert_eq!(web.positions[0].holders, vec!["alice", "carol"]);
        assert_eq!(web.health.active_tasks, 2);
        assert_eq!(company.health, DepartmentHealth::default());

        assert_eq!(chart.unassigned_positions.len(), 1);
        assert_eq!(chart.unassigned_positions[0].holders, vec!["dan"]);
        assert_eq!(chart.departments().len(), 4);
    }

    #[test]
    fn test_missing_parent_becomes_root() {
        let departments = vec![dept("a", "Alpha", Some("gone")), dept("b", "Beta", None)];
        let chart = build_org_chart(&departments, &[], &[], None);

        let names: Vec<&str> = chart
            .roots
            .iter()
            .map(|n| n.department.name.as_str())
            .collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn test_cycle_emits_each_department_once() {
        let departments = vec![
            dept("a", "Alpha", Some("c")),
            dept("b", "Beta", Some("a")),
            dept("c", "Gamma", Some("b")),
        ];
        let chart = build_org_chart(&departments, &[], &[], None);

        let mut ids: Vec<&str> = chart
            .departments()
            .iter()
            .map(|n| n.department.id.as_str())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
