// Org chart persistence - all rows are scoped by org_id

use crate::db::{self, parse_timestamp};
use crate::error::{StoreError, StoreResult};
use crate::org::model::{
    Activity, ActivityInput, Department, DepartmentInput, InstanceInput, InstanceStatus, Position,
    PositionInput, ProcessInstance, UserPosition,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

fn require(value: &str, what: &str) -> StoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Validation(format!("{what} is required")));
    }
    Ok(trimmed.to_string())
}

/// Blank ids count as absent
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn exists(conn: &Connection, table: &str, org_id: &str, id: &str) -> StoreResult<bool> {
    let found: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE org_id = ?1 AND id = ?2)"),
        params![org_id, id],
        |row| row.get(0),
    )?;
    Ok(found)
}

fn require_exists(
    conn: &Connection,
    table: &str,
    entity: &'static str,
    org_id: &str,
    id: Option<&str>,
) -> StoreResult<()> {
    if let Some(id) = id {
        if !exists(conn, table, org_id, id)? {
            return Err(StoreError::not_found(entity, id));
        }
    }
    Ok(())
}

// ============================================================================
// DEPARTMENTS
// ============================================================================

pub fn create_department(
    conn: &Connection,
    org_id: &str,
    input: &DepartmentInput,
    actor: &str,
) -> StoreResult<Department> {
    let parent_id = input.parent_id.as_deref().filter(|p| !p.is_empty());
    require_exists(conn, "departments", "department", org_id, parent_id)?;

    let department = Department {
        id: uuid::Uuid::new_v4().to_string(),
        org_id: org_id.to_string(),
        name: require(&input.name, "department name")?,
        parent_id: parent_id.map(String::from),
    };

    conn.execute(
        "INSERT INTO departments (id, org_id, name, parent_id) VALUES (?1, ?2, ?3, ?4)",
        params![department.id, department.org_id, department.name, department.parent_id],
    )?;
    db::record_event(
        conn,
        "department_added",
        "department",
        &department.id,
        serde_json::json!({ "org_id": org_id, "name": department.name }),
        actor,
    )?;

    info!(org_id, id = %department.id, "department created");
    Ok(department)
}

pub fn list_departments(conn: &Connection, org_id: &str) -> StoreResult<Vec<Department>> {
    let mut stmt = conn.prepare(
        "SELECT id, org_id, name, parent_id FROM departments WHERE org_id = ?1 ORDER BY name",
    )?;
    let rows = stmt
        .query_map([org_id], |row| {
            Ok(Department {
                id: row.get(0)?,
                org_id: row.get(1)?,
                name: row.get(2)?,
                parent_id: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Delete a department; children move up to its parent, its positions
/// become unassigned and instances assigned to it lose that assignment
pub fn delete_department(conn: &Connection, org_id: &str, id: &str, actor: &str) -> StoreResult<()> {
    let parent: Option<Option<String>> = conn
        .query_row(
            "SELECT parent_id FROM departments WHERE org_id = ?1 AND id = ?2",
            params![org_id, id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(parent) = parent else {
        return Err(StoreError::not_found("department", id));
    };

    conn.execute(
        "UPDATE departments SET parent_id = ?1 WHERE org_id = ?2 AND parent_id = ?3",
        params![parent, org_id, id],
    )?;
    conn.execute(
        "UPDATE positions SET department_id = NULL WHERE org_id = ?1 AND department_id = ?2",
        params![org_id, id],
    )?;
    conn.execute(
        "UPDATE process_instances SET assigned_department_id = NULL
         WHERE org_id = ?1 AND assigned_department_id = ?2",
        params![org_id, id],
    )?;
    conn.execute(
        "DELETE FROM departments WHERE org_id = ?1 AND id = ?2",
        params![org_id, id],
    )?;
    db::record_event(conn, "department_deleted", "department", id, serde_json::json!({}), actor)?;

    info!(org_id, id, "department deleted");
    Ok(())
}

// ============================================================================
// POSITIONS & MEMBERSHIPS
// ============================================================================

pub fn create_position(
    conn: &Connection,
    org_id: &str,
    input: &PositionInput,
    actor: &str,
) -> StoreResult<Position> {
    let department_id = input.department_id.as_deref().filter(|d| !d.is_empty());
    require_exists(conn, "departments", "department", org_id, department_id)?;

    let position = Position {
        id: uuid::Uuid::new_v4().to_string(),
        org_id: org_id.to_string(),
        title: require(&input.title, "position title")?,
        department_id: department_id.map(String::from),
    };

    conn.execute(
        "INSERT INTO positions (id, org_id, title, department_id) VALUES (?1, ?2, ?3, ?4)",
        params![position.id, position.org_id, position.title, position.department_id],
    )?;
    db::record_event(
        conn,
        "position_added",
        "position",
        &position.id,
        serde_json::json!({ "org_id": org_id, "title": position.title }),
        actor,
    )?;

    info!(org_id, id = %position.id, "position created");
    Ok(position)
}

pub fn list_positions(conn: &Connection, org_id: &str) -> StoreResult<Vec<Position>> {
    let mut stmt = conn.prepare(
        "SELECT id, org_id, title, department_id FROM positions WHERE org_id = ?1 ORDER BY title",
    )?;
    let rows = stmt
        .query_map([org_id], |row| {
            Ok(Position {
                id: row.get(0)?,
                org_id: row.get(1)?,
                title: row.get(2)?,
                department_id: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Delete a position together with its memberships; instances assigned to
/// it fall back to their user
pub fn delete_position(conn: &Connection, org_id: &str, id: &str, actor: &str) -> StoreResult<()> {
    let changed = conn.execute(
        "DELETE FROM positions WHERE org_id = ?1 AND id = ?2",
        params![org_id, id],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("position", id));
    }
    conn.execute(
        "DELETE FROM user_positions WHERE org_id = ?1 AND position_id = ?2",
        params![org_id, id],
    )?;
    conn.execute(
        "UPDATE process_instances SET assigned_position_id = NULL
         WHERE org_id = ?1 AND assigned_position_id = ?2",
        params![org_id, id],
    )?;
    db::record_event(conn, "position_deleted", "position", id, serde_json::json!({}), actor)?;
    Ok(())
}

pub fn assign_user(
    conn: &Connection,
    org_id: &str,
    user_id: &str,
    position_id: &str,
    actor: &str,
) -> StoreResult<UserPosition> {
    let user_id = require(user_id, "user id")?;
    require_exists(conn, "positions", "position", org_id, Some(position_id))?;

    conn.execute(
        "INSERT INTO user_positions (org_id, user_id, position_id) VALUES (?1, ?2, ?3)",
        params![org_id, user_id, position_id],
    )
    .map_err(|e| db::map_constraint(e, "membership", &format!("{user_id}@{position_id}")))?;
    db::record_event(
        conn,
        "user_assigned",
        "position",
        position_id,
        serde_json::json!({ "user_id": user_id }),
        actor,
    )?;

    Ok(UserPosition {
        org_id: org_id.to_string(),
        user_id,
        position_id: position_id.to_string(),
    })
}

pub fn unassign_user(
    conn: &Connection,
    org_id: &str,
    user_id: &str,
    position_id: &str,
    actor: &str,
) -> StoreResult<()> {
    let changed = conn.execute(
        "DELETE FROM user_positions WHERE org_id = ?1 AND user_id = ?2 AND position_id = ?3",
        params![org_id, user_id, position_id],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("membership", format!("{user_id}@{position_id}")));
    }
    db::record_event(
        conn,
        "user_unassigned",
        "position",
        position_id,
        serde_json::json!({ "user_id": user_id }),
        actor,
    )?;
    Ok(())
}

pub fn list_user_positions(conn: &Connection, org_id: &str) -> StoreResult<Vec<UserPosition>> {
    let mut stmt = conn.prepare(
        "SELECT org_id, user_id, position_id FROM user_positions
         WHERE org_id = ?1 ORDER BY user_id, position_id",
    )?;
    let rows = stmt
        .query_map([org_id], |row| {
            Ok(UserPosition {
                org_id: row.get(0)?,
                user_id: row.get(1)?,
                position_id: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============================================================================
// ACTIVITIES & PROCESS INSTANCES
// ============================================================================

pub fn create_activity(
    conn: &Connection,
    org_id: &str,
    input: &ActivityInput,
    actor: &str,
) -> StoreResult<Activity> {
    if let Some(hours) = input.due_date_hours {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(StoreError::Validation(format!(
                "due_date_hours must be positive, got {hours}"
            )));
        }
    }

    let activity = Activity {
        id: uuid::Uuid::new_v4().to_string(),
        org_id: org_id.to_string(),
        name: require(&input.name, "activity name")?,
        due_date_hours: input.due_date_hours,
    };

    conn.execute(
        "INSERT INTO activities (id, org_id, name, due_date_hours) VALUES (?1, ?2, ?3, ?4)",
        params![activity.id, activity.org_id, activity.name, activity.due_date_hours],
    )?;
    db::record_event(
        conn,
        "activity_added",
        "activity",
        &activity.id,
        serde_json::json!({ "org_id": org_id, "name": activity.name }),
        actor,
    )?;
    Ok(activity)
}

pub fn list_activities(conn: &Connection, org_id: &str) -> StoreResult<Vec<Activity>> {
    let mut stmt = conn.prepare(
        "SELECT id, org_id, name, due_date_hours FROM activities WHERE org_id = ?1 ORDER BY name",
    )?;
    let rows = stmt
        .query_map([org_id], |row| {
            Ok(Activity {
                id: row.get(0)?,
                org_id: row.get(1)?,
                name: row.get(2)?,
                due_date_hours: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn row_to_instance(row: &Row<'_>) -> rusqlite::Result<ProcessInstance> {
    let status: String = row.get(4)?;
    let created_at: String = row.get(5)?;

    Ok(ProcessInstance {
        id: row.get(0)?,
        org_id: row.get(1)?,
        process_name: row.get(2)?,
        current_activity_id: row.get(3)?,
        status: status.parse().map_err(|e: StoreError| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.to_string().into())
        })?,
        created_at: parse_timestamp(5, &created_at)?,
        assigned_user_id: row.get(6)?,
        assigned_position_id: row.get(7)?,
        assigned_department_id: row.get(8)?,
    })
}

const INSTANCE_COLUMNS: &str = "SELECT id, org_id, process_name, current_activity_id, status,
    created_at, assigned_user_id, assigned_position_id, assigned_department_id
    FROM process_instances";

pub fn start_instance(
    conn: &Connection,
    org_id: &str,
    input: &InstanceInput,
    actor: &str,
) -> StoreResult<ProcessInstance> {
    let activity_id = non_blank(&input.current_activity_id);
    let department_id = non_blank(&input.assigned_department_id);
    let position_id = non_blank(&input.assigned_position_id);
    require_exists(conn, "activities", "activity", org_id, activity_id)?;
    require_exists(conn, "departments", "department", org_id, department_id)?;
    require_exists(conn, "positions", "position", org_id, position_id)?;

    let instance = ProcessInstance {
        id: uuid::Uuid::new_v4().to_string(),
        org_id: org_id.to_string(),
        process_name: require(&input.process_name, "process name")?,
        current_activity_id: activity_id.map(String::from),
        status: InstanceStatus::Active,
        created_at: input.created_at.unwrap_or_else(Utc::now),
        assigned_user_id: non_blank(&input.assigned_user_id).map(String::from),
        assigned_position_id: position_id.map(String::from),
        assigned_department_id: department_id.map(String::from),
    };

    conn.execute(
        "INSERT INTO process_instances (
            id, org_id, process_name, current_activity_id, status, created_at,
            assigned_user_id, assigned_position_id, assigned_department_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            instance.id,
            instance.org_id,
            instance.process_name,
            instance.current_activity_id,
            instance.status.as_str(),
            db::format_timestamp(instance.created_at),
            instance.assigned_user_id,
            instance.assigned_position_id,
            instance.assigned_department_id,
        ],
    )?;
    db::record_event(
        conn,
        "instance_started",
        "process_instance",
        &instance.id,
        serde_json::json!({ "org_id": org_id, "process": instance.process_name }),
        actor,
    )?;

    info!(org_id, id = %instance.id, "process instance started");
    Ok(instance)
}

/// Move an active instance to `completed` or `cancelled`
pub fn finish_instance(
    conn: &Connection,
    org_id: &str,
    id: &str,
    status: InstanceStatus,
    actor: &str,
) -> StoreResult<ProcessInstance> {
    if status == InstanceStatus::Active {
        return Err(StoreError::Validation("instance is already active".to_string()));
    }

    let changed = conn.execute(
        "UPDATE process_instances SET status = ?1
         WHERE org_id = ?2 AND id = ?3 AND status = 'active'",
        params![status.as_str(), org_id, id],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("active process instance", id));
    }
    db::record_event(
        conn,
        "instance_finished",
        "process_instance",
        id,
        serde_json::json!({ "status": status }),
        actor,
    )?;

    conn.query_row(
        &format!("{INSTANCE_COLUMNS} WHERE org_id = ?1 AND id = ?2"),
        params![org_id, id],
        row_to_instance,
    )
    .map_err(StoreError::from)
}

pub fn list_active_instances(conn: &Connection, org_id: &str) -> StoreResult<Vec<ProcessInstance>> {
    let mut stmt = conn.prepare(&format!(
        "{INSTANCE_COLUMNS} WHERE org_id = ?1 AND status = 'active' ORDER BY created_at"
    ))?;
    let rows = stmt
        .query_map([org_id], row_to_instance)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use chrono::Duration;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn department(conn: &Connection, org: &str, name: &str, parent: Option<&str>) -> Department {
        create_department(
            conn,
            org,
            &DepartmentInput {
                name: name.to_string(),
                parent_id: parent.map(String::from),
            },
            "admin",
        )
        .unwrap()
    }

    #[test]
    fn test_departments_scoped_by_org() {
        let conn = test_conn();
        department(&conn, "o1", "Engineering", None);
        department(&conn, "o2", "Sales", None);

        let o1 = list_departments(&conn, "o1").unwrap();
        assert_eq!(o1.len(), 1);
        assert_eq!(o1[0].name, "Engineering");
    }

    #[test]
    fn test_parent_must_exist_in_same_org() {
        let conn = test_conn();
        let other = department(&conn, "o2", "Sales", None);

        let result = create_department(
            &conn,
            "o1",
            &DepartmentInput {
                name: "Child".to_string(),
                parent_id: Some(other.id),
            },
            "admin",
        );
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_delete_department_reparents_and_unassigns() {
        let conn = test_conn();
        let root = department(&conn, "o1", "Company", None);
        let eng = department(&conn, "o1", "Engineering", Some(&root.id));
        let web = department(&conn, "o1", "Web", Some(&eng.id));
        let dev = create_position(
            &conn,
            "o1",
            &PositionInput {
                title: "Developer".to_string(),
                department_id: Some(eng.id.clone()),
            },
            "admin",
        )
        .unwrap();

        delete_department(&conn, "o1", &eng.id, "admin").unwrap();

        let departments = list_departments(&conn, "o1").unwrap();
        let web_now = departments.iter().find(|d| d.id == web.id).unwrap();
        assert_eq!(web_now.parent_id.as_deref(), Some(root.id.as_str()));

        let positions = list_positions(&conn, "o1").unwrap();
        assert_eq!(positions[0].id, dev.id);
        assert_eq!(positions[0].department_id, None);
    }

    #[test]
    fn test_memberships() {
        let conn = test_conn();
        let eng = department(&conn, "o1", "Engineering", None);
        let dev = create_position(
            &conn,
            "o1",
            &PositionInput {
                title: "Developer".to_string(),
                department_id: Some(eng.id),
            },
            "admin",
        )
        .unwrap();

        assign_user(&conn, "o1", "alice", &dev.id, "admin").unwrap();
        assert!(matches!(
            assign_user(&conn, "o1", "alice", &dev.id, "admin"),
            Err(StoreError::Duplicate { .. })
        ));
        assert!(matches!(
            assign_user(&conn, "o1", "bob", "no-such-position", "admin"),
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(list_user_positions(&conn, "o1").unwrap().len(), 1);

        unassign_user(&conn, "o1", "alice", &dev.id, "admin").unwrap();
        assert!(list_user_positions(&conn, "o1").unwrap().is_empty());
    }

    #[test]
    fn test_instance_lifecycle() {
        let conn = test_conn();
        let review = create_activity(
            &conn,
            "o1",
            &ActivityInput {
                name: "Review".to_string(),
                due_date_hours: Some(8.0),
            },
            "admin",
        )
        .unwrap();

        let created_at = Utc::now() - Duration::hours(3);
        let instance = start_instance(
            &conn,
            "o1",
            &InstanceInput {
                process_name: "Expense approval".to_string(),
                current_activity_id: Some(review.id.clone()),
                created_at: Some(created_at),
                assigned_user_id: Some("alice".to_string()),
                assigned_position_id: None,
                assigned_department_id: None,
            },
            "admin",
        )
        .unwrap();

        let active = list_active_instances(&conn, "o1").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].current_activity_id.as_deref(), Some(review.id.as_str()));
        assert_eq!(active[0].created_at.timestamp(), created_at.timestamp());

        let done = finish_instance(&conn, "o1", &instance.id, InstanceStatus::Completed, "alice")
            .unwrap();
        assert_eq!(done.status, InstanceStatus::Completed);
        assert!(list_active_instances(&conn, "o1").unwrap().is_empty());

        // Finishing twice is rejected
        assert!(matches!(
            finish_instance(&conn, "o1", &instance.id, InstanceStatus::Cancelled, "alice"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_activity_validation() {
        let conn = test_conn();
        let result = create_activity(
            &conn,
            "o1",
            &ActivityInput {
                name: "Sign".to_string(),
                due_date_hours: Some(0.0),
            },
            "admin",
        );
        assert!(matches!(result, Err(StoreError::Validation(_))));
    }

    fn assigned(department: Option<&str>, position: Option<&str>, user: Option<&str>) -> InstanceInput {
        InstanceInput {
            process_name: "Ticket".to_string(),
            current_activity_id: None,
            created_at: None,
            assigned_user_id: user.map(String::from),
            assigned_position_id: position.map(String::from),
            assigned_department_id: department.map(String::from),
        }
    }

    #[test]
    fn test_blank_assignments_stored_as_absent() {
        let conn = test_conn();
        let input = assigned(Some(""), Some("  "), Some("alice"));
        let instance = start_instance(&conn, "o1", &input, "admin").unwrap();

        assert_eq!(instance.assigned_department_id, None);
        assert_eq!(instance.assigned_position_id, None);
        let stored = list_active_instances(&conn, "o1").unwrap();
        assert_eq!(stored[0].assigned_department_id, None);
        assert_eq!(stored[0].assigned_user_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_unknown_assignment_targets_rejected() {
        let conn = test_conn();
        let other_org = department(&conn, "o2", "Sales", None);

        for input in [
            assigned(Some("no-such-dept"), None, None),
            assigned(Some(other_org.id.as_str()), None, None),
            assigned(None, Some("no-such-position"), None),
        ] {
            assert!(matches!(
                start_instance(&conn, "o1", &input, "admin"),
                Err(StoreError::NotFound { .. })
            ));
        }
        assert!(list_active_instances(&conn, "o1").unwrap().is_empty());
    }

    #[test]
    fn test_deletes_clear_instance_assignments() {
        let conn = test_conn();
        let ops = department(&conn, "o1", "Operations", None);
        let agent = create_position(
            &conn,
            "o1",
            &PositionInput {
                title: "Agent".to_string(),
                department_id: Some(ops.id.clone()),
            },
            "admin",
        )
        .unwrap();
        start_instance(&conn, "o1", &assigned(Some(ops.id.as_str()), None, None), "admin").unwrap();
        start_instance(&conn, "o1", &assigned(None, Some(agent.id.as_str()), Some("bob")), "admin").unwrap();

        delete_department(&conn, "o1", &ops.id, "admin").unwrap();
        delete_position(&conn, "o1", &agent.id, "admin").unwrap();

        let instances = list_active_instances(&conn, "o1").unwrap();
        assert_eq!(instances.len(), 2);
        assert!(instances.iter().all(|i| i.assigned_department_id.is_none()));
        assert!(instances.iter().all(|i| i.assigned_position_id.is_none()));
        assert!(instances.iter().any(|i| i.assigned_user_id.as_deref() == Some("bob")));
    }
}
