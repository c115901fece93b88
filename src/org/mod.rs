// Org Chart / BPM viewer
//
// Departments form a tree, positions hang off departments, users hold
// positions, and workflow instances wait on activities. The health roll-up
// joins all of it per department.

pub mod model;
pub mod store;
pub mod health;
pub mod chart;

pub use model::{
    Activity, ActivityInput, Department, DepartmentInput, InstanceInput, InstanceStatus, Position,
    PositionInput, ProcessInstance, UserPosition,
};
pub use health::{
    compute_department_health, seed_departments, DepartmentHealth, HealthMap, HealthThresholds,
    OrgIndex,
};
pub use chart::{build_org_chart, OrgChart, OrgNode, PositionNode};
