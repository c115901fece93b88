// 🗄️ Store - the data client every surface talks to
//
// Owns the single SQLite connection and the change feed. Each mutation runs
// against the connection, then publishes one change scoped to the owning
// user (expense tables) or organization (org tables).

use crate::config::OrgConfig;
use crate::db::{self, Event};
use crate::entities::{
    category, provider, transaction, Category, CategoryInput, ImportReport, Provider,
    ProviderInput, Transaction, TransactionFilter, TransactionInput, TransactionType,
};
use crate::error::{StoreError, StoreResult};
use crate::org::{
    self, build_org_chart, compute_department_health, seed_departments, Activity, ActivityInput,
    Department, DepartmentInput, HealthMap, HealthThresholds, InstanceInput, InstanceStatus,
    OrgChart, OrgIndex, Position, PositionInput, ProcessInstance, UserPosition,
};
use crate::realtime::{Change, ChangeFeed, ChangeKind, Subscription, Table};
use crate::summary::{self, Period, Summary};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub struct Store {
    conn: Mutex<Connection>,
    feed: ChangeFeed,
    thresholds: HealthThresholds,
}

/// Everything the health roll-up needs for one org
#[derive(Debug, Clone, Default)]
pub struct OrgSnapshot {
    pub departments: Vec<Department>,
    pub positions: Vec<Position>,
    pub user_positions: Vec<UserPosition>,
    pub activities: Vec<Activity>,
    pub instances: Vec<ProcessInstance>,
}

impl Store {
    pub fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::from_connection(db::open_database(path)?))
    }

    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        db::setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Store {
            conn: Mutex::new(conn),
            feed: ChangeFeed::default(),
            thresholds: HealthThresholds::default(),
        }
    }

    pub fn with_org_config(mut self, config: &OrgConfig) -> Self {
        self.thresholds = HealthThresholds::from(config);
        self
    }

    pub fn thresholds(&self) -> HealthThresholds {
        self.thresholds
    }

    pub fn subscribe(&self, tables: &[Table], scope: &str) -> Subscription {
        self.feed.subscribe(tables, scope)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn notify(&self, table: Table, scope: &str, kind: ChangeKind, row_id: Option<&str>) {
        self.feed.publish(Change::new(table, scope, kind, row_id));
    }

    pub fn events_for(&self, entity_type: &str, entity_id: &str) -> StoreResult<Vec<Event>> {
        db::get_events_for_entity(&*self.conn()?, entity_type, entity_id)
    }

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    pub fn create_transaction(&self, user_id: &str, input: &TransactionInput) -> StoreResult<Transaction> {
        let tx = transaction::create_transaction(&*self.conn()?, user_id, input)?;
        self.notify(Table::Transactions, user_id, ChangeKind::Insert, Some(&tx.id));
        Ok(tx)
    }

    pub fn get_transaction(&self, user_id: &str, id: &str) -> StoreResult<Transaction> {
        transaction::get_transaction(&*self.conn()?, user_id, id)
    }

    pub fn update_transaction(
        &self,
        user_id: &str,
        id: &str,
        input: &TransactionInput,
    ) -> StoreResult<Transaction> {
        let tx = transaction::update_transaction(&*self.conn()?, user_id, id, input)?;
        self.notify(Table::Transactions, user_id, ChangeKind::Update, Some(id));
        Ok(tx)
    }

    pub fn delete_transaction(&self, user_id: &str, id: &str) -> StoreResult<()> {
        transaction::delete_transaction(&*self.conn()?, user_id, id)?;
        self.notify(Table::Transactions, user_id, ChangeKind::Delete, Some(id));
        Ok(())
    }

    pub fn list_transactions(&self, user_id: &str, filter: &TransactionFilter) -> StoreResult<Vec<Transaction>> {
        let rows = transaction::list_transactions(&*self.conn()?, user_id, filter)?;
        debug!(user_id, count = rows.len(), "transactions fetched");
        Ok(rows)
    }

    pub fn import_csv(&self, user_id: &str, csv_path: &Path) -> StoreResult<ImportReport> {
        let report = transaction::import_csv(&*self.conn()?, user_id, csv_path)?;
        if report.inserted > 0 {
            self.notify(Table::Transactions, user_id, ChangeKind::Insert, None);
        }
        Ok(report)
    }

    pub fn summary(&self, user_id: &str, filter: &TransactionFilter, period: Period) -> StoreResult<Summary> {
        let rows = self.list_transactions(user_id, filter)?;
        Ok(summary::summarize(&rows, period))
    }

    // ========================================================================
    // CATEGORIES & PROVIDERS
    // ========================================================================

    pub fn list_categories(&self, user_id: &str) -> StoreResult<Vec<Category>> {
        category::list_categories(&*self.conn()?, user_id)
    }

    pub fn create_category(&self, user_id: &str, input: &CategoryInput) -> StoreResult<Category> {
        let created = category::create_category(&*self.conn()?, user_id, input)?;
        self.notify(Table::Categories, user_id, ChangeKind::Insert, Some(&created.name));
        Ok(created)
    }

    pub fn delete_category(&self, user_id: &str, name: &str, category_type: TransactionType) -> StoreResult<()> {
        category::delete_category(&*self.conn()?, user_id, name, category_type)?;
        self.notify(Table::Categories, user_id, ChangeKind::Delete, Some(name));
        Ok(())
    }

    pub fn list_providers(&self, user_id: &str) -> StoreResult<Vec<Provider>> {
        provider::list_providers(&*self.conn()?, user_id)
    }

    pub fn create_provider(&self, user_id: &str, input: &ProviderInput) -> StoreResult<Provider> {
        let created = provider::create_provider(&*self.conn()?, user_id, input)?;
        self.notify(Table::Providers, user_id, ChangeKind::Insert, Some(&created.id));
        Ok(created)
    }

    pub fn rename_provider(&self, user_id: &str, id: &str, input: &ProviderInput) -> StoreResult<Provider> {
        let renamed = provider::rename_provider(&*self.conn()?, user_id, id, input)?;
        self.notify(Table::Providers, user_id, ChangeKind::Update, Some(id));
        Ok(renamed)
    }

    pub fn delete_provider(&self, user_id: &str, id: &str) -> StoreResult<()> {
        provider::delete_provider(&*self.conn()?, user_id, id)?;
        self.notify(Table::Providers, user_id, ChangeKind::Delete, Some(id));
        Ok(())
    }

    // ========================================================================
    // ORG CHART
    // ========================================================================

    pub fn create_department(&self, org_id: &str, input: &DepartmentInput, actor: &str) -> StoreResult<Department> {
        let created = org::store::create_department(&*self.conn()?, org_id, input, actor)?;
        self.notify(Table::Departments, org_id, ChangeKind::Insert, Some(&created.id));
        Ok(created)
    }

    pub fn delete_department(&self, org_id: &str, id: &str, actor: &str) -> StoreResult<()> {
        org::store::delete_department(&*self.conn()?, org_id, id, actor)?;
        self.notify(Table::Departments, org_id, ChangeKind::Delete, Some(id));
        Ok(())
    }

    pub fn list_departments(&self, org_id: &str) -> StoreResult<Vec<Department>> {
        org::store::list_departments(&*self.conn()?, org_id)
    }

    pub fn create_position(&self, org_id: &str, input: &PositionInput, actor: &str) -> StoreResult<Position> {
        let created = org::store::create_position(&*self.conn()?, org_id, input, actor)?;
        self.notify(Table::Positions, org_id, ChangeKind::Insert, Some(&created.id));
        Ok(created)
    }

    pub fn delete_position(&self, org_id: &str, id: &str, actor: &str) -> StoreResult<()> {
        org::store::delete_position(&*self.conn()?, org_id, id, actor)?;
        self.notify(Table::Positions, org_id, ChangeKind::Delete, Some(id));
        Ok(())
    }

    pub fn list_positions(&self, org_id: &str) -> StoreResult<Vec<Position>> {
        org::store::list_positions(&*self.conn()?, org_id)
    }

    pub fn assign_user(&self, org_id: &str, user_id: &str, position_id: &str, actor: &str) -> StoreResult<UserPosition> {
        let membership = org::store::assign_user(&*self.conn()?, org_id, user_id, position_id, actor)?;
        self.notify(Table::UserPositions, org_id, ChangeKind::Insert, Some(position_id));
        Ok(membership)
    }

    pub fn unassign_user(&self, org_id: &str, user_id: &str, position_id: &str, actor: &str) -> StoreResult<()> {
        org::store::unassign_user(&*self.conn()?, org_id, user_id, position_id, actor)?;
        self.notify(Table::UserPositions, org_id, ChangeKind::Delete, Some(position_id));
        Ok(())
    }

    pub fn list_user_positions(&self, org_id: &str) -> StoreResult<Vec<UserPosition>> {
        org::store::list_user_positions(&*self.conn()?, org_id)
    }

    pub fn create_activity(&self, org_id: &str, input: &ActivityInput, actor: &str) -> StoreResult<Activity> {
        let created = org::store::create_activity(&*self.conn()?, org_id, input, actor)?;
        self.notify(Table::Activities, org_id, ChangeKind::Insert, Some(&created.id));
        Ok(created)
    }

    pub fn list_activities(&self, org_id: &str) -> StoreResult<Vec<Activity>> {
        org::store::list_activities(&*self.conn()?, org_id)
    }

    pub fn start_instance(&self, org_id: &str, input: &InstanceInput, actor: &str) -> StoreResult<ProcessInstance> {
        let created = org::store::start_instance(&*self.conn()?, org_id, input, actor)?;
        self.notify(Table::ProcessInstances, org_id, ChangeKind::Insert, Some(&created.id));
        Ok(created)
    }

    pub fn finish_instance(
        &self,
        org_id: &str,
        id: &str,
        status: InstanceStatus,
        actor: &str,
    ) -> StoreResult<ProcessInstance> {
        let finished = org::store::finish_instance(&*self.conn()?, org_id, id, status, actor)?;
        self.notify(Table::ProcessInstances, org_id, ChangeKind::Update, Some(id));
        Ok(finished)
    }

    pub fn list_active_instances(&self, org_id: &str) -> StoreResult<Vec<ProcessInstance>> {
        org::store::list_active_instances(&*self.conn()?, org_id)
    }

    /// Fetch every org table in one lock
    pub fn org_snapshot(&self, org_id: &str) -> StoreResult<OrgSnapshot> {
        let conn = self.conn()?;
        let snapshot = OrgSnapshot {
            departments: org::store::list_departments(&conn, org_id)?,
            positions: org::store::list_positions(&conn, org_id)?,
            user_positions: org::store::list_user_positions(&conn, org_id)?,
            activities: org::store::list_activities(&conn, org_id)?,
            instances: org::store::list_active_instances(&conn, org_id)?,
        };
        debug!(
            org_id,
            departments = snapshot.departments.len(),
            instances = snapshot.instances.len(),
            "org snapshot fetched"
        );
        Ok(snapshot)
    }

    /// Health per department, every known department included
    pub fn department_health(&self, org_id: &str, now: DateTime<Utc>) -> StoreResult<HealthMap> {
        let snapshot = self.org_snapshot(org_id)?;
        Ok(health_from_snapshot(&snapshot, now, &self.thresholds))
    }

    pub fn org_chart(&self, org_id: &str, now: DateTime<Utc>) -> StoreResult<OrgChart> {
        let snapshot = self.org_snapshot(org_id)?;
        let health = health_from_snapshot(&snapshot, now, &self.thresholds);
        Ok(build_org_chart(
            &snapshot.departments,
            &snapshot.positions,
            &snapshot.user_positions,
            Some(&health),
        ))
    }
}

pub fn health_from_snapshot(
    snapshot: &OrgSnapshot,
    now: DateTime<Utc>,
    thresholds: &HealthThresholds,
) -> HealthMap {
    let index = OrgIndex::build(&snapshot.positions, &snapshot.user_positions);
    let mut health =
        compute_department_health(&snapshot.activities, &snapshot.instances, &index, now, thresholds);
    seed_departments(&mut health, &snapshot.departments);
    // Only departments that still exist are reported
    health.retain(|id, _| snapshot.departments.iter().any(|d| &d.id == id));
    health
}
