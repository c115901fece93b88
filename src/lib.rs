// Org Ledger - Core Library
// Expense tracking and org-chart health, shared by the CLI, API server, and tests

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod logging;
pub mod org;
pub mod realtime;
pub mod store;
pub mod summary;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::Config;
pub use db::{open_database, setup_database, Event};
pub use entities::{
    Category, CategoryInput, ImportReport, Provider, ProviderInput, Transaction,
    TransactionFilter, TransactionInput, TransactionType, DEFAULT_CATEGORIES,
};
pub use error::{StoreError, StoreResult};
pub use org::{
    build_org_chart, compute_department_health, Activity, Department, DepartmentHealth,
    HealthMap, HealthThresholds, OrgChart, Position, ProcessInstance, UserPosition,
};
pub use realtime::{Change, ChangeFeed, ChangeKind, LiveView, Notification, Subscription, Table};
pub use store::Store;
pub use summary::{summarize, Period, Summary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
