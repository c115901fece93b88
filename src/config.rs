//! Configuration file handling.
//!
//! Settings are read from `org-ledger.toml`. Every field has a default, so a
//! missing file or a partial file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "org-ledger.toml";

/// Environment variable overriding `[database] path`.
pub const DB_PATH_ENV: &str = "ORG_LEDGER_DB";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub server: ServerConfig,

    /// Department health thresholds.
    #[serde(default)]
    pub org: OrgConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("org-ledger.db")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Address the REST server listens on.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrgConfig {
    /// Due window for activities that do not declare `due_date_hours`.
    #[serde(default = "default_due_hours")]
    pub default_due_hours: f64,

    /// Tasks with at most this many hours left are near due.
    #[serde(default = "default_near_due_hours")]
    pub near_due_hours: f64,
}

impl Default for OrgConfig {
    fn default() -> Self {
        Self {
            default_due_hours: default_due_hours(),
            near_due_hours: default_near_due_hours(),
        }
    }
}

fn default_due_hours() -> f64 {
    24.0
}

fn default_near_due_hours() -> f64 {
    4.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `org-ledger.toml` in the
    /// working directory is used when present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load_from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(db_path) = std::env::var(DB_PATH_ENV) {
            if !db_path.is_empty() {
                config.database.path = PathBuf::from(db_path);
            }
        }

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.org.default_due_hours > 0.0) {
            anyhow::bail!("org.default_due_hours must be positive");
        }
        if !(self.org.near_due_hours >= 0.0) {
            anyhow::bail!("org.near_due_hours must not be negative");
        }
        Ok(())
    }

    /// Default configuration rendered as TOML, used by `config-init`.
    pub fn default_toml() -> String {
        r#"# org-ledger configuration

[database]
# SQLite file (overridden by ORG_LEDGER_DB or --db)
path = "org-ledger.db"

[server]
bind = "0.0.0.0:3000"

[org]
# Due window for activities without due_date_hours
default_due_hours = 24
# Hours before the due threshold at which a task counts as near due
near_due_hours = 4

[logging]
# Used when RUST_LOG is not set
level = "info"
"#
        .to_string()
    }
}
