//! Configuration for the cutover coordinator.
//!
//! Reads `cutover.toml` from the project directory and layers environment
//! overrides on top, file first, then environment, then CLI flags. All tunables have
//! defaults so a bare directory works out of the box.
//!
//! ```toml
//! [coordinator]
//! db_path = ".cutover/cutover.db"
//!
//! [validation]
//! drift_epsilon_percent = 0.5
//! stabilization_hours = 24
//!
//! [cutover]
//! freeze_window_minutes = 120
//!
//! [reconciliation]
//! batch_size = 500
//!
//! [[relations]]
//! table = "orders"
//! column = "user_id"
//! parent_table = "users"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::ForeignKeyRelation;

pub const CONFIG_FILE: &str = "cutover.toml";

fn default_db_path() -> PathBuf {
    PathBuf::from(".cutover/cutover.db")
}

fn default_drift_epsilon() -> f64 {
    0.5
}

fn default_stabilization_hours() -> i64 {
    24
}

fn default_freeze_window_minutes() -> i64 {
    120
}

fn default_batch_size() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSection {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSection {
    /// Maximum drift percentage considered consistent.
    #[serde(default = "default_drift_epsilon")]
    pub drift_epsilon_percent: f64,
    /// How long a table must stay in cutover with clean reconciliation
    /// before write_source may flip to the new store.
    #[serde(default = "default_stabilization_hours")]
    pub stabilization_hours: i64,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            drift_epsilon_percent: default_drift_epsilon(),
            stabilization_hours: default_stabilization_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutoverSection {
    /// Bounded duration of the freeze window created per cutover attempt.
    #[serde(default = "default_freeze_window_minutes")]
    pub freeze_window_minutes: i64,
}

impl Default for CutoverSection {
    fn default() -> Self {
        Self { freeze_window_minutes: default_freeze_window_minutes() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationSection {
    /// Records compared per batch; the cancellation signal is observed
    /// between batches.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
}

impl Default for ReconciliationSection {
    fn default() -> Self {
        Self { batch_size: default_batch_size() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CutoverConfig {
    #[serde(default)]
    pub coordinator: CoordinatorSection,
    #[serde(default)]
    pub validation: ValidationSection,
    #[serde(default)]
    pub cutover: CutoverSection,
    #[serde(default)]
    pub reconciliation: ReconciliationSection,
    /// Foreign-key relations checked during validation.
    #[serde(default)]
    pub relations: Vec<ForeignKeyRelation>,
}

impl CutoverConfig {
    /// Load from `<project_dir>/cutover.toml`, falling back to defaults when
    /// the file does not exist, then apply environment overrides.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("CUTOVER_DB_PATH") {
            self.coordinator.db_path = PathBuf::from(path);
        }
        if let Ok(eps) = std::env::var("CUTOVER_DRIFT_EPSILON")
            && let Ok(eps) = eps.parse::<f64>()
        {
            self.validation.drift_epsilon_percent = eps;
        }
        if let Ok(hours) = std::env::var("CUTOVER_STABILIZATION_HOURS")
            && let Ok(hours) = hours.parse::<i64>()
        {
            self.validation.stabilization_hours = hours;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.validation.drift_epsilon_percent < 0.0 {
            anyhow::bail!(
                "drift_epsilon_percent must be non-negative, got {}",
                self.validation.drift_epsilon_percent
            );
        }
        if self.cutover.freeze_window_minutes <= 0 {
            anyhow::bail!(
                "freeze_window_minutes must be positive, got {}",
                self.cutover.freeze_window_minutes
            );
        }
        if self.reconciliation.batch_size == 0 {
            anyhow::bail!("batch_size must be positive");
        }
        Ok(())
    }

    /// Write a default config file. Refuses to overwrite an existing one.
    pub fn init(project_dir: &Path) -> Result<PathBuf> {
        let path = project_dir.join(CONFIG_FILE);
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
        let content = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn relations_for(&self, table: &str) -> Vec<ForeignKeyRelation> {
        self.relations
            .iter()
            .filter(|r| r.table == table)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_no_file() {
        let dir = tempdir().unwrap();
        let config = CutoverConfig::load(dir.path()).unwrap();
        assert_eq!(config.validation.drift_epsilon_percent, 0.5);
        assert_eq!(config.validation.stabilization_hours, 24);
        assert_eq!(config.cutover.freeze_window_minutes, 120);
        assert_eq!(config.reconciliation.batch_size, 500);
        assert!(config.relations.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
[validation]
drift_epsilon_percent = 1.5
stabilization_hours = 48

[[relations]]
table = "orders"
column = "user_id"
parent_table = "users"
"#,
        )
        .unwrap();
        let config = CutoverConfig::load(dir.path()).unwrap();
        assert_eq!(config.validation.drift_epsilon_percent, 1.5);
        assert_eq!(config.validation.stabilization_hours, 48);
        // Unspecified sections keep defaults
        assert_eq!(config.reconciliation.batch_size, 500);
        assert_eq!(config.relations_for("orders").len(), 1);
        assert_eq!(config.relations_for("orders")[0].parent_table, "users");
        assert!(config.relations_for("users").is_empty());
    }

    #[test]
    fn test_rejects_negative_epsilon() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[validation]\ndrift_epsilon_percent = -1.0\n",
        )
        .unwrap();
        assert!(CutoverConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_init_writes_parseable_default() {
        let dir = tempdir().unwrap();
        let path = CutoverConfig::init(dir.path()).unwrap();
        assert!(path.exists());
        let config = CutoverConfig::load(dir.path()).unwrap();
        assert_eq!(config.validation.drift_epsilon_percent, 0.5);
        // A second init must not clobber the file
        assert!(CutoverConfig::init(dir.path()).is_err());
    }
}
