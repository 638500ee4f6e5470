//! CLI command implementations.
//!
//! | Module      | Commands handled                                        |
//! |-------------|---------------------------------------------------------|
//! | `serve`     | `Serve`, `Init`                                         |
//! | `plan`      | `Plan Add`, `List`, `Show`                              |
//! | `lifecycle` | `Prepare`, `Gate`, `Cutover`, `Complete`, `Rollback`, `Retry` |
//! | `inspect`   | `Windows`, `Jobs`                                       |

pub mod inspect;
pub mod lifecycle;
pub mod plan;
pub mod serve;

pub use inspect::{cmd_jobs, cmd_windows};
pub use lifecycle::{
    cmd_complete, cmd_cutover, cmd_gate, cmd_prepare, cmd_retry, cmd_rollback,
};
pub use plan::{cmd_list, cmd_plan_add, cmd_show};
pub use serve::{cmd_init, cmd_serve};

use std::path::Path;

use crate::api::SharedState;
use crate::config::CutoverConfig;
use crate::errors::CutoverError;
use crate::registry::DbHandle;
use crate::server::build_state;
use crate::store::demo_pair;

/// Assemble the coordinator against the project's database and the demo
/// store pair. Every non-serve command goes through here.
pub(crate) fn engine(project_dir: &Path) -> Result<SharedState, CutoverError> {
    let config = CutoverConfig::load(project_dir)?;
    let db_path = if config.coordinator.db_path.is_absolute() {
        config.coordinator.db_path.clone()
    } else {
        project_dir.join(&config.coordinator.db_path)
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            CutoverError::Internal(anyhow::anyhow!("Failed to create database directory: {}", e))
        })?;
    }
    let db = DbHandle::new(&db_path)?;
    Ok(build_state(&config, db, demo_pair()))
}
