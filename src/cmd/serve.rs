//! Coordinator server and project initialization: `cutover serve` / `cutover init`.

use std::path::Path;

use crate::config::CutoverConfig;
use crate::errors::CutoverError;
use crate::registry::DbHandle;
use crate::server::{ServerConfig, start_server};

pub async fn cmd_serve(
    project_dir: &Path,
    port: u16,
    dev: bool,
    seed: bool,
) -> Result<(), CutoverError> {
    let config = CutoverConfig::load(project_dir)?;
    start_server(
        config,
        ServerConfig {
            port,
            dev_mode: dev,
            seed_demo_data: seed,
        },
    )
    .await?;
    Ok(())
}

/// Write a default `cutover.toml` and create the coordinator database.
pub fn cmd_init(project_dir: &Path) -> Result<(), CutoverError> {
    let config_path = CutoverConfig::init(project_dir)?;
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
    DbHandle::new(&db_path)?;
    println!("Configuration written to {}", config_path.display());
    println!("Coordinator database initialized at {}", db_path.display());
    Ok(())
}
