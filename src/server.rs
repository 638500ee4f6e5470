use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::api::{self, AppState, SharedState};
use crate::checklist::ChecklistManager;
use crate::config::CutoverConfig;
use crate::freeze::FreezeScheduler;
use crate::orchestrator::CutoverOrchestrator;
use crate::reconcile::ReconciliationRunner;
use crate::registry::{CutoverRegistry, DbHandle};
use crate::store::{MemoryStore, StorePair};
use crate::validator::ConsistencyValidator;

/// Runtime options for the coordinator server.
pub struct ServerConfig {
    pub port: u16,
    pub dev_mode: bool,
    pub seed_demo_data: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3240,
            dev_mode: false,
            seed_demo_data: false,
        }
    }
}

/// Wire every component against one database handle and one store pair.
pub fn build_state(config: &CutoverConfig, db: DbHandle, stores: StorePair) -> SharedState {
    let registry = CutoverRegistry::new(db.clone());
    let orchestrator = CutoverOrchestrator::new(
        registry,
        ChecklistManager::new(db.clone()),
        ConsistencyValidator::new(
            db.clone(),
            stores.clone(),
            config.validation.drift_epsilon_percent,
            config.relations.clone(),
        ),
        FreezeScheduler::new(db.clone()),
        ReconciliationRunner::new(db, stores, config.reconciliation.batch_size as i64),
        config.cutover.freeze_window_minutes,
        config.validation.stabilization_hours,
        config.validation.drift_epsilon_percent,
    );
    Arc::new(AppState { orchestrator })
}

pub fn build_router(state: SharedState) -> Router {
    api::api_router().with_state(state)
}

/// Start the coordinator server. Until real store adapters are plugged in,
/// both sides are in-memory stores, optionally seeded with demo tables.
pub async fn start_server(config: CutoverConfig, server: ServerConfig) -> Result<()> {
    if let Some(parent) = config.coordinator.db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = DbHandle::new(&config.coordinator.db_path)
        .context("Failed to initialize coordinator database")?;

    let stores = if server.seed_demo_data {
        info!("using demo-seeded in-memory stores");
        crate::store::demo_pair()
    } else {
        StorePair::new(
            Arc::new(MemoryStore::new("legacy")),
            Arc::new(MemoryStore::new("new")),
        )
    };

    let state = build_state(&config, db, stores);
    let mut app = build_router(state);
    if server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if server.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!("cutover coordinator listening at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn router_builds_from_default_config() {
        let config = CutoverConfig::default();
        let db = DbHandle::in_memory().unwrap();
        let legacy = MemoryStore::new("legacy");
        let new = MemoryStore::new("new");
        let state = build_state(
            &config,
            db,
            StorePair::new(Arc::new(legacy), Arc::new(new)),
        );
        let app = build_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
