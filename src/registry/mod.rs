pub mod db;

pub use db::{CutoverDb, StatusUpdate, ValidationWriteback};

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::errors::CutoverError;
use crate::models::{CutoverTable, TableStatus};

/// Shared handle to the coordinator database. SQLite access is blocking, so
/// every call hops to the blocking pool and serializes on a mutex.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<Mutex<CutoverDb>>,
}

impl DbHandle {
    pub fn new(path: &Path) -> Result<Self, CutoverError> {
        Ok(Self {
            inner: Arc::new(Mutex::new(CutoverDb::new(path)?)),
        })
    }

    pub fn in_memory() -> Result<Self, CutoverError> {
        Ok(Self {
            inner: Arc::new(Mutex::new(CutoverDb::new_in_memory()?)),
        })
    }

    pub async fn call<F, R>(&self, f: F) -> Result<R, CutoverError>
    where
        F: FnOnce(&CutoverDb) -> Result<R, CutoverError> + Send + 'static,
        R: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let db = inner
                .lock()
                .map_err(|_| CutoverError::Internal(anyhow::anyhow!("Database lock poisoned")))?;
            f(&db)
        })
        .await
        .map_err(|e| CutoverError::Internal(anyhow::anyhow!("Database task failed: {}", e)))?
    }
}

/// Async facade over the table collection. Status changes go through the
/// compare-and-set in [`CutoverDb::update_status`]; everything else is reads
/// plus the idempotent upsert.
#[derive(Clone)]
pub struct CutoverRegistry {
    db: DbHandle,
}

impl CutoverRegistry {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    pub fn handle(&self) -> DbHandle {
        self.db.clone()
    }

    /// Add a table to the migration plan. Safe to repeat.
    pub async fn register(&self, name: String) -> Result<CutoverTable, CutoverError> {
        self.db
            .call(move |db| db.upsert_table(&CutoverTable::new(&name)))
            .await
    }

    pub async fn get(&self, name: &str) -> Result<Option<CutoverTable>, CutoverError> {
        let name = name.to_string();
        self.db.call(move |db| db.get_table(&name)).await
    }

    pub async fn require(&self, name: &str) -> Result<CutoverTable, CutoverError> {
        let name = name.to_string();
        self.db.call(move |db| db.require_table(&name)).await
    }

    pub async fn list(&self) -> Result<Vec<CutoverTable>, CutoverError> {
        self.db.call(|db| db.list_tables()).await
    }

    pub async fn update_status(
        &self,
        name: &str,
        expected_version: i64,
        status: TableStatus,
        update: StatusUpdate,
    ) -> Result<CutoverTable, CutoverError> {
        let name = name.to_string();
        self.db
            .call(move |db| db.update_status(&name, expected_version, status, &update))
            .await
    }
}
