use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::errors::CutoverError;

/// Read-only view onto one side of the migration. The coordinator never
/// mutates application data; it only counts rows and hashes key ranges.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Human-readable name for error reporting ("legacy", "new").
    fn name(&self) -> &str;

    /// Total rows in `table`.
    async fn count(&self, table: &str) -> Result<i64, CutoverError>;

    /// Order-insensitive digest of the rows whose keys fall in
    /// `[start, end)`. `None` bounds are unbounded.
    async fn checksum(
        &self,
        table: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<String, CutoverError>;

    /// Key at sorted position `offset`, or `None` past the last row.
    /// Batch scans use consecutive offsets as half-open `checksum` bounds.
    async fn key_at(&self, table: &str, offset: i64) -> Result<Option<String>, CutoverError>;
}

/// The two sides of a cutover, bundled so components take one argument.
#[derive(Clone)]
pub struct StorePair {
    pub legacy: Arc<dyn StoreAdapter>,
    pub new: Arc<dyn StoreAdapter>,
}

impl StorePair {
    pub fn new(legacy: Arc<dyn StoreAdapter>, new: Arc<dyn StoreAdapter>) -> Self {
        Self { legacy, new }
    }
}

/// In-memory store backed by BTreeMaps. Serves as the adapter used by the
/// CLI demo plan and by tests; rows are key -> opaque payload.
#[derive(Clone)]
pub struct MemoryStore {
    name: String,
    tables: Arc<Mutex<BTreeMap<String, BTreeMap<String, String>>>>,
    failing: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tables: Arc::new(Mutex::new(BTreeMap::new())),
            failing: Arc::new(Mutex::new(false)),
        }
    }

    pub fn insert(&self, table: &str, key: &str, value: &str) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, table: &str, key: &str) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(rows) = tables.get_mut(table) {
            rows.remove(key);
        }
    }

    /// Populate `table` with `count` synthetic rows.
    pub fn seed(&self, table: &str, count: usize) {
        for i in 0..count {
            self.insert(table, &format!("{:08}", i), &format!("row-{}", i));
        }
    }

    /// Make every subsequent call fail, simulating an outage.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    fn check_available(&self) -> Result<(), CutoverError> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(CutoverError::StoreUnavailable {
                store: self.name.clone(),
                message: "store is unreachable".to_string(),
            });
        }
        Ok(())
    }
}

/// Deterministic fixture data for the demo plan. `orders` is deliberately
/// short 50 rows on the new side so drift handling can be exercised
/// end to end; every other table agrees.
pub fn demo_pair() -> StorePair {
    let legacy = MemoryStore::new("legacy");
    let new = MemoryStore::new("new");
    for (table, legacy_rows, new_rows) in [
        ("users", 1000, 1000),
        ("orders", 1000, 950),
        ("projects", 500, 500),
        ("ideas", 800, 800),
        ("billing", 200, 200),
    ] {
        legacy.seed(table, legacy_rows);
        new.seed(table, new_rows);
    }
    StorePair::new(Arc::new(legacy), Arc::new(new))
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn count(&self, table: &str) -> Result<i64, CutoverError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tables.get(table).map(|rows| rows.len() as i64).unwrap_or(0))
    }

    async fn checksum(
        &self,
        table: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<String, CutoverError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let mut hasher = Sha256::new();
        if let Some(rows) = tables.get(table) {
            for (key, value) in rows.iter() {
                if start.is_some_and(|s| key.as_str() < s) {
                    continue;
                }
                if end.is_some_and(|e| key.as_str() >= e) {
                    break;
                }
                hasher.update(key.as_bytes());
                hasher.update(b"\0");
                hasher.update(value.as_bytes());
                hasher.update(b"\n");
            }
        }
        Ok(format!("{:x}", hasher.finalize()))
    }

    async fn key_at(&self, table: &str, offset: i64) -> Result<Option<String>, CutoverError> {
        self.check_available()?;
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        if offset < 0 {
            return Ok(None);
        }
        Ok(tables
            .get(table)
            .and_then(|rows| rows.keys().nth(offset as usize).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_and_checksums_agree_for_identical_data() {
        let legacy = MemoryStore::new("legacy");
        let new = MemoryStore::new("new");
        legacy.seed("orders", 100);
        new.seed("orders", 100);

        assert_eq!(legacy.count("orders").await.unwrap(), 100);
        assert_eq!(
            legacy.checksum("orders", None, None).await.unwrap(),
            new.checksum("orders", None, None).await.unwrap()
        );
    }

    #[tokio::test]
    async fn checksum_diverges_on_modified_row() {
        let legacy = MemoryStore::new("legacy");
        let new = MemoryStore::new("new");
        legacy.seed("orders", 10);
        new.seed("orders", 10);
        new.insert("orders", "00000003", "tampered");

        assert_ne!(
            legacy.checksum("orders", None, None).await.unwrap(),
            new.checksum("orders", None, None).await.unwrap()
        );
    }

    #[tokio::test]
    async fn checksum_respects_key_range() {
        let store = MemoryStore::new("legacy");
        store.seed("orders", 10);
        let head = store
            .checksum("orders", None, Some("00000005"))
            .await
            .unwrap();
        let tail = store
            .checksum("orders", Some("00000005"), None)
            .await
            .unwrap();
        assert_ne!(head, tail);

        store.insert("orders", "00000009", "changed");
        // Only the tail range covers the changed key.
        assert_eq!(
            store.checksum("orders", None, Some("00000005")).await.unwrap(),
            head
        );
        assert_ne!(
            store.checksum("orders", Some("00000005"), None).await.unwrap(),
            tail
        );
    }

    #[tokio::test]
    async fn key_at_walks_sorted_positions() {
        let store = MemoryStore::new("legacy");
        store.seed("orders", 3);
        assert_eq!(
            store.key_at("orders", 0).await.unwrap().as_deref(),
            Some("00000000")
        );
        assert_eq!(
            store.key_at("orders", 2).await.unwrap().as_deref(),
            Some("00000002")
        );
        assert_eq!(store.key_at("orders", 3).await.unwrap(), None);
        assert_eq!(store.key_at("ghost", 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failing_store_reports_unavailable() {
        let store = MemoryStore::new("legacy");
        store.seed("orders", 5);
        store.set_failing(true);
        let err = store.count("orders").await.unwrap_err();
        assert!(matches!(err, CutoverError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn missing_table_counts_zero() {
        let store = MemoryStore::new("legacy");
        assert_eq!(store.count("ghost").await.unwrap(), 0);
    }
}
