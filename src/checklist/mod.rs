use crate::errors::CutoverError;
use crate::models::{ChecklistGate, CutoverChecklist};
use crate::registry::DbHandle;

/// Pre-cutover readiness gates. Eight independent booleans per table; the
/// checklist becomes immutable once the last gate is checked.
#[derive(Clone)]
pub struct ChecklistManager {
    db: DbHandle,
}

impl ChecklistManager {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    /// Seed a checklist with every gate unchecked. Idempotent.
    pub async fn create(&self, table: &str) -> Result<CutoverChecklist, CutoverError> {
        let table = table.to_string();
        self.db.call(move |db| db.create_checklist(&table)).await
    }

    pub async fn get(&self, table: &str) -> Result<Option<CutoverChecklist>, CutoverError> {
        let table = table.to_string();
        self.db.call(move |db| db.get_checklist(&table)).await
    }

    /// Check one gate off. Gates only move false -> true; a completed
    /// checklist silently ignores further writes.
    pub async fn set_gate(
        &self,
        table: &str,
        gate: ChecklistGate,
        completed_by: &str,
    ) -> Result<CutoverChecklist, CutoverError> {
        let table = table.to_string();
        let completed_by = completed_by.to_string();
        self.db
            .call(move |db| db.set_gate(&table, gate, &completed_by))
            .await
    }

    /// True when all eight gates are checked. Missing checklist reads as
    /// not ready rather than an error.
    pub async fn is_ready(&self, table: &str) -> Result<bool, CutoverError> {
        Ok(self
            .get(table)
            .await?
            .map(|c| c.is_complete())
            .unwrap_or(false))
    }

    /// The unchecked gates, for readiness error reporting. A missing
    /// checklist means every gate is missing.
    pub async fn missing_gates(&self, table: &str) -> Result<Vec<ChecklistGate>, CutoverError> {
        Ok(match self.get(table).await? {
            Some(checklist) => checklist.missing_gates(),
            None => ChecklistGate::ALL.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CutoverRegistry;

    async fn manager_with_table() -> ChecklistManager {
        let db = DbHandle::in_memory().unwrap();
        CutoverRegistry::new(db.clone())
            .register("orders".to_string())
            .await
            .unwrap();
        ChecklistManager::new(db)
    }

    #[tokio::test]
    async fn fresh_checklist_has_no_gates_checked() {
        let manager = manager_with_table().await;
        let checklist = manager.create("orders").await.unwrap();
        assert!(!checklist.is_complete());
        assert_eq!(checklist.missing_gates().len(), 8);
        assert!(!manager.is_ready("orders").await.unwrap());
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let manager = manager_with_table().await;
        manager.create("orders").await.unwrap();
        manager
            .set_gate("orders", ChecklistGate::BackupComplete, "alice")
            .await
            .unwrap();
        let again = manager.create("orders").await.unwrap();
        assert!(again.backup_complete);
    }

    #[tokio::test]
    async fn all_gates_checked_means_ready() {
        let manager = manager_with_table().await;
        manager.create("orders").await.unwrap();
        for gate in ChecklistGate::ALL {
            manager.set_gate("orders", gate, "alice").await.unwrap();
        }
        assert!(manager.is_ready("orders").await.unwrap());
        assert!(manager.missing_gates("orders").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_checklist_is_not_ready() {
        let manager = manager_with_table().await;
        assert!(!manager.is_ready("orders").await.unwrap());
        assert_eq!(manager.missing_gates("orders").await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn checklist_for_unknown_table_errors() {
        let db = DbHandle::in_memory().unwrap();
        let manager = ChecklistManager::new(db);
        let err = manager.create("ghost").await.unwrap_err();
        assert!(matches!(err, CutoverError::TableNotFound(_)));
    }
}
