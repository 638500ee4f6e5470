use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::errors::CutoverError;
use crate::models::{FreezeWindow, WindowStatus};
use crate::registry::DbHandle;

/// Schedules write-freeze windows. At most one scheduled-or-active window
/// may cover a table at a time; the exclusion check runs in the same
/// transaction as the insert.
#[derive(Clone)]
pub struct FreezeScheduler {
    db: DbHandle,
}

impl FreezeScheduler {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    pub async fn schedule(
        &self,
        tables: Vec<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        created_by: &str,
    ) -> Result<FreezeWindow, CutoverError> {
        let created_by = created_by.to_string();
        let window = self
            .db
            .call(move |db| db.create_window(&tables, start, end, &created_by))
            .await?;
        info!(window = %window.id, tables = ?window.affected_tables, "freeze window scheduled");
        Ok(window)
    }

    pub async fn activate(&self, id: Uuid) -> Result<FreezeWindow, CutoverError> {
        self.db
            .call(move |db| db.transition_window(id, WindowStatus::Active))
            .await
    }

    pub async fn complete(&self, id: Uuid) -> Result<FreezeWindow, CutoverError> {
        self.db
            .call(move |db| db.transition_window(id, WindowStatus::Completed))
            .await
    }

    /// Cancelling frees the table slot for a replacement window.
    pub async fn cancel(&self, id: Uuid) -> Result<FreezeWindow, CutoverError> {
        self.db
            .call(move |db| db.transition_window(id, WindowStatus::Cancelled))
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<FreezeWindow>, CutoverError> {
        self.db.call(move |db| db.get_window(id)).await
    }

    pub async fn list(&self) -> Result<Vec<FreezeWindow>, CutoverError> {
        self.db.call(|db| db.list_windows()).await
    }

    /// The scheduled-or-active window covering `table`, if one exists.
    pub async fn open_window_for(&self, table: &str) -> Result<Option<FreezeWindow>, CutoverError> {
        let table = table.to_string();
        self.db.call(move |db| db.open_window_for(&table)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn scheduler() -> FreezeScheduler {
        FreezeScheduler::new(DbHandle::in_memory().unwrap())
    }

    #[tokio::test]
    async fn window_lifecycle() {
        let scheduler = scheduler();
        let start = Utc::now();
        let window = scheduler
            .schedule(
                vec!["orders".to_string()],
                start,
                start + Duration::hours(2),
                "ops",
            )
            .await
            .unwrap();
        assert_eq!(window.status, WindowStatus::Scheduled);

        let active = scheduler.activate(window.id).await.unwrap();
        assert_eq!(active.status, WindowStatus::Active);
        assert!(scheduler.open_window_for("orders").await.unwrap().is_some());

        let done = scheduler.complete(window.id).await.unwrap();
        assert_eq!(done.status, WindowStatus::Completed);
        assert!(scheduler.open_window_for("orders").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn completed_window_cannot_be_cancelled() {
        let scheduler = scheduler();
        let start = Utc::now();
        let window = scheduler
            .schedule(vec!["orders".to_string()], start, start + Duration::hours(1), "ops")
            .await
            .unwrap();
        scheduler.activate(window.id).await.unwrap();
        scheduler.complete(window.id).await.unwrap();

        let err = scheduler.cancel(window.id).await.unwrap_err();
        assert!(matches!(err, CutoverError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn scheduled_window_cannot_complete_directly() {
        let scheduler = scheduler();
        let start = Utc::now();
        let window = scheduler
            .schedule(vec!["orders".to_string()], start, start + Duration::hours(1), "ops")
            .await
            .unwrap();
        let err = scheduler.complete(window.id).await.unwrap_err();
        assert!(matches!(err, CutoverError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn overlap_on_shared_table_is_rejected() {
        let scheduler = scheduler();
        let start = Utc::now();
        scheduler
            .schedule(
                vec!["orders".to_string(), "users".to_string()],
                start,
                start + Duration::hours(2),
                "ops",
            )
            .await
            .unwrap();

        let err = scheduler
            .schedule(
                vec!["users".to_string()],
                start + Duration::minutes(30),
                start + Duration::hours(3),
                "ops",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CutoverError::FreezeConflict { .. }));
    }

    #[tokio::test]
    async fn empty_or_inverted_window_is_invalid() {
        let scheduler = scheduler();
        let start = Utc::now();
        let err = scheduler
            .schedule(vec![], start, start + Duration::hours(1), "ops")
            .await
            .unwrap_err();
        assert!(matches!(err, CutoverError::InvariantViolation(_)));

        let err = scheduler
            .schedule(vec!["orders".to_string()], start, start, "ops")
            .await
            .unwrap_err();
        assert!(matches!(err, CutoverError::InvariantViolation(_)));
    }
}
