use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::CutoverError;
use crate::models::{JobStatus, JobType, ReconciliationJob};
use crate::registry::DbHandle;
use crate::store::StorePair;
use crate::validator::drift_percentage;

const BATCH_PAUSE: Duration = Duration::from_millis(10);

struct RunningJob {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Runs background reconciliation jobs. At most one job per table may be
/// running; the claim is enforced in the database so concurrent starts
/// lose cleanly. Cancellation is cooperative, observed between batches,
/// and a cancelled job finishes as completed with its partial progress.
#[derive(Clone)]
pub struct ReconciliationRunner {
    db: DbHandle,
    stores: StorePair,
    batch_size: i64,
    running: Arc<Mutex<HashMap<Uuid, RunningJob>>>,
}

impl ReconciliationRunner {
    pub fn new(db: DbHandle, stores: StorePair, batch_size: i64) -> Self {
        Self {
            db,
            stores,
            batch_size: batch_size.max(1),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a pending job without starting it.
    pub async fn enqueue(
        &self,
        table: &str,
        job_type: JobType,
    ) -> Result<ReconciliationJob, CutoverError> {
        let table = table.to_string();
        self.db
            .call(move |db| db.create_job(&table, job_type))
            .await
    }

    /// Claim the table's running slot and spawn the worker. Fails with
    /// `Conflict` while another job for the same table is running.
    pub async fn start(&self, id: Uuid) -> Result<ReconciliationJob, CutoverError> {
        let job = self.db.call(move |db| db.claim_job(id)).await?;
        info!(job = %id, table = %job.table_name, kind = job.job_type.as_str(), "reconciliation started");

        let cancel = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            db: self.db.clone(),
            stores: self.stores.clone(),
            batch_size: self.batch_size,
            cancel: Arc::clone(&cancel),
        };
        let table = job.table_name.clone();
        // Hold the map lock across spawn and insert: the worker prunes its
        // own entry when it finishes, and a fast job finishing before the
        // insert would otherwise leave the entry behind forever.
        let mut running = self.running.lock().await;
        let registry = Arc::clone(&self.running);
        let handle = tokio::spawn(async move {
            worker.execute(id, table).await;
            registry.lock().await.remove(&id);
        });
        running.insert(id, RunningJob { cancel, handle });
        Ok(job)
    }

    /// Enqueue and immediately start.
    pub async fn run(
        &self,
        table: &str,
        job_type: JobType,
    ) -> Result<ReconciliationJob, CutoverError> {
        let job = self.enqueue(table, job_type).await?;
        self.start(job.id).await
    }

    /// Cancel a job. Running jobs stop at the next batch boundary and land
    /// in `completed` with their partial progress; a cancelled job is never
    /// marked failed. Pending jobs are closed out directly. Finished jobs
    /// are returned unchanged.
    pub async fn cancel(&self, id: Uuid) -> Result<ReconciliationJob, CutoverError> {
        // Take the entry out before awaiting the handle so the map lock is
        // never held across a worker's remaining runtime.
        let running = self.running.lock().await.remove(&id);
        if let Some(running) = running {
            running.cancel.store(true, Ordering::Relaxed);
            if running.handle.await.is_err() {
                warn!(job = %id, "reconciliation worker panicked during cancel");
            }
            return self
                .db
                .call(move |db| {
                    db.get_job(id)?.ok_or_else(|| {
                        CutoverError::InvariantViolation(format!("unknown reconciliation job {}", id))
                    })
                })
                .await;
        }

        self.db
            .call(move |db| {
                let job = db.get_job(id)?.ok_or_else(|| {
                    CutoverError::InvariantViolation(format!("unknown reconciliation job {}", id))
                })?;
                match job.status {
                    JobStatus::Pending => {
                        db.claim_job(id)?;
                        db.finish_job(
                            id,
                            JobStatus::Completed,
                            false,
                            0.0,
                            true,
                            &["cancelled before start".to_string()],
                        )
                    }
                    _ => Ok(job),
                }
            })
            .await
    }

    /// Cancel whatever job currently holds the table's running slot.
    pub async fn cancel_for_table(
        &self,
        table: &str,
    ) -> Result<Option<ReconciliationJob>, CutoverError> {
        let table_name = table.to_string();
        let running = self
            .db
            .call(move |db| db.running_job_for(&table_name))
            .await?;
        match running {
            Some(job) => Ok(Some(self.cancel(job.id).await?)),
            None => Ok(None),
        }
    }

    /// Block until the worker for `id` finishes, then return the final row.
    pub async fn wait(&self, id: Uuid) -> Result<ReconciliationJob, CutoverError> {
        let running = self.running.lock().await.remove(&id);
        if let Some(running) = running
            && running.handle.await.is_err()
        {
            warn!(job = %id, "reconciliation worker panicked");
        }
        self.db
            .call(move |db| {
                db.get_job(id)?.ok_or_else(|| {
                    CutoverError::InvariantViolation(format!("unknown reconciliation job {}", id))
                })
            })
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<ReconciliationJob>, CutoverError> {
        self.db.call(move |db| db.get_job(id)).await
    }

    pub async fn list(&self, table: Option<&str>) -> Result<Vec<ReconciliationJob>, CutoverError> {
        let table = table.map(|t| t.to_string());
        self.db.call(move |db| db.list_jobs(table.as_deref())).await
    }
}

struct Worker {
    db: DbHandle,
    stores: StorePair,
    batch_size: i64,
    cancel: Arc<AtomicBool>,
}

impl Worker {
    async fn execute(&self, id: Uuid, table: String) {
        match self.reconcile(id, &table).await {
            Ok(()) => {}
            Err(e) => {
                warn!(job = %id, table, error = %e, "reconciliation failed");
                let message = e.to_string();
                let result = self
                    .db
                    .call(move |db| {
                        db.finish_job(id, JobStatus::Failed, false, 0.0, false, &[message])
                    })
                    .await;
                if let Err(e) = result {
                    warn!(job = %id, error = %e, "could not record job failure");
                }
            }
        }
    }

    async fn reconcile(&self, id: Uuid, table: &str) -> Result<(), CutoverError> {
        let total = self.stores.legacy.count(table).await?;
        self.db
            .call(move |db| db.update_job_progress(id, 0, total))
            .await?;

        // Batches walk the legacy key order in half-open ranges. The first
        // range is unbounded below and the last unbounded above, so rows the
        // new store holds outside the legacy key span still get hashed.
        let mut errors = Vec::new();
        let mut processed: i64 = 0;
        while processed < total {
            if self.cancel.load(Ordering::Relaxed) {
                let note = format!("cancelled after {} of {} records", processed, total);
                self.db
                    .call(move |db| {
                        db.finish_job(id, JobStatus::Completed, false, 0.0, true, &[note])
                    })
                    .await?;
                info!(job = %id, table, processed, total, "reconciliation cancelled");
                return Ok(());
            }

            let next = (processed + self.batch_size).min(total);
            let start = if processed == 0 {
                None
            } else {
                self.stores.legacy.key_at(table, processed).await?
            };
            let end = if next < total {
                self.stores.legacy.key_at(table, next).await?
            } else {
                None
            };
            let legacy_sum = self
                .stores
                .legacy
                .checksum(table, start.as_deref(), end.as_deref())
                .await?;
            let new_sum = self
                .stores
                .new
                .checksum(table, start.as_deref(), end.as_deref())
                .await?;
            if legacy_sum != new_sum {
                errors.push(format!(
                    "checksum mismatch in records {}..{} of {}",
                    processed, next, table
                ));
            }

            processed = next;
            self.db
                .call(move |db| db.update_job_progress(id, processed, total))
                .await?;
            tokio::time::sleep(BATCH_PAUSE).await;
        }

        let new_total = self.stores.new.count(table).await?;
        let drift = drift_percentage(total, new_total);
        let drift_detected = drift > 0.0 || !errors.is_empty();

        let finished = self
            .db
            .call(move |db| {
                db.finish_job(id, JobStatus::Completed, drift_detected, drift, false, &errors)
            })
            .await?;
        info!(
            job = %id,
            table,
            drift = finished.drift_percentage,
            drift_detected = finished.drift_detected,
            "reconciliation completed"
        );
        Ok(())
    }
}
