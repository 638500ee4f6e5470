use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::checklist::ChecklistManager;
use crate::errors::CutoverError;
use crate::freeze::FreezeScheduler;
use crate::models::{
    CutoverTable, DataSource, JobStatus, JobType, TableStatus, ValidationStatus, WindowStatus,
};
use crate::registry::{CutoverRegistry, StatusUpdate};
use crate::reconcile::ReconciliationRunner;
use crate::validator::ConsistencyValidator;

/// Result of a cutover attempt, shaped for the operator surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CutoverOutcome {
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub table: CutoverTable,
}

/// Drives tables through pending -> ready -> cutover -> completed, with
/// rolled_back as the escape hatch. All status writes go through the
/// registry's compare-and-set; concurrent attempts on one table race for
/// a single version bump and the loser gets `Conflict`.
#[derive(Clone)]
pub struct CutoverOrchestrator {
    registry: CutoverRegistry,
    checklists: ChecklistManager,
    validator: ConsistencyValidator,
    scheduler: FreezeScheduler,
    runner: ReconciliationRunner,
    freeze_window_minutes: i64,
    stabilization_hours: i64,
    drift_epsilon_percent: f64,
}

impl CutoverOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: CutoverRegistry,
        checklists: ChecklistManager,
        validator: ConsistencyValidator,
        scheduler: FreezeScheduler,
        runner: ReconciliationRunner,
        freeze_window_minutes: i64,
        stabilization_hours: i64,
        drift_epsilon_percent: f64,
    ) -> Self {
        Self {
            registry,
            checklists,
            validator,
            scheduler,
            runner,
            freeze_window_minutes,
            stabilization_hours,
            drift_epsilon_percent,
        }
    }

    pub fn registry(&self) -> &CutoverRegistry {
        &self.registry
    }

    pub fn checklists(&self) -> &ChecklistManager {
        &self.checklists
    }

    pub fn scheduler(&self) -> &FreezeScheduler {
        &self.scheduler
    }

    pub fn runner(&self) -> &ReconciliationRunner {
        &self.runner
    }

    /// Run the validator and seed the checklist. Repeatable; with no data
    /// change in between, two runs report identical drift and status.
    pub async fn prepare(&self, table: &str) -> Result<CutoverTable, CutoverError> {
        self.validator.validate(table).await?;
        self.checklists.create(table).await?;
        self.registry.require(table).await
    }

    /// The full cutover sequence. From `pending` the table is first
    /// promoted to `ready` (checklist complete, last validation passed),
    /// then the five ordered steps run: freeze window up, registry flip,
    /// cutover stamp, monitoring job, freeze window down. Any step failure
    /// unwinds the earlier steps in reverse before the error surfaces.
    pub async fn cutover(&self, table: &str, actor: &str) -> Result<CutoverOutcome, CutoverError> {
        let mut record = self.registry.require(table).await?;

        if record.status == TableStatus::Pending {
            record = self.promote_to_ready(&record).await?;
        }
        if record.status != TableStatus::Ready {
            return Err(CutoverError::InvariantViolation(format!(
                "cutover requires a ready table, {} is {}",
                table, record.status
            )));
        }

        // Step 1: freeze window scoped to this table, active immediately.
        // An existing scheduled-or-active window surfaces as FreezeConflict.
        let now = Utc::now();
        let window = self
            .scheduler
            .schedule(
                vec![table.to_string()],
                now,
                now + Duration::minutes(self.freeze_window_minutes),
                actor,
            )
            .await?;
        let window = match self.scheduler.activate(window.id).await {
            Ok(w) => w,
            Err(e) => {
                self.undo_window(window.id, WindowStatus::Scheduled).await;
                return Err(e);
            }
        };

        // Steps 2 and 3: flip the read source and stamp the cutover date in
        // one compare-and-set. This is the race the concurrency model is
        // built around; the loser sees Conflict and nothing else happened.
        let flipped = match self
            .registry
            .update_status(
                table,
                record.version,
                TableStatus::Cutover,
                StatusUpdate {
                    read_source: Some(DataSource::New),
                    cutover_date: Some(Some(now)),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(t) => t,
            Err(e) => {
                self.undo_window(window.id, window.status).await;
                return Err(e);
            }
        };

        // Step 4: incremental reconciliation for post-cutover monitoring.
        let job = match self.runner.run(table, JobType::Incremental).await {
            Ok(job) => job,
            Err(e) => {
                self.undo_flip(table, flipped.version).await;
                self.undo_window(window.id, window.status).await;
                return Err(e);
            }
        };

        // Step 5: the window only serialized the cutover attempt itself.
        if let Err(e) = self.scheduler.complete(window.id).await {
            let _ = self.runner.cancel(job.id).await;
            self.undo_flip(table, flipped.version).await;
            self.undo_window(window.id, WindowStatus::Active).await;
            return Err(e);
        }

        info!(table, actor, window = %window.id, job = %job.id, "cutover executed");
        let table = self.registry.require(table).await?;
        Ok(CutoverOutcome {
            success: true,
            errors: vec![],
            warnings: vec!["write_source remains dual until completion".to_string()],
            table,
        })
    }

    /// pending -> ready, gated on the checklist and the latest validation.
    async fn promote_to_ready(&self, record: &CutoverTable) -> Result<CutoverTable, CutoverError> {
        let missing_gates = self.checklists.missing_gates(&record.name).await?;
        let validation_passed = record.validation_status == ValidationStatus::Passed;
        if !missing_gates.is_empty() || !validation_passed {
            return Err(CutoverError::NotReady {
                table: record.name.clone(),
                missing_gates,
                drift_percentage: record.drift_percentage,
                validation_passed,
            });
        }
        self.registry
            .update_status(
                &record.name,
                record.version,
                TableStatus::Ready,
                StatusUpdate::default(),
            )
            .await
    }

    /// cutover -> completed. Requires the stabilization period to have
    /// elapsed with at least one reconciliation job finished since the
    /// cutover, none of them failed or drifted beyond epsilon, and clean
    /// referential integrity. Flips `write_source` to `new`, retiring
    /// dual-write.
    pub async fn complete(&self, table: &str) -> Result<CutoverTable, CutoverError> {
        let record = self.registry.require(table).await?;
        if record.status != TableStatus::Cutover {
            return Err(CutoverError::InvariantViolation(format!(
                "completion requires status cutover, {} is {}",
                table, record.status
            )));
        }
        let cutover_at = record.cutover_date.ok_or_else(|| {
            CutoverError::InvariantViolation(format!("table {} has no cutover date", table))
        })?;

        let not_ready = || CutoverError::NotReady {
            table: table.to_string(),
            missing_gates: vec![],
            drift_percentage: record.drift_percentage,
            validation_passed: record.validation_status == ValidationStatus::Passed,
        };
        if Utc::now() - cutover_at < Duration::hours(self.stabilization_hours) {
            return Err(not_ready());
        }

        let table_name = table.to_string();
        let jobs = self
            .registry
            .handle()
            .call(move |db| db.jobs_finished_since(&table_name, cutover_at))
            .await?;
        if jobs.is_empty() {
            return Err(not_ready());
        }

        let mut issues = Vec::new();
        for job in &jobs {
            if job.status == JobStatus::Failed {
                issues.push(format!("reconciliation job {} failed", job.id));
            } else if job.drift_percentage > self.drift_epsilon_percent {
                issues.push(format!(
                    "reconciliation job {} reported drift {:.2}%",
                    job.id, job.drift_percentage
                ));
            }
        }
        if record.referential_integrity_status == crate::models::IntegrityStatus::Issues {
            issues.extend(record.referential_integrity_issues.iter().cloned());
        }
        if !issues.is_empty() {
            return Err(CutoverError::ValidationFailed {
                table: table.to_string(),
                drift_percentage: record.drift_percentage,
                issues,
            });
        }

        let completed = self
            .registry
            .update_status(
                table,
                record.version,
                TableStatus::Completed,
                StatusUpdate {
                    write_source: Some(DataSource::New),
                    ..Default::default()
                },
            )
            .await?;
        info!(table, "cutover completed, dual-write retired");
        Ok(completed)
    }

    /// Revert both sources to legacy, stop the table's running
    /// reconciliation job with the reason attached, and stamp the rollback.
    /// Idempotent: a second call on a rolled-back table returns the stored
    /// state untouched.
    pub async fn rollback(
        &self,
        table: &str,
        actor: &str,
        reason: &str,
    ) -> Result<CutoverTable, CutoverError> {
        let record = self.registry.require(table).await?;
        if record.status == TableStatus::RolledBack {
            return Ok(record);
        }

        // The status flip comes first: if the compare-and-set loses, the
        // running job must be left untouched.
        let rolled_back = self
            .registry
            .update_status(
                table,
                record.version,
                TableStatus::RolledBack,
                StatusUpdate {
                    read_source: Some(DataSource::Legacy),
                    write_source: Some(DataSource::Legacy),
                    cutover_date: Some(None),
                    rollback_date: Some(Some(Utc::now())),
                    ..Default::default()
                },
            )
            .await?;

        // A cancelled job lands in completed, never failed. Job cleanup is
        // best-effort once the rollback has been recorded.
        match self.runner.cancel_for_table(table).await {
            Ok(Some(job)) => {
                let reason = reason.to_string();
                let job_id = job.id;
                let noted = self
                    .registry
                    .handle()
                    .call(move |db| db.append_job_error(job_id, &reason))
                    .await;
                if let Err(e) = noted {
                    warn!(table, job = %job.id, error = %e, "could not attach rollback reason");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(table, error = %e, "could not stop reconciliation job"),
        }

        warn!(table, actor, reason, "table rolled back to legacy");
        Ok(rolled_back)
    }

    /// rolled_back -> pending. Resets the validation verdict so a stale
    /// pass cannot skip the readiness gate on the next attempt.
    pub async fn retry_preparation(&self, table: &str) -> Result<CutoverTable, CutoverError> {
        let record = self.registry.require(table).await?;
        let reopened = self
            .registry
            .update_status(
                table,
                record.version,
                TableStatus::Pending,
                StatusUpdate {
                    write_source: Some(DataSource::Dual),
                    validation_status: Some(ValidationStatus::Pending),
                    rollback_date: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        info!(table, "table reopened for another attempt");
        Ok(reopened)
    }

    async fn undo_window(&self, id: uuid::Uuid, status_at_failure: WindowStatus) {
        let result = match status_at_failure {
            WindowStatus::Active => self.scheduler.complete(id).await,
            _ => self.scheduler.cancel(id).await,
        };
        if let Err(e) = result {
            warn!(window = %id, error = %e, "could not unwind freeze window");
        }
    }

    async fn undo_flip(&self, table: &str, version: i64) {
        let table_name = table.to_string();
        let result = self
            .registry
            .handle()
            .call(move |db| db.revert_cutover(&table_name, version))
            .await;
        if let Err(e) = result {
            warn!(table, error = %e, "could not unwind registry flip");
        }
    }
}
