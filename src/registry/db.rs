use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::errors::CutoverError;
use crate::models::*;

type Result<T> = std::result::Result<T, CutoverError>;

/// Fields an orchestrator transition may change alongside `status`.
/// `cutover_date`/`rollback_date` use a double Option: outer None leaves the
/// column untouched, inner None clears it.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub read_source: Option<DataSource>,
    pub write_source: Option<DataSource>,
    pub validation_status: Option<ValidationStatus>,
    pub cutover_date: Option<Option<DateTime<Utc>>>,
    pub rollback_date: Option<Option<DateTime<Utc>>>,
}

/// Validator/runner write-back payload. Deliberately cannot touch
/// status/read_source/write_source, which belong to the orchestrator.
#[derive(Debug, Clone)]
pub struct ValidationWriteback {
    pub validation_status: ValidationStatus,
    pub drift_percentage: f64,
    pub record_count_legacy: i64,
    pub record_count_new: i64,
    pub referential_integrity_status: IntegrityStatus,
    pub referential_integrity_issues: Vec<String>,
    pub last_validation: DateTime<Utc>,
}

pub struct CutoverDb {
    conn: Connection,
}

fn now_str() -> String {
    Utc::now().to_rfc3339()
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CutoverError::Internal(anyhow::anyhow!("Bad timestamp '{}': {}", s, e)))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

impl CutoverDb {
    /// Open (or create) the coordinator database and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open coordinator database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS cutover_tables (
                    name TEXT PRIMARY KEY,
                    status TEXT NOT NULL DEFAULT 'pending',
                    read_source TEXT NOT NULL DEFAULT 'legacy',
                    write_source TEXT NOT NULL DEFAULT 'dual',
                    validation_status TEXT NOT NULL DEFAULT 'pending',
                    drift_percentage REAL NOT NULL DEFAULT 0,
                    record_count_legacy INTEGER NOT NULL DEFAULT 0,
                    record_count_new INTEGER NOT NULL DEFAULT 0,
                    record_count_difference INTEGER NOT NULL DEFAULT 0,
                    referential_integrity_status TEXT NOT NULL DEFAULT 'pending',
                    referential_integrity_issues TEXT NOT NULL DEFAULT '[]',
                    last_validation TEXT,
                    cutover_date TEXT,
                    rollback_date TEXT,
                    version INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS cutover_checklists (
                    table_name TEXT PRIMARY KEY REFERENCES cutover_tables(name),
                    data_consistency INTEGER NOT NULL DEFAULT 0,
                    referential_integrity INTEGER NOT NULL DEFAULT 0,
                    performance_validation INTEGER NOT NULL DEFAULT 0,
                    security_validation INTEGER NOT NULL DEFAULT 0,
                    backup_complete INTEGER NOT NULL DEFAULT 0,
                    freeze_window_scheduled INTEGER NOT NULL DEFAULT 0,
                    team_notified INTEGER NOT NULL DEFAULT 0,
                    rollback_plan_ready INTEGER NOT NULL DEFAULT 0,
                    completed_at TEXT,
                    completed_by TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS freeze_windows (
                    id TEXT PRIMARY KEY,
                    start_time TEXT NOT NULL,
                    end_time TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'scheduled',
                    affected_tables TEXT NOT NULL,
                    created_by TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS reconciliation_jobs (
                    id TEXT PRIMARY KEY,
                    table_name TEXT NOT NULL REFERENCES cutover_tables(name),
                    status TEXT NOT NULL DEFAULT 'pending',
                    job_type TEXT NOT NULL,
                    started_at TEXT,
                    completed_at TEXT,
                    records_processed INTEGER NOT NULL DEFAULT 0,
                    records_total INTEGER NOT NULL DEFAULT 0,
                    drift_detected INTEGER NOT NULL DEFAULT 0,
                    drift_percentage REAL NOT NULL DEFAULT 0,
                    cancelled INTEGER NOT NULL DEFAULT 0,
                    errors TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_windows_status ON freeze_windows(status);
                CREATE INDEX IF NOT EXISTS idx_jobs_table ON reconciliation_jobs(table_name);
                CREATE INDEX IF NOT EXISTS idx_jobs_table_status
                    ON reconciliation_jobs(table_name, status);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── cutover_tables ───────────────────────────────────────────────

    /// Idempotent by name: inserting an existing table leaves it untouched
    /// and returns the stored row. Plan entries are never deleted.
    pub fn upsert_table(&self, table: &CutoverTable) -> Result<CutoverTable> {
        self.conn
            .execute(
                "INSERT INTO cutover_tables (
                    name, status, read_source, write_source, validation_status,
                    drift_percentage, record_count_legacy, record_count_new,
                    record_count_difference, referential_integrity_status,
                    referential_integrity_issues, last_validation, cutover_date,
                    rollback_date, version, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(name) DO NOTHING",
                params![
                    table.name,
                    table.status.as_str(),
                    table.read_source.as_str(),
                    table.write_source.as_str(),
                    table.validation_status.as_str(),
                    table.drift_percentage,
                    table.record_count_legacy,
                    table.record_count_new,
                    table.record_count_difference,
                    table.referential_integrity_status.as_str(),
                    serde_json::to_string(&table.referential_integrity_issues)
                        .context("Failed to serialize integrity issues")?,
                    table.last_validation.map(|t| t.to_rfc3339()),
                    table.cutover_date.map(|t| t.to_rfc3339()),
                    table.rollback_date.map(|t| t.to_rfc3339()),
                    table.version,
                    table.created_at.to_rfc3339(),
                    table.updated_at.to_rfc3339(),
                ],
            )
            .context("Failed to upsert cutover table")?;
        self.get_table(&table.name)?
            .ok_or_else(|| CutoverError::TableNotFound(table.name.clone()))
    }

    pub fn get_table(&self, name: &str) -> Result<Option<CutoverTable>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM cutover_tables WHERE name = ?1",
                TABLE_COLUMNS
            ))
            .context("Failed to prepare get_table")?;
        let mut rows = stmt
            .query_map(params![name], TableRow::from_row)
            .context("Failed to query table")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read table row")?.into_table()?)),
            None => Ok(None),
        }
    }

    pub fn require_table(&self, name: &str) -> Result<CutoverTable> {
        self.get_table(name)?
            .ok_or_else(|| CutoverError::TableNotFound(name.to_string()))
    }

    pub fn list_tables(&self) -> Result<Vec<CutoverTable>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM cutover_tables ORDER BY name",
                TABLE_COLUMNS
            ))
            .context("Failed to prepare list_tables")?;
        let rows = stmt
            .query_map([], TableRow::from_row)
            .context("Failed to query tables")?;
        let mut tables = Vec::new();
        for row in rows {
            tables.push(row.context("Failed to read table row")?.into_table()?);
        }
        Ok(tables)
    }

    /// The system's sole concurrency-control primitive: a compare-and-set
    /// on `version`. A stale `expected_version` fails with `Conflict` and
    /// performs no mutation; a transition the central table forbids, or one
    /// that would break a structural invariant, rolls back with
    /// `InvariantViolation`.
    pub fn update_status(
        &self,
        name: &str,
        expected_version: i64,
        status: TableStatus,
        update: &StatusUpdate,
    ) -> Result<CutoverTable> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let current = self.require_table(name)?;
        if current.status != status && !current.status.can_transition_to(status) {
            return Err(CutoverError::InvariantViolation(format!(
                "illegal transition {} -> {} for table {}",
                current.status, status, name
            )));
        }

        let mut next = current.clone();
        next.status = status;
        if let Some(rs) = update.read_source {
            next.read_source = rs;
        }
        if let Some(ws) = update.write_source {
            next.write_source = ws;
        }
        if let Some(vs) = update.validation_status {
            next.validation_status = vs;
        }
        if let Some(cd) = update.cutover_date {
            next.cutover_date = cd;
        }
        if let Some(rd) = update.rollback_date {
            next.rollback_date = rd;
        }
        next.check_invariants().map_err(CutoverError::InvariantViolation)?;

        let changed = tx
            .execute(
                "UPDATE cutover_tables SET
                    status = ?1, read_source = ?2, write_source = ?3,
                    validation_status = ?4, cutover_date = ?5, rollback_date = ?6,
                    version = version + 1, updated_at = ?7
                 WHERE name = ?8 AND version = ?9",
                params![
                    next.status.as_str(),
                    next.read_source.as_str(),
                    next.write_source.as_str(),
                    next.validation_status.as_str(),
                    next.cutover_date.map(|t| t.to_rfc3339()),
                    next.rollback_date.map(|t| t.to_rfc3339()),
                    now_str(),
                    name,
                    expected_version,
                ],
            )
            .context("Failed to update table status")?;

        if changed == 0 {
            // Lost the race between our read and the update.
            return Err(CutoverError::Conflict {
                table: name.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }

        tx.commit().context("Failed to commit status update")?;
        self.require_table(name)
    }

    /// Compensation path for a cutover sequence that failed after the
    /// registry flip: restore the ready state, the legacy read source, and
    /// clear the cutover stamp, all under the same compare-and-set.
    pub fn revert_cutover(&self, name: &str, expected_version: i64) -> Result<CutoverTable> {
        let current = self.require_table(name)?;
        let changed = self
            .conn
            .execute(
                "UPDATE cutover_tables SET
                    status = 'ready', read_source = 'legacy', cutover_date = NULL,
                    version = version + 1, updated_at = ?1
                 WHERE name = ?2 AND version = ?3 AND status = 'cutover'",
                params![now_str(), name, expected_version],
            )
            .context("Failed to revert cutover")?;
        if changed == 0 {
            return Err(CutoverError::Conflict {
                table: name.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }
        self.require_table(name)
    }

    /// Drift/integrity write path for the validator and reconciliation
    /// runner. Does not bump `version`, so it cannot invalidate an
    /// in-flight orchestrator transition.
    pub fn record_validation(&self, name: &str, wb: &ValidationWriteback) -> Result<CutoverTable> {
        let changed = self
            .conn
            .execute(
                "UPDATE cutover_tables SET
                    validation_status = ?1, drift_percentage = ?2,
                    record_count_legacy = ?3, record_count_new = ?4,
                    record_count_difference = ?5,
                    referential_integrity_status = ?6,
                    referential_integrity_issues = ?7,
                    last_validation = ?8, updated_at = ?9
                 WHERE name = ?10",
                params![
                    wb.validation_status.as_str(),
                    wb.drift_percentage,
                    wb.record_count_legacy,
                    wb.record_count_new,
                    (wb.record_count_legacy - wb.record_count_new).abs(),
                    wb.referential_integrity_status.as_str(),
                    serde_json::to_string(&wb.referential_integrity_issues)
                        .context("Failed to serialize integrity issues")?,
                    wb.last_validation.to_rfc3339(),
                    now_str(),
                    name,
                ],
            )
            .context("Failed to record validation")?;
        if changed == 0 {
            return Err(CutoverError::TableNotFound(name.to_string()));
        }
        self.require_table(name)
    }

    // ── cutover_checklists ───────────────────────────────────────────

    /// Seed all eight gates false. Idempotent: an existing checklist is
    /// returned unchanged.
    pub fn create_checklist(&self, table_name: &str) -> Result<CutoverChecklist> {
        self.require_table(table_name)?;
        let now = now_str();
        self.conn
            .execute(
                "INSERT INTO cutover_checklists (table_name, created_at, updated_at)
                 VALUES (?1, ?2, ?2) ON CONFLICT(table_name) DO NOTHING",
                params![table_name, now],
            )
            .context("Failed to create checklist")?;
        self.get_checklist(table_name)?
            .ok_or_else(|| CutoverError::TableNotFound(table_name.to_string()))
    }

    pub fn get_checklist(&self, table_name: &str) -> Result<Option<CutoverChecklist>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT table_name, data_consistency, referential_integrity,
                        performance_validation, security_validation, backup_complete,
                        freeze_window_scheduled, team_notified, rollback_plan_ready,
                        completed_at, completed_by, created_at, updated_at
                 FROM cutover_checklists WHERE table_name = ?1",
            )
            .context("Failed to prepare get_checklist")?;
        let mut rows = stmt
            .query_map(params![table_name], ChecklistRow::from_row)
            .context("Failed to query checklist")?;
        match rows.next() {
            Some(row) => Ok(Some(
                row.context("Failed to read checklist row")?.into_checklist()?,
            )),
            None => Ok(None),
        }
    }

    /// Set one gate true. Once the checklist is complete it is immutable:
    /// further calls are no-ops returning the stored state. Completing the
    /// eighth gate stamps `completed_at`/`completed_by`.
    pub fn set_gate(
        &self,
        table_name: &str,
        gate: ChecklistGate,
        completed_by: &str,
    ) -> Result<CutoverChecklist> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let mut checklist = self
            .get_checklist(table_name)?
            .ok_or_else(|| CutoverError::TableNotFound(table_name.to_string()))?;
        if checklist.completed_at.is_some() {
            return Ok(checklist);
        }

        checklist.set_gate(gate);
        tx.execute(
            &format!(
                "UPDATE cutover_checklists SET {} = 1, updated_at = ?1 WHERE table_name = ?2",
                gate.as_str()
            ),
            params![now_str(), table_name],
        )
        .context("Failed to set checklist gate")?;

        if checklist.is_complete() {
            tx.execute(
                "UPDATE cutover_checklists SET completed_at = ?1, completed_by = ?2
                 WHERE table_name = ?3",
                params![now_str(), completed_by, table_name],
            )
            .context("Failed to stamp checklist completion")?;
        }

        tx.commit().context("Failed to commit gate update")?;
        self.get_checklist(table_name)?
            .ok_or_else(|| CutoverError::TableNotFound(table_name.to_string()))
    }

    // ── freeze_windows ───────────────────────────────────────────────

    /// Create a scheduled window. The overlap check and the insert run in
    /// one transaction: at most one scheduled-or-active window may cover a
    /// table at any instant.
    pub fn create_window(
        &self,
        tables: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        created_by: &str,
    ) -> Result<FreezeWindow> {
        if tables.is_empty() {
            return Err(CutoverError::InvariantViolation(
                "freeze window must cover at least one table".into(),
            ));
        }
        if end <= start {
            return Err(CutoverError::InvariantViolation(format!(
                "freeze window end {} must be after start {}",
                end, start
            )));
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        for open in self.open_windows()? {
            for table in tables {
                if open.covers_table(table) && open.overlaps(start, end) {
                    return Err(CutoverError::FreezeConflict {
                        table: table.clone(),
                        window_id: open.id,
                        window_status: open.status.as_str().to_string(),
                    });
                }
            }
        }

        let window = FreezeWindow {
            id: Uuid::new_v4(),
            start_time: start,
            end_time: end,
            status: WindowStatus::Scheduled,
            affected_tables: tables.to_vec(),
            created_by: created_by.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        tx.execute(
            "INSERT INTO freeze_windows
                (id, start_time, end_time, status, affected_tables, created_by,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                window.id.to_string(),
                window.start_time.to_rfc3339(),
                window.end_time.to_rfc3339(),
                window.status.as_str(),
                serde_json::to_string(&window.affected_tables)
                    .context("Failed to serialize affected tables")?,
                window.created_by,
                window.created_at.to_rfc3339(),
                window.updated_at.to_rfc3339(),
            ],
        )
        .context("Failed to insert freeze window")?;
        tx.commit().context("Failed to commit freeze window")?;
        Ok(window)
    }

    pub fn get_window(&self, id: Uuid) -> Result<Option<FreezeWindow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, start_time, end_time, status, affected_tables, created_by,
                        created_at, updated_at
                 FROM freeze_windows WHERE id = ?1",
            )
            .context("Failed to prepare get_window")?;
        let mut rows = stmt
            .query_map(params![id.to_string()], WindowRow::from_row)
            .context("Failed to query window")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read window row")?.into_window()?)),
            None => Ok(None),
        }
    }

    pub fn list_windows(&self) -> Result<Vec<FreezeWindow>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, start_time, end_time, status, affected_tables, created_by,
                        created_at, updated_at
                 FROM freeze_windows ORDER BY created_at",
            )
            .context("Failed to prepare list_windows")?;
        let rows = stmt
            .query_map([], WindowRow::from_row)
            .context("Failed to query windows")?;
        let mut windows = Vec::new();
        for row in rows {
            windows.push(row.context("Failed to read window row")?.into_window()?);
        }
        Ok(windows)
    }

    fn open_windows(&self) -> Result<Vec<FreezeWindow>> {
        Ok(self
            .list_windows()?
            .into_iter()
            .filter(|w| w.status.is_open())
            .collect())
    }

    /// The scheduled-or-active window covering a table, if any.
    pub fn open_window_for(&self, table: &str) -> Result<Option<FreezeWindow>> {
        Ok(self
            .open_windows()?
            .into_iter()
            .find(|w| w.covers_table(table)))
    }

    /// Move a window along its lifecycle. Illegal moves (terminal states,
    /// active back to scheduled) are invariant violations.
    pub fn transition_window(&self, id: Uuid, to: WindowStatus) -> Result<FreezeWindow> {
        let window = self
            .get_window(id)?
            .ok_or_else(|| CutoverError::InvariantViolation(format!("unknown freeze window {}", id)))?;
        if !window.status.can_transition_to(to) {
            return Err(CutoverError::InvariantViolation(format!(
                "illegal freeze window transition {} -> {} for {}",
                window.status.as_str(),
                to.as_str(),
                id
            )));
        }
        self.conn
            .execute(
                "UPDATE freeze_windows SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![to.as_str(), now_str(), id.to_string()],
            )
            .context("Failed to transition freeze window")?;
        self.get_window(id)?
            .ok_or_else(|| CutoverError::InvariantViolation(format!("window {} vanished", id)))
    }

    // ── reconciliation_jobs ──────────────────────────────────────────

    pub fn create_job(&self, table_name: &str, job_type: JobType) -> Result<ReconciliationJob> {
        self.require_table(table_name)?;
        let id = Uuid::new_v4();
        let now = now_str();
        self.conn
            .execute(
                "INSERT INTO reconciliation_jobs
                    (id, table_name, status, job_type, created_at, updated_at)
                 VALUES (?1, ?2, 'pending', ?3, ?4, ?4)",
                params![id.to_string(), table_name, job_type.as_str(), now],
            )
            .context("Failed to insert reconciliation job")?;
        self.require_job(id)
    }

    /// Claim the per-table running slot: pending -> running only if no other
    /// job for the same table is running. The guard and the update are one
    /// statement, mirroring the registry's compare-and-set discipline.
    pub fn claim_job(&self, id: Uuid) -> Result<ReconciliationJob> {
        let job = self.require_job(id)?;
        let changed = self
            .conn
            .execute(
                "UPDATE reconciliation_jobs SET status = 'running', started_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND status = 'pending'
                   AND NOT EXISTS (
                       SELECT 1 FROM reconciliation_jobs
                       WHERE table_name = ?3 AND status = 'running'
                   )",
                params![now_str(), id.to_string(), job.table_name],
            )
            .context("Failed to claim reconciliation job")?;
        if changed == 0 {
            return Err(CutoverError::Conflict {
                table: job.table_name,
                expected: 0,
                actual: 0,
            });
        }
        self.require_job(id)
    }

    pub fn update_job_progress(
        &self,
        id: Uuid,
        records_processed: i64,
        records_total: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE reconciliation_jobs
                 SET records_processed = ?1, records_total = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![records_processed, records_total, now_str(), id.to_string()],
            )
            .context("Failed to update job progress")?;
        Ok(())
    }

    /// Terminal write: running -> completed|failed. No-op if the job already
    /// finished, which makes cancellation racing natural completion safe.
    /// `cancelled` marks jobs that stopped without finishing their scan;
    /// they keep their partial progress but carry no comparison verdict.
    pub fn finish_job(
        &self,
        id: Uuid,
        status: JobStatus,
        drift_detected: bool,
        drift_percentage: f64,
        cancelled: bool,
        errors: &[String],
    ) -> Result<ReconciliationJob> {
        if !matches!(status, JobStatus::Completed | JobStatus::Failed) {
            return Err(CutoverError::InvariantViolation(format!(
                "finish_job requires a terminal status, got {}",
                status.as_str()
            )));
        }
        self.conn
            .execute(
                "UPDATE reconciliation_jobs
                 SET status = ?1, completed_at = ?2, drift_detected = ?3,
                     drift_percentage = ?4, cancelled = ?5, errors = ?6, updated_at = ?2
                 WHERE id = ?7 AND status = 'running'",
                params![
                    status.as_str(),
                    now_str(),
                    drift_detected,
                    drift_percentage,
                    cancelled,
                    serde_json::to_string(errors).context("Failed to serialize job errors")?,
                    id.to_string(),
                ],
            )
            .context("Failed to finish reconciliation job")?;
        self.require_job(id)
    }

    /// Attach a note to a job's error list, e.g. the operator's rollback
    /// reason after a cancellation.
    pub fn append_job_error(&self, id: Uuid, message: &str) -> Result<ReconciliationJob> {
        let job = self.require_job(id)?;
        let mut errors = job.errors;
        errors.push(message.to_string());
        self.conn
            .execute(
                "UPDATE reconciliation_jobs SET errors = ?1, updated_at = ?2 WHERE id = ?3",
                params![
                    serde_json::to_string(&errors).context("Failed to serialize job errors")?,
                    now_str(),
                    id.to_string(),
                ],
            )
            .context("Failed to append job error")?;
        self.require_job(id)
    }

    pub fn get_job(&self, id: Uuid) -> Result<Option<ReconciliationJob>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM reconciliation_jobs WHERE id = ?1",
                JOB_COLUMNS
            ))
            .context("Failed to prepare get_job")?;
        let mut rows = stmt
            .query_map(params![id.to_string()], JobRow::from_row)
            .context("Failed to query job")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read job row")?.into_job()?)),
            None => Ok(None),
        }
    }

    fn require_job(&self, id: Uuid) -> Result<ReconciliationJob> {
        self.get_job(id)?.ok_or_else(|| {
            CutoverError::InvariantViolation(format!("unknown reconciliation job {}", id))
        })
    }

    pub fn list_jobs(&self, table: Option<&str>) -> Result<Vec<ReconciliationJob>> {
        let mut jobs = Vec::new();
        match table {
            Some(table) => {
                let mut stmt = self
                    .conn
                    .prepare(&format!(
                        "SELECT {} FROM reconciliation_jobs WHERE table_name = ?1 \
                         ORDER BY created_at",
                        JOB_COLUMNS
                    ))
                    .context("Failed to prepare list_jobs")?;
                let rows = stmt
                    .query_map(params![table], JobRow::from_row)
                    .context("Failed to query jobs")?;
                for row in rows {
                    jobs.push(row.context("Failed to read job row")?.into_job()?);
                }
            }
            None => {
                let mut stmt = self
                    .conn
                    .prepare(&format!(
                        "SELECT {} FROM reconciliation_jobs ORDER BY created_at",
                        JOB_COLUMNS
                    ))
                    .context("Failed to prepare list_jobs")?;
                let rows = stmt
                    .query_map([], JobRow::from_row)
                    .context("Failed to query jobs")?;
                for row in rows {
                    jobs.push(row.context("Failed to read job row")?.into_job()?);
                }
            }
        }
        Ok(jobs)
    }

    pub fn running_job_for(&self, table: &str) -> Result<Option<ReconciliationJob>> {
        Ok(self
            .list_jobs(Some(table))?
            .into_iter()
            .find(|j| j.status == JobStatus::Running))
    }

    /// Jobs for a table that reached a terminal state at or after `since`.
    /// Cancelled jobs are excluded: they stopped mid-scan and their drift
    /// figures say nothing about the stores.
    pub fn jobs_finished_since(
        &self,
        table: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ReconciliationJob>> {
        Ok(self
            .list_jobs(Some(table))?
            .into_iter()
            .filter(|j| {
                matches!(j.status, JobStatus::Completed | JobStatus::Failed)
                    && !j.cancelled
                    && j.completed_at.is_some_and(|t| t >= since)
            })
            .collect())
    }
}

const TABLE_COLUMNS: &str = "name, status, read_source, write_source, validation_status, \
     drift_percentage, record_count_legacy, record_count_new, record_count_difference, \
     referential_integrity_status, referential_integrity_issues, last_validation, \
     cutover_date, rollback_date, version, created_at, updated_at";

const JOB_COLUMNS: &str = "id, table_name, status, job_type, started_at, completed_at, \
     records_processed, records_total, drift_detected, drift_percentage, cancelled, \
     errors, created_at, updated_at";


struct TableRow {
    name: String,
    status: String,
    read_source: String,
    write_source: String,
    validation_status: String,
    drift_percentage: f64,
    record_count_legacy: i64,
    record_count_new: i64,
    record_count_difference: i64,
    referential_integrity_status: String,
    referential_integrity_issues: String,
    last_validation: Option<String>,
    cutover_date: Option<String>,
    rollback_date: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TableRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            status: row.get(1)?,
            read_source: row.get(2)?,
            write_source: row.get(3)?,
            validation_status: row.get(4)?,
            drift_percentage: row.get(5)?,
            record_count_legacy: row.get(6)?,
            record_count_new: row.get(7)?,
            record_count_difference: row.get(8)?,
            referential_integrity_status: row.get(9)?,
            referential_integrity_issues: row.get(10)?,
            last_validation: row.get(11)?,
            cutover_date: row.get(12)?,
            rollback_date: row.get(13)?,
            version: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    fn into_table(self) -> Result<CutoverTable> {
        Ok(CutoverTable {
            status: TableStatus::from_str(&self.status)
                .map_err(CutoverError::InvariantViolation)?,
            read_source: DataSource::from_str(&self.read_source)
                .map_err(CutoverError::InvariantViolation)?,
            write_source: DataSource::from_str(&self.write_source)
                .map_err(CutoverError::InvariantViolation)?,
            validation_status: ValidationStatus::from_str(&self.validation_status)
                .map_err(CutoverError::InvariantViolation)?,
            referential_integrity_status: IntegrityStatus::from_str(
                &self.referential_integrity_status,
            )
            .map_err(CutoverError::InvariantViolation)?,
            referential_integrity_issues: serde_json::from_str(&self.referential_integrity_issues)
                .context("Failed to parse integrity issues")?,
            last_validation: parse_opt_ts(self.last_validation)?,
            cutover_date: parse_opt_ts(self.cutover_date)?,
            rollback_date: parse_opt_ts(self.rollback_date)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            name: self.name,
            drift_percentage: self.drift_percentage,
            record_count_legacy: self.record_count_legacy,
            record_count_new: self.record_count_new,
            record_count_difference: self.record_count_difference,
            version: self.version,
        })
    }
}

struct ChecklistRow {
    table_name: String,
    gates: [bool; 8],
    completed_at: Option<String>,
    completed_by: Option<String>,
    created_at: String,
    updated_at: String,
}

impl ChecklistRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            table_name: row.get(0)?,
            gates: [
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
            ],
            completed_at: row.get(9)?,
            completed_by: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_checklist(self) -> Result<CutoverChecklist> {
        Ok(CutoverChecklist {
            table_name: self.table_name,
            data_consistency: self.gates[0],
            referential_integrity: self.gates[1],
            performance_validation: self.gates[2],
            security_validation: self.gates[3],
            backup_complete: self.gates[4],
            freeze_window_scheduled: self.gates[5],
            team_notified: self.gates[6],
            rollback_plan_ready: self.gates[7],
            completed_at: parse_opt_ts(self.completed_at)?,
            completed_by: self.completed_by,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

struct WindowRow {
    id: String,
    start_time: String,
    end_time: String,
    status: String,
    affected_tables: String,
    created_by: String,
    created_at: String,
    updated_at: String,
}

impl WindowRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            start_time: row.get(1)?,
            end_time: row.get(2)?,
            status: row.get(3)?,
            affected_tables: row.get(4)?,
            created_by: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_window(self) -> Result<FreezeWindow> {
        Ok(FreezeWindow {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| CutoverError::Internal(anyhow::anyhow!("Bad window id: {}", e)))?,
            start_time: parse_ts(&self.start_time)?,
            end_time: parse_ts(&self.end_time)?,
            status: WindowStatus::from_str(&self.status)
                .map_err(CutoverError::InvariantViolation)?,
            affected_tables: serde_json::from_str(&self.affected_tables)
                .context("Failed to parse affected tables")?,
            created_by: self.created_by,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

struct JobRow {
    id: String,
    table_name: String,
    status: String,
    job_type: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    records_processed: i64,
    records_total: i64,
    drift_detected: bool,
    drift_percentage: f64,
    cancelled: bool,
    errors: String,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            table_name: row.get(1)?,
            status: row.get(2)?,
            job_type: row.get(3)?,
            started_at: row.get(4)?,
            completed_at: row.get(5)?,
            records_processed: row.get(6)?,
            records_total: row.get(7)?,
            drift_detected: row.get(8)?,
            drift_percentage: row.get(9)?,
            cancelled: row.get(10)?,
            errors: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_job(self) -> Result<ReconciliationJob> {
        Ok(ReconciliationJob {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| CutoverError::Internal(anyhow::anyhow!("Bad job id: {}", e)))?,
            table_name: self.table_name,
            status: JobStatus::from_str(&self.status).map_err(CutoverError::InvariantViolation)?,
            job_type: JobType::from_str(&self.job_type).map_err(CutoverError::InvariantViolation)?,
            started_at: parse_opt_ts(self.started_at)?,
            completed_at: parse_opt_ts(self.completed_at)?,
            records_processed: self.records_processed,
            records_total: self.records_total,
            drift_detected: self.drift_detected,
            drift_percentage: self.drift_percentage,
            cancelled: self.cancelled,
            errors: serde_json::from_str(&self.errors).context("Failed to parse job errors")?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}
