//! Typed error taxonomy for the cutover coordinator.
//!
//! Every failed transition carries the precise unmet condition (which gate,
//! how much drift, which window conflicts) so an operator can act without
//! consulting logs.

use thiserror::Error;
use uuid::Uuid;

use crate::models::ChecklistGate;

#[derive(Debug, Error)]
pub enum CutoverError {
    /// Drift or integrity issues found; re-running prepare after fixing the
    /// data is the recovery path.
    #[error("Validation failed for {table}: drift {drift_percentage:.2}% ({issues:?})")]
    ValidationFailed {
        table: String,
        drift_percentage: f64,
        issues: Vec<String>,
    },

    /// Checklist or validation precondition unmet. User-actionable.
    #[error("Table {table} is not ready: missing gates {missing_gates:?}, drift {drift_percentage:.2}%")]
    NotReady {
        table: String,
        missing_gates: Vec<ChecklistGate>,
        drift_percentage: f64,
        validation_passed: bool,
    },

    /// Lost an optimistic-concurrency race; refetch and retry.
    #[error("Version conflict on {table}: expected {expected}, found {actual}")]
    Conflict {
        table: String,
        expected: i64,
        actual: i64,
    },

    /// A scheduled-or-active freeze window already covers the table.
    #[error("Freeze conflict on {table}: window {window_id} is {window_status}")]
    FreezeConflict {
        table: String,
        window_id: Uuid,
        window_status: String,
    },

    /// Adapter I/O failure. Surfaced, never swallowed; the caller retries
    /// with backoff.
    #[error("Store '{store}' unavailable: {message}")]
    StoreUnavailable { store: String, message: String },

    /// Internal guard tripped. Fatal for the attempted operation; nothing
    /// was mutated.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Table {0} is not part of the migration plan")]
    TableNotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CutoverError {
    /// CLI exit code contract: 0 success, 1 validation failed, 2 conflict,
    /// 3 not ready, 4 store/internal error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ValidationFailed { .. } => 1,
            Self::Conflict { .. } | Self::FreezeConflict { .. } => 2,
            Self::NotReady { .. } => 3,
            Self::StoreUnavailable { .. }
            | Self::InvariantViolation(_)
            | Self::TableNotFound(_)
            | Self::Internal(_) => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_carries_versions() {
        let err = CutoverError::Conflict {
            table: "users".into(),
            expected: 3,
            actual: 4,
        };
        match &err {
            CutoverError::Conflict { expected, actual, .. } => {
                assert_eq!(*expected, 3);
                assert_eq!(*actual, 4);
            }
            _ => panic!("Expected Conflict variant"),
        }
        assert!(err.to_string().contains("users"));
    }

    #[test]
    fn not_ready_lists_missing_gates() {
        let err = CutoverError::NotReady {
            table: "orders".into(),
            missing_gates: vec![ChecklistGate::BackupComplete, ChecklistGate::TeamNotified],
            drift_percentage: 5.0,
            validation_passed: false,
        };
        let msg = err.to_string();
        assert!(msg.contains("BackupComplete"));
        assert!(msg.contains("5.00%"));
    }

    #[test]
    fn exit_codes_match_the_cli_contract() {
        assert_eq!(
            CutoverError::ValidationFailed {
                table: "t".into(),
                drift_percentage: 1.0,
                issues: vec![]
            }
            .exit_code(),
            1
        );
        assert_eq!(
            CutoverError::Conflict { table: "t".into(), expected: 1, actual: 2 }.exit_code(),
            2
        );
        assert_eq!(
            CutoverError::NotReady {
                table: "t".into(),
                missing_gates: vec![],
                drift_percentage: 0.0,
                validation_passed: true
            }
            .exit_code(),
            3
        );
        assert_eq!(
            CutoverError::StoreUnavailable { store: "legacy".into(), message: "refused".into() }
                .exit_code(),
            4
        );
        assert_eq!(CutoverError::TableNotFound("t".into()).exit_code(), 4);
    }

    #[test]
    fn all_variants_implement_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&CutoverError::InvariantViolation("x".into()));
        assert_std_error(&CutoverError::TableNotFound("t".into()));
    }
}
