use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::CutoverError;
use crate::models::{ForeignKeyRelation, IntegrityStatus, ValidationStatus};
use crate::registry::{DbHandle, ValidationWriteback};
use crate::store::StorePair;

/// Outcome of one validation pass over a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub table: String,
    pub validation_status: ValidationStatus,
    pub drift_percentage: f64,
    pub record_count_legacy: i64,
    pub record_count_new: i64,
    pub checksum_match: bool,
    pub referential_integrity_status: IntegrityStatus,
    pub issues: Vec<String>,
}

/// Compares a table across the legacy and new stores: row counts, a
/// whole-table digest, and the parent side of any declared foreign keys.
/// Findings are reported, never thrown; a store outage becomes a failed
/// validation, not an error.
#[derive(Clone)]
pub struct ConsistencyValidator {
    db: DbHandle,
    stores: StorePair,
    drift_epsilon_percent: f64,
    relations: Vec<ForeignKeyRelation>,
}

/// Percentage difference between the two counts, guarded against a
/// zero-row legacy table.
pub fn drift_percentage(legacy: i64, new: i64) -> f64 {
    (legacy - new).abs() as f64 / legacy.max(1) as f64 * 100.0
}

impl ConsistencyValidator {
    pub fn new(
        db: DbHandle,
        stores: StorePair,
        drift_epsilon_percent: f64,
        relations: Vec<ForeignKeyRelation>,
    ) -> Self {
        Self {
            db,
            stores,
            drift_epsilon_percent,
            relations,
        }
    }

    /// Run the full pass and persist the result on the table record.
    pub async fn validate(&self, table: &str) -> Result<ValidationReport, CutoverError> {
        // Fail fast on unknown tables; everything below reports instead.
        let table_name = table.to_string();
        self.db
            .call(move |db| db.require_table(&table_name))
            .await?;

        let report = self.inspect(table).await;

        let writeback = ValidationWriteback {
            validation_status: report.validation_status,
            drift_percentage: report.drift_percentage,
            record_count_legacy: report.record_count_legacy,
            record_count_new: report.record_count_new,
            referential_integrity_status: report.referential_integrity_status,
            referential_integrity_issues: report.issues.clone(),
            last_validation: Utc::now(),
        };
        let table_name = table.to_string();
        self.db
            .call(move |db| db.record_validation(&table_name, &writeback))
            .await?;

        match report.validation_status {
            ValidationStatus::Passed => {
                info!(table, drift = report.drift_percentage, "validation passed")
            }
            _ => warn!(
                table,
                drift = report.drift_percentage,
                issues = report.issues.len(),
                "validation failed"
            ),
        }
        Ok(report)
    }

    /// The pure comparison, with no registry write-back.
    async fn inspect(&self, table: &str) -> ValidationReport {
        let mut issues = Vec::new();

        let legacy_count = self.count(&self.stores.legacy, table, &mut issues).await;
        let new_count = self.count(&self.stores.new, table, &mut issues).await;

        let drift = match (legacy_count, new_count) {
            (Some(l), Some(n)) => drift_percentage(l, n),
            _ => 0.0,
        };
        if drift > self.drift_epsilon_percent {
            issues.push(format!(
                "record count drift {:.2}% exceeds epsilon {:.2}%",
                drift, self.drift_epsilon_percent
            ));
        }

        let legacy_sum = self.checksum(&self.stores.legacy, table, &mut issues).await;
        let new_sum = self.checksum(&self.stores.new, table, &mut issues).await;
        let checksum_match = match (&legacy_sum, &new_sum) {
            (Some(l), Some(n)) => {
                if l != n {
                    issues.push(format!("checksum mismatch for table {}", table));
                }
                l == n
            }
            _ => false,
        };

        let mut integrity_issues = 0;
        for relation in self.relations.iter().filter(|r| r.table == table) {
            if let Some(issue) = self.check_relation(relation).await {
                issues.push(issue);
                integrity_issues += 1;
            }
        }
        let integrity_status = if integrity_issues == 0 {
            IntegrityStatus::Clean
        } else {
            IntegrityStatus::Issues
        };

        let validation_status = if issues.is_empty() {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Failed
        };

        ValidationReport {
            table: table.to_string(),
            validation_status,
            drift_percentage: drift,
            record_count_legacy: legacy_count.unwrap_or(0),
            record_count_new: new_count.unwrap_or(0),
            checksum_match,
            referential_integrity_status: integrity_status,
            issues,
        }
    }

    async fn count(
        &self,
        store: &std::sync::Arc<dyn crate::store::StoreAdapter>,
        table: &str,
        issues: &mut Vec<String>,
    ) -> Option<i64> {
        match store.count(table).await {
            Ok(count) => Some(count),
            Err(e) => {
                issues.push(format!("{} store: {}", store.name(), e));
                None
            }
        }
    }

    async fn checksum(
        &self,
        store: &std::sync::Arc<dyn crate::store::StoreAdapter>,
        table: &str,
        issues: &mut Vec<String>,
    ) -> Option<String> {
        match store.checksum(table, None, None).await {
            Ok(sum) => Some(sum),
            Err(e) => {
                issues.push(format!("{} store: {}", store.name(), e));
                None
            }
        }
    }

    /// A relation's parent table must look the same on both sides,
    /// otherwise rows in the child may reference parents that did not
    /// arrive in the new store.
    async fn check_relation(&self, relation: &ForeignKeyRelation) -> Option<String> {
        let parent = &relation.parent_table;
        let legacy_count = self.stores.legacy.count(parent).await;
        let new_count = self.stores.new.count(parent).await;
        match (legacy_count, new_count) {
            (Ok(l), Ok(n)) if n < l => {
                return Some(format!(
                    "relation {}.{} -> {}: parent has {} rows in legacy but {} in new",
                    relation.table, relation.column, parent, l, n
                ));
            }
            (Err(e), _) | (_, Err(e)) => {
                return Some(format!(
                    "relation {}.{} -> {}: {}",
                    relation.table, relation.column, parent, e
                ));
            }
            _ => {}
        }

        let legacy_sum = self.stores.legacy.checksum(parent, None, None).await;
        let new_sum = self.stores.new.checksum(parent, None, None).await;
        match (legacy_sum, new_sum) {
            (Ok(l), Ok(n)) if l != n => Some(format!(
                "relation {}.{} -> {}: parent table contents diverge",
                relation.table, relation.column, parent
            )),
            (Err(e), _) | (_, Err(e)) => Some(format!(
                "relation {}.{} -> {}: {}",
                relation.table, relation.column, parent, e
            )),
            _ => None,
        }
    }
}
