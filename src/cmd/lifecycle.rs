//! Table lifecycle commands: prepare, gate, cutover, complete, rollback, retry.

use std::path::Path;
use std::str::FromStr;

use console::style;

use crate::errors::CutoverError;
use crate::models::{ChecklistGate, JobStatus};

pub async fn cmd_prepare(project_dir: &Path, table: &str) -> Result<(), CutoverError> {
    let state = super::engine(project_dir)?;
    let record = state.orchestrator.prepare(table).await?;
    let verdict = match record.validation_status.as_str() {
        "passed" => style("passed").green(),
        other => style(other).red(),
    };
    println!(
        "Validation {} for {}: drift {:.2}% (legacy {} / new {})",
        verdict,
        style(table).bold(),
        record.drift_percentage,
        record.record_count_legacy,
        record.record_count_new,
    );
    for issue in &record.referential_integrity_issues {
        println!("  - {}", issue);
    }
    println!("Checklist seeded; check gates with 'cutover gate {} <gate> --by <who>'", table);
    Ok(())
}

pub async fn cmd_gate(
    project_dir: &Path,
    table: &str,
    gate: &str,
    by: &str,
) -> Result<(), CutoverError> {
    let gate = ChecklistGate::from_str(gate).map_err(CutoverError::InvariantViolation)?;
    let state = super::engine(project_dir)?;
    let checklist = state
        .orchestrator
        .checklists()
        .set_gate(table, gate, by)
        .await?;
    let missing = checklist.missing_gates();
    if missing.is_empty() {
        println!(
            "{} checked. Checklist for {} is complete.",
            gate.as_str(),
            style(table).bold()
        );
    } else {
        println!(
            "{} checked. {} gate(s) remaining: {}",
            gate.as_str(),
            missing.len(),
            missing
                .iter()
                .map(|g| g.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

pub async fn cmd_cutover(project_dir: &Path, table: &str, actor: &str) -> Result<(), CutoverError> {
    let state = super::engine(project_dir)?;
    let outcome = state.orchestrator.cutover(table, actor).await?;
    println!(
        "{} {} is now reading from the new store (status: {})",
        style("Cutover complete.").green().bold(),
        style(table).bold(),
        outcome.table.status
    );
    for warning in &outcome.warnings {
        println!("  {} {}", style("note:").yellow(), warning);
    }

    // A one-shot process cannot leave the monitoring job behind; ride it
    // to its first completion before returning.
    let running = state
        .orchestrator
        .runner()
        .list(Some(table))
        .await?
        .into_iter()
        .rev()
        .find(|j| j.status == JobStatus::Running);
    if let Some(job) = running {
        let job = state.orchestrator.runner().wait(job.id).await?;
        println!(
            "Post-cutover reconciliation finished: drift {:.2}%{}",
            job.drift_percentage,
            if job.drift_detected { " (drift detected)" } else { "" }
        );
    }
    Ok(())
}

pub async fn cmd_complete(project_dir: &Path, table: &str) -> Result<(), CutoverError> {
    let state = super::engine(project_dir)?;
    let record = state.orchestrator.complete(table).await?;
    println!(
        "{} {} finished its migration (read={}, write={})",
        style("Migration completed.").green().bold(),
        style(table).bold(),
        record.read_source,
        record.write_source
    );
    Ok(())
}

pub async fn cmd_rollback(
    project_dir: &Path,
    table: &str,
    actor: &str,
    reason: &str,
) -> Result<(), CutoverError> {
    let state = super::engine(project_dir)?;
    let record = state.orchestrator.rollback(table, actor, reason).await?;
    println!(
        "{} {} reverted to the legacy store (status: {})",
        style("Rolled back.").yellow().bold(),
        style(table).bold(),
        record.status
    );
    Ok(())
}

pub async fn cmd_retry(project_dir: &Path, table: &str) -> Result<(), CutoverError> {
    let state = super::engine(project_dir)?;
    let record = state.orchestrator.retry_preparation(table).await?;
    println!(
        "{} reopened for another attempt (status: {}, validation: {})",
        style(table).bold(),
        record.status,
        record.validation_status.as_str()
    );
    Ok(())
}
