//! Read-only views over freeze windows and reconciliation jobs.

use std::path::Path;

use crate::errors::CutoverError;

pub async fn cmd_windows(project_dir: &Path) -> Result<(), CutoverError> {
    let state = super::engine(project_dir)?;
    let windows = state.orchestrator.scheduler().list().await?;
    if windows.is_empty() {
        println!();
        println!("No freeze windows scheduled.");
        println!();
        return Ok(());
    }

    println!();
    println!(
        "{:<38} {:<10} {:<22} {:<22} Tables",
        "Window", "Status", "Start", "End"
    );
    for window in &windows {
        println!(
            "{:<38} {:<10} {:<22} {:<22} {}",
            window.id,
            window.status.as_str(),
            window.start_time.format("%Y-%m-%d %H:%M:%S"),
            window.end_time.format("%Y-%m-%d %H:%M:%S"),
            window.affected_tables.join(", ")
        );
    }
    println!();
    Ok(())
}

pub async fn cmd_jobs(project_dir: &Path, table: Option<&str>) -> Result<(), CutoverError> {
    let state = super::engine(project_dir)?;
    let jobs = state.orchestrator.runner().list(table).await?;
    if jobs.is_empty() {
        println!();
        println!("No reconciliation jobs recorded.");
        println!();
        return Ok(());
    }

    println!();
    println!(
        "{:<38} {:<16} {:<10} {:<12} {:>16} {:>8}",
        "Job", "Table", "Status", "Type", "Progress", "Drift%"
    );
    for job in &jobs {
        println!(
            "{:<38} {:<16} {:<10} {:<12} {:>16} {:>8.2}",
            job.id,
            job.table_name,
            job.status.as_str(),
            job.job_type.as_str(),
            format!("{}/{}", job.records_processed, job.records_total),
            job.drift_percentage,
        );
        for error in &job.errors {
            println!("    - {}", error);
        }
    }
    println!();
    Ok(())
}
