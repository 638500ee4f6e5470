//! Migration plan commands: `cutover plan add`, `cutover list`, `cutover show`.

use std::path::Path;

use console::style;

use crate::errors::CutoverError;
use crate::models::{ChecklistGate, CutoverTable};

pub async fn cmd_plan_add(project_dir: &Path, table: &str) -> Result<(), CutoverError> {
    let state = super::engine(project_dir)?;
    let table = state
        .orchestrator
        .registry()
        .register(table.to_string())
        .await?;
    println!(
        "Added {} to the migration plan (status: {})",
        style(&table.name).bold(),
        table.status
    );
    Ok(())
}

pub async fn cmd_list(project_dir: &Path) -> Result<(), CutoverError> {
    let state = super::engine(project_dir)?;
    let tables = state.orchestrator.registry().list().await?;
    if tables.is_empty() {
        println!();
        println!("No tables in the migration plan. Run 'cutover plan add <table>' first.");
        println!();
        return Ok(());
    }

    println!();
    println!(
        "{:<20} {:<12} {:<8} {:<8} {:<12} {:>8} {:>4}",
        "Table", "Status", "Read", "Write", "Validation", "Drift%", "Ver"
    );
    println!(
        "{:<20} {:<12} {:<8} {:<8} {:<12} {:>8} {:>4}",
        "-----", "------", "----", "-----", "----------", "------", "---"
    );
    for table in &tables {
        println!(
            "{:<20} {:<12} {:<8} {:<8} {:<12} {:>8.2} {:>4}",
            table.name,
            table.status.as_str(),
            table.read_source.as_str(),
            table.write_source.as_str(),
            table.validation_status.as_str(),
            table.drift_percentage,
            table.version,
        );
    }
    println!();
    Ok(())
}

pub async fn cmd_show(project_dir: &Path, table: &str) -> Result<(), CutoverError> {
    let state = super::engine(project_dir)?;
    let record = state.orchestrator.registry().require(table).await?;
    print_table(&record);

    match state.orchestrator.checklists().get(table).await? {
        Some(checklist) => {
            println!("Checklist:");
            for gate in ChecklistGate::ALL {
                let mark = if checklist.gate(gate) {
                    style("✓").green()
                } else {
                    style("✗").red()
                };
                println!("  {} {}", mark, gate.as_str());
            }
            if let Some(at) = checklist.completed_at {
                println!(
                    "  completed at {} by {}",
                    at,
                    checklist.completed_by.as_deref().unwrap_or("unknown")
                );
            }
        }
        None => println!("Checklist: not created (run 'cutover prepare {}')", table),
    }
    println!();
    Ok(())
}

fn print_table(table: &CutoverTable) {
    println!();
    println!("{}", style(&table.name).bold());
    println!("  status:       {}", table.status);
    println!(
        "  sources:      read={} write={}",
        table.read_source, table.write_source
    );
    println!(
        "  validation:   {} (drift {:.2}%, integrity {})",
        table.validation_status.as_str(),
        table.drift_percentage,
        table.referential_integrity_status.as_str()
    );
    println!(
        "  counts:       legacy={} new={} (diff {})",
        table.record_count_legacy, table.record_count_new, table.record_count_difference
    );
    if let Some(at) = table.last_validation {
        println!("  last checked: {}", at);
    }
    if let Some(at) = table.cutover_date {
        println!("  cutover at:   {}", at);
    }
    if let Some(at) = table.rollback_date {
        println!("  rolled back:  {}", at);
    }
    if !table.referential_integrity_issues.is_empty() {
        println!("  issues:");
        for issue in &table.referential_integrity_issues {
            println!("    - {}", issue);
        }
    }
    println!("  version:      {}", table.version);
    println!();
}
