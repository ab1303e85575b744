//! Terminal rendering of plans and cycle reports.
//!
//! Cycle reports arrive as JSON, either from the agent socket or serialized
//! locally, so both paths print the same way.

use colored::Colorize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

use todosync_core::Action;
use todosync_sync::Plan;

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "file")]
    file: String,
    #[tabled(rename = "action")]
    action: String,
    #[tabled(rename = "reason")]
    reason: String,
}

pub fn print_plan(plan: &Plan, prefix: &str) {
    if plan.skipped {
        println!("{prefix}{} remote folder unavailable, nothing decided", "!".yellow().bold());
        return;
    }
    if plan.is_empty() && plan.retained_remote.is_empty() {
        println!("{prefix}✓ in sync, nothing to do");
        return;
    }

    let mut rows: Vec<PlanRow> = plan
        .decisions
        .iter()
        .map(|decision| PlanRow {
            file: decision.action.name().to_string(),
            action: action_label(&decision.action),
            reason: decision.reason.to_string(),
        })
        .collect();
    rows.extend(plan.retained_remote.iter().map(|name| PlanRow {
        file: name.to_string(),
        action: "keep".bright_black().to_string(),
        reason: "deleted locally, kept on remote".to_string(),
    }));

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn action_label(action: &Action) -> String {
    match action {
        Action::Upload(_) => "upload".green().bold().to_string(),
        Action::Download(_) => "download".cyan().bold().to_string(),
        Action::BackupLocally(_) => "backup".yellow().bold().to_string(),
    }
}

/// Print a serialized `CycleReport`.
pub fn print_cycle_report(report: &Value) {
    if let Some(reason) = report["skipped"].as_str() {
        println!("{} cycle skipped: {reason}", "!".yellow().bold());
        return;
    }

    let duration = report["duration_ms"].as_u64().unwrap_or(0);
    let transfers = report["transfers"].as_array().cloned().unwrap_or_default();
    let pruned = report["pruned"].as_array().cloned().unwrap_or_default();
    let backup = &report["backup"];

    if transfers.is_empty() && pruned.is_empty() && backup.is_null() {
        println!("✓ in sync ({duration} ms)");
        return;
    }

    println!("✓ cycle finished in {duration} ms");
    if let Some(copied) = backup["copied"].as_array() {
        println!(
            "  ⎘  backed up {} file(s) into {}",
            copied.len(),
            backup["folder"].as_str().unwrap_or("?")
        );
    }
    if let Some(failed) = backup["failed"].as_array() {
        for name in failed {
            println!("  {}  backup of {} failed", "✗".red().bold(), name.as_str().unwrap_or("?"));
        }
    }
    for transfer in &transfers {
        let name = transfer["name"].as_str().unwrap_or("?");
        let bytes = transfer["bytes"].as_u64().unwrap_or(0);
        match transfer["outcome"].as_str() {
            Some("uploaded") => println!("  {}  {name} ({bytes} bytes)", "↑".green()),
            Some("downloaded") => println!("  {}  {name} ({bytes} bytes)", "↓".cyan()),
            _ => println!(
                "  {}  {} {}: {}",
                "✗".red().bold(),
                transfer["action"]["action"].as_str().unwrap_or("transfer"),
                transfer["action"]["name"].as_str().unwrap_or("?"),
                transfer["error"].as_str().unwrap_or("unknown error")
            ),
        }
    }
    for folder in &pruned {
        println!("  -  pruned {}", folder["path"].as_str().unwrap_or("?"));
    }
}

/// Failed transfers plus failed backup copies in a serialized report.
pub fn failure_count(report: &Value) -> usize {
    let transfers = report["transfers"]
        .as_array()
        .map_or(0, |t| t.iter().filter(|t| t["outcome"] == "failed").count());
    let backups = report["backup"]["failed"].as_array().map_or(0, Vec::len);
    transfers + backups
}
