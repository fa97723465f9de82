//! Output formatting utilities

use colored::*;
use std::collections::BTreeSet;
use vmsync_engine::{ObjectStatus, RunSummary};

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

fn print_set(title: &str, hostnames: &BTreeSet<String>) {
    if hostnames.is_empty() {
        return;
    }
    println!("{} ({}):", title.bold(), hostnames.len());
    for hostname in hostnames {
        println!("  {}", hostname);
    }
}

/// Print the diff sets and per-object problems of a run
pub fn print_summary(summary: &RunSummary) {
    print_set("Changed", &summary.changed);
    print_set("Added", &summary.added);
    print_set("Removed", &summary.removed);

    for object in &summary.objects {
        for warning in &object.warnings {
            print_warning(&format!("{}: {}", object.hostname, warning));
        }
        match object.status {
            ObjectStatus::Failed => {
                for failure in &object.failures {
                    print_error(&format!("{}: {} {}", object.hostname, object.action, failure));
                }
            }
            ObjectStatus::SkippedPoweredOff => {
                print_info(&format!("{}: not powered on, update skipped", object.hostname))
            }
            ObjectStatus::Applied | ObjectStatus::Planned => {}
        }
    }

    let totals = format!(
        "{} source / {} CMDB VMs: {} added, {} changed, {} removed, {} unchanged",
        summary.source_count,
        summary.target_count,
        summary.added.len(),
        summary.changed.len(),
        summary.removed.len(),
        summary.unchanged
    );
    if summary.dry_run {
        print_info(&format!("Dry run, nothing written. {}", totals));
    } else if summary.has_failures() {
        print_warning(&format!(
            "{} ({} with failures)",
            totals,
            summary.failed().count()
        ));
    } else {
        print_success(&totals);
    }
}

/// Print the run summary as JSON
pub fn print_json(summary: &RunSummary) -> serde_json::Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}
