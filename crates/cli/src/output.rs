use crate::error::CliError;
use engine_core::state::models::{Checkpoint, RunRecord};
use model::run::RunOutcome;

/// One-line human summary printed after a run finishes.
pub fn print_outcome(step: &str, token: &str, outcome: &RunOutcome) {
    println!(
        "Step '{step}' (token {token}): {}, {} written / {} read in {} chunks, {} skipped",
        outcome.status,
        outcome.records_written,
        outcome.records_read,
        outcome.chunks_committed,
        outcome.records_skipped,
    );
    if let Some(error) = &outcome.error {
        println!("Error: {error}");
    }
}

pub fn print_runs(step: &str, runs: &[RunRecord]) {
    if runs.is_empty() {
        println!("No runs recorded for step '{step}'.");
        return;
    }

    println!(
        "{:<20} {:<10} {:>8} {:>8} {:>7} {:>8}  {}",
        "TOKEN", "STATUS", "READ", "WRITTEN", "CHUNKS", "SKIPPED", "FINISHED"
    );
    for record in runs {
        let outcome = &record.outcome;
        println!(
            "{:<20} {:<10} {:>8} {:>8} {:>7} {:>8}  {}",
            record.token,
            outcome.status,
            outcome.records_read,
            outcome.records_written,
            outcome.chunks_committed,
            outcome.records_skipped,
            outcome.finished_at.to_rfc3339(),
        );
    }
}

pub fn print_runs_json(runs: &[RunRecord]) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(runs)?;
    println!("{json}");
    Ok(())
}

pub fn print_run_detail(
    step: &str,
    token: &str,
    record: Option<&RunRecord>,
    checkpoint: Option<&Checkpoint>,
) {
    println!("Step '{step}' / token '{token}':");
    println!("-----------------------------");

    match record {
        Some(record) => {
            let outcome = &record.outcome;
            println!("{:<18} {}", "Status", outcome.status);
            println!("{:<18} {}", "Records read", outcome.records_read);
            println!("{:<18} {}", "Records written", outcome.records_written);
            println!("{:<18} {}", "Chunks committed", outcome.chunks_committed);
            println!("{:<18} {}", "Records skipped", outcome.records_skipped);
            if let Some(error) = &outcome.error {
                println!("{:<18} {}", "Error", error);
            }
            println!("{:<18} {}", "Started", outcome.started_at.to_rfc3339());
            println!("{:<18} {}", "Finished", outcome.finished_at.to_rfc3339());
        }
        None => println!("{:<18} none", "Run record"),
    }

    match checkpoint {
        Some(cp) => {
            println!("{:<18} {}", "Checkpoint", cp.position);
            println!("{:<18} {}", "Updated", cp.updated_at.to_rfc3339());
        }
        None => println!("{:<18} none", "Checkpoint"),
    }
}

pub fn print_run_detail_json(
    record: Option<&RunRecord>,
    checkpoint: Option<&Checkpoint>,
) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(&serde_json::json!({
        "run": record,
        "checkpoint": checkpoint,
    }))?;
    println!("{json}");
    Ok(())
}
