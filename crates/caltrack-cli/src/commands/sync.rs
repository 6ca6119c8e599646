//! Sync subcommand: one pass over the user's Google calendars.

use caltrack_core::storage::data_dir;
use caltrack_core::{
    Config, Database, GoogleCalendarSource, PassLock, StoredToken, SyncOptions, SyncOrchestrator,
    SyncReport,
};
use chrono::Utc;
use clap::Args;
use tracing::warn;

/// Lock owner for passes started from this data directory.
const LOCAL_USER: &str = "local";

#[derive(Args)]
pub struct SyncArgs {
    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: SyncArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Database::open()?;

    // A broken keyring is reported by the pass as a missing credential.
    let token = match StoredToken::lookup() {
        Ok(found) => found.map(|(token, _)| token),
        Err(e) => {
            warn!("credential lookup failed: {e}");
            None
        }
    };
    let source = GoogleCalendarSource::new(&config.google, token)?
        .with_page_size(config.sync.max_results_per_page);

    let mut lock = PassLock::open(&data_dir()?, LOCAL_USER)?;
    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(
        SyncOrchestrator::new(&source, &db, &db)
            .with_options(SyncOptions::from(&config.sync))
            .run_locked(&mut lock, Utc::now()),
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    match report.error {
        Some(failure) => Err(format!("{:?}: {}", failure.kind, failure.message).into()),
        None => Ok(()),
    }
}

fn print_report(report: &SyncReport) {
    println!("{}", report.message);
    if report.error.is_some() {
        for line in &report.debug_trace {
            println!("  {line}");
        }
        return;
    }

    println!("  Events scanned:     {}", report.total_calendar_events_scanned);
    println!("  Matches:            {}", report.matched);
    println!("  New:                {}", report.new_events);
    println!("  Already recorded:   {}", report.skipped_duplicates);
    println!("  All-day skipped:    {}", report.skipped_all_day);
    println!("  Keys updated:       {}", report.keys_updated);

    if !report.matched_samples.is_empty() {
        println!();
        for sample in &report.matched_samples {
            println!("  {sample}");
        }
    }

    let warnings: Vec<&String> = report
        .debug_trace
        .iter()
        .filter(|line| line.starts_with("warning:"))
        .collect();
    if !warnings.is_empty() {
        println!();
        for line in warnings {
            println!("  {line}");
        }
    }
}
