//! fintrack - command-line front end for the offline-first finance tracker.
//!
//! Data lives in a local cache under the data directory and is mirrored to
//! Firestore when a Firebase project is configured.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fintrack_core::cache::age_display;
use fintrack_core::models::Dataset;
use fintrack_core::{
    Config, FileCache, FinancialStore, FirestoreClient, PeriodFilter, SyncCoordinator, SyncReport,
};

// ============================================================================
// Constants
// ============================================================================

/// Subdirectory of the data directory holding one JSON file per dataset
const CACHE_SUBDIR: &str = "cache";

/// Subdirectory of the data directory holding daily log files
const LOG_SUBDIR: &str = "logs";

const USAGE: &str = "\
Usage: fintrack <command>

Commands:
  status                     Identity, connectivity and dataset ages
  summary [PERIOD] [--json]  Totals for PERIOD (all, YYYY or YYYY-MM; default: this month)
  sync                       Push every local dataset to the remote store
  export <FILE>              Write all datasets to a JSON backup
  import <FILE>              Replace the datasets present in a JSON backup";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=fintrack_core=debug).
fn init_tracing(log_dir: &Path) -> WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_appender = tracing_appender::rolling::daily(log_dir, "fintrack.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load()?;
    let data_dir = config.data_dir()?;
    std::fs::create_dir_all(data_dir.join(LOG_SUBDIR))
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    let _guard = init_tracing(&data_dir.join(LOG_SUBDIR));
    info!(command = command, data_dir = %data_dir.display(), "fintrack starting");

    let mut store = FinancialStore::open(build_coordinator(&config, &data_dir)?).await;

    match command {
        "status" => status(&store),
        "summary" => summary(&store, &args[1..])?,
        "sync" => print_report(&store.sync_now().await),
        "export" => export(&store, args.get(1))?,
        "import" => import(&mut store, args.get(1)).await?,
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }

    Ok(())
}

fn build_coordinator(config: &Config, data_dir: &Path) -> Result<SyncCoordinator> {
    let cache = FileCache::new(data_dir.join(CACHE_SUBDIR))?;
    let mut sync = SyncCoordinator::new(Box::new(cache)).with_online(!config.offline_mode);

    if let Some(ref firebase) = config.firebase {
        match FirestoreClient::new(firebase, data_dir.to_path_buf()) {
            Ok(client) => sync = sync.with_remote(Box::new(client)),
            Err(e) => warn!(error = %e, "Could not create Firestore client, running local-only"),
        }
    }
    Ok(sync)
}

fn status(store: &FinancialStore) {
    let sync = store.sync();
    let mode = match (sync.has_remote(), sync.is_authenticated()) {
        (false, _) => "local-only",
        (true, true) => "synced",
        (true, false) => "remote configured, not signed in",
    };
    let user = store
        .user_id()
        .map_or_else(|| "-".to_string(), |u| u.to_string());

    println!("User:    {}", user);
    println!("Mode:    {}", mode);
    println!("Online:  {}", if sync.is_online() { "yes" } else { "no" });
    println!();

    for dataset in Dataset::ALL {
        let count = match dataset {
            Dataset::Transactions => store.transactions().len(),
            Dataset::Categories => store.categories().len(),
            Dataset::Budgets => store.budgets().len(),
            Dataset::Investments => store.investments().len(),
        };
        let age = sync
            .local_saved_at(dataset)
            .map_or_else(|| "never saved".to_string(), age_display);
        println!("{:<13} {:>6}  {}", dataset.as_str(), count, age);
    }
}

fn summary(store: &FinancialStore, args: &[String]) -> Result<()> {
    let json = args.iter().any(|a| a == "--json");
    let period = match args.iter().find(|a| !a.starts_with("--")) {
        Some(p) => p.parse::<PeriodFilter>()?,
        None => Local::now().format("%Y-%m").to_string().parse::<PeriodFilter>()?,
    };

    let totals = store.totals(period);
    let breakdown = store.category_breakdown(period);
    let budget = match period {
        PeriodFilter::Month { .. } => Some(store.budget_status(&period.to_string())?),
        _ => None,
    };
    let portfolio = store.portfolio_value(Local::now().date_naive());

    if json {
        let out = serde_json::json!({
            "period": period.to_string(),
            "totals": totals,
            "categories": breakdown,
            "budget": budget,
            "portfolio": portfolio,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Period:   {}", period);
    println!("Income:   {:.2}", totals.income);
    println!("Expense:  {:.2}", totals.expense);
    println!("Balance:  {:.2}", totals.balance);

    if !breakdown.is_empty() {
        println!();
        println!("Top expense categories:");
        for entry in &breakdown {
            println!("  {:<24} {:>12.2}", entry.name, entry.total);
        }
    }

    if let Some(status) = budget {
        println!();
        match (status.ceiling, status.remaining) {
            (Some(ceiling), Some(remaining)) => println!(
                "Budget:   {:.2} of {:.2} spent, {:.2} left{}",
                status.spent,
                ceiling,
                remaining,
                if status.over_budget { " (over budget)" } else { "" }
            ),
            _ => println!("Budget:   none set for {}", status.month),
        }
    }

    if portfolio.count > 0 {
        println!();
        println!(
            "Investments: {} holding(s), principal {:.2}, value {:.2}",
            portfolio.count, portfolio.principal, portfolio.value
        );
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.skipped {
        println!("Sync skipped: offline or not signed in to a remote store");
        return;
    }
    for dataset in &report.pushed {
        println!("pushed  {}", dataset);
    }
    for dataset in &report.failed {
        println!("FAILED  {}", dataset);
    }
    if report.pushed.is_empty() && report.failed.is_empty() {
        println!("Nothing stored locally to push");
    }
}

fn export(store: &FinancialStore, path: Option<&String>) -> Result<()> {
    let path = PathBuf::from(path.context("export needs a file path")?);
    let json = store.export_json()?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write backup: {}", path.display()))?;
    println!("Exported to {}", path.display());
    Ok(())
}

async fn import(store: &mut FinancialStore, path: Option<&String>) -> Result<()> {
    let path = PathBuf::from(path.context("import needs a file path")?);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read backup: {}", path.display()))?;
    let imported = store.import_json(&json).await?;
    if imported.is_empty() {
        println!("Backup contained no datasets; nothing changed");
    } else {
        let names: Vec<&str> = imported.iter().map(Dataset::as_str).collect();
        println!("Imported {}", names.join(", "));
    }
    Ok(())
}
