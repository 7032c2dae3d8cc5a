//! SalesCast CLI: batch forecasting, checkpoint status and inventory commands.
//!
//! Commands:
//! - `forecast`: run the per-store forecasting batch from a TOML config
//! - `status`: report the latest checkpoint row per store
//! - `inventory`: estimate initial stock per store and write `inventory.csv`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use salescast_core::data::CsvSalesSource;
use salescast_core::domain::StoreId;
use salescast_runner::inventory::write_inventory_csv;
use salescast_runner::{
    estimate_all, write_atomic, BatchConfig, BatchReport, BatchRunner, CheckpointRecord,
    CheckpointStore, CsvForecastTable, JsonlCheckpointLog, PipelineSettings, StoreOutcome,
    StoreSelection,
};

#[derive(Parser)]
#[command(
    name = "salescast",
    about = "SalesCast CLI: per-store sales forecasting batch job"
)]
struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. info, debug, salescast_core=debug).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast every selected store, skipping stores already completed.
    Forecast {
        /// Path to the batch TOML config.
        #[arg(long)]
        config: PathBuf,

        /// Run a single store id.
        #[arg(long, conflicts_with_all = ["from", "to"])]
        store: Option<StoreId>,

        /// First position (1-based) in the ascending store id list.
        #[arg(long, requires = "to")]
        from: Option<usize>,

        /// Last position (inclusive).
        #[arg(long, requires = "from")]
        to: Option<usize>,
    },
    /// Show the latest checkpoint status per store.
    Status {
        /// Path to the batch TOML config.
        #[arg(long)]
        config: PathBuf,

        /// Only show this store.
        #[arg(long)]
        store: Option<StoreId>,
    },
    /// Estimate initial inventory per store.
    Inventory {
        /// Path to the batch TOML config.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Commands::Forecast {
            config,
            store,
            from,
            to,
        } => {
            let selection = match (store, from, to) {
                (Some(store_id), _, _) => StoreSelection::Single { store_id },
                (None, Some(from), Some(to)) => StoreSelection::Range { from, to },
                _ => StoreSelection::All,
            };
            run_forecast_cmd(&config, &selection)
        }
        Commands::Status { config, store } => run_status_cmd(&config, store),
        Commands::Inventory { config } => run_inventory_cmd(&config),
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid --log-level '{level}'"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn load_config(path: &Path) -> Result<BatchConfig> {
    BatchConfig::from_file(path).with_context(|| format!("failed to load config {}", path.display()))
}

fn open_source(config: &BatchConfig) -> Result<CsvSalesSource> {
    CsvSalesSource::open(&config.source.train_csv, &config.source.store_csv).with_context(|| {
        format!(
            "failed to read sales data from {} and {}",
            config.source.train_csv.display(),
            config.source.store_csv.display()
        )
    })
}

fn run_forecast_cmd(config_path: &Path, selection: &StoreSelection) -> Result<()> {
    let config = load_config(config_path)?;
    let run_id = config.run_id()?;

    let source = open_source(&config)?;
    let ckpt_path = config.output.checkpoint_path();
    let checkpoint = JsonlCheckpointLog::open(&ckpt_path)
        .with_context(|| format!("failed to open checkpoint log {}", ckpt_path.display()))?;
    let sink = CsvForecastTable::open(&config.output.dir, config.output.export_per_store)
        .with_context(|| {
            format!(
                "failed to open forecast table in {}",
                config.output.dir.display()
            )
        })?;

    let mut runner = BatchRunner::new(source, checkpoint, sink, PipelineSettings::from(&config));
    let report = runner
        .run(selection, Some(run_id), None)
        .context("batch aborted")?;

    let report_path = config.output.report_path();
    let json = serde_json::to_string_pretty(&report)?;
    write_atomic(&report_path, json.as_bytes())
        .with_context(|| format!("failed to write {}", report_path.display()))?;

    print_summary(&report);
    println!("Report saved to: {}", report_path.display());

    let persistence_failures = report.persistence_failures();
    if persistence_failures > 0 {
        bail!("{persistence_failures} store(s) could not persist their forecast");
    }
    Ok(())
}

fn run_status_cmd(config_path: &Path, store: Option<StoreId>) -> Result<()> {
    let config = load_config(config_path)?;
    let ckpt_path = config.output.checkpoint_path();
    if !ckpt_path.exists() {
        println!("No checkpoint log at {}", ckpt_path.display());
        return Ok(());
    }
    let log = JsonlCheckpointLog::open(&ckpt_path)
        .with_context(|| format!("failed to open checkpoint log {}", ckpt_path.display()))?;

    let rows = match store {
        Some(store_id) => match log.latest(store_id)? {
            Some(record) => vec![record],
            None => {
                println!("No checkpoint for store {store_id}");
                return Ok(());
            }
        },
        None => log.snapshot()?,
    };

    println!("Checkpoint log: {}", ckpt_path.display());
    println!();
    print_status_table(&rows);
    Ok(())
}

fn run_inventory_cmd(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let source = open_source(&config)?;
    let estimates = estimate_all(&source).context("failed to estimate inventory")?;

    let path = config.output.inventory_path();
    write_inventory_csv(&path, &estimates)?;

    let total: u64 = estimates.iter().map(|e| e.total).sum();
    println!("Stores:      {}", estimates.len());
    println!("Total stock: {total}");
    println!("Inventory saved to: {}", path.display());
    Ok(())
}

fn print_status_table(rows: &[CheckpointRecord]) {
    println!(
        "{:<8} {:<10} {:>12} {:<20} Reason",
        "Store", "Status", "RMSE", "Updated"
    );
    println!("{}", "-".repeat(64));
    for r in rows {
        let metric = r
            .error_metric
            .map(|m| format!("{m:.2}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<8} {:<10} {:>12} {:<20} {}",
            r.store_id,
            r.status.as_str(),
            metric,
            r.timestamp.format("%Y-%m-%d %H:%M:%S"),
            r.reason.as_deref().unwrap_or("")
        );
    }
}

fn print_summary(report: &BatchReport) {
    println!();
    println!("=== Batch Result ===");
    if let Some(run_id) = &report.run_id {
        println!("Run:        {}", &run_id[..run_id.len().min(16)]);
    }
    println!("Stores:     {}", report.stores.len());
    println!("Completed:  {}", report.completed());
    println!("Skipped:    {}", report.skipped());
    println!("Failed:     {}", report.failed());
    let elapsed = report.finished_at - report.started_at;
    println!("Elapsed:    {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);

    let failures: Vec<_> = report
        .stores
        .iter()
        .filter_map(|s| match &s.outcome {
            StoreOutcome::Failed { kind, reason } => Some((s.store_id, kind, reason)),
            _ => None,
        })
        .collect();
    if !failures.is_empty() {
        println!();
        println!("--- Failures ---");
        for (store_id, kind, reason) in failures {
            println!("Store {store_id:<6} {kind:?}: {reason}");
        }
    }
    if report.cancelled {
        println!();
        println!("WARNING: batch cancelled before all stores ran");
    }
    println!();
}
