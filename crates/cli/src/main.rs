use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgAction;
use clap::{Args, Parser, Subcommand, ValueEnum};
use smartsync_core::{
    build_inventory, run_sync, OperationStatus, ScanLimits, SqliteStore, SyncMode, SyncOptions,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "smartsync",
    version,
    about = "Synchronize two folder trees from stat metadata, dry-run by default."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Plan and (with --apply) perform a synchronization pass.
    Sync(SyncArgs),
    /// Rebuild and persist one folder's inventory.
    Scan(ScanArgs),
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum CliSyncMode {
    /// Reconcile target to match source (rename/copy/delete).
    Mirror,
    /// Relocate source files into target, deleting redundant source copies.
    Move,
}

impl From<CliSyncMode> for SyncMode {
    fn from(value: CliSyncMode) -> Self {
        match value {
            CliSyncMode::Mirror => SyncMode::Mirror,
            CliSyncMode::Move => SyncMode::Move,
        }
    }
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Source folder root.
    source: PathBuf,

    /// Target folder root.
    target: PathBuf,

    /// Synchronization mode.
    #[arg(long, default_value = "mirror")]
    mode: CliSyncMode,

    /// Perform the planned operations. Without this flag nothing is mutated.
    #[arg(long)]
    apply: bool,

    /// Inventory database file; omitted means a pass-scoped in-memory store.
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    /// Maximum traversal depth (root is depth 0).
    #[arg(long)]
    max_depth: Option<usize>,

    /// Exclude glob patterns (repeatable).
    #[arg(long = "exclude", value_name = "GLOB", num_args = 1.., action = ArgAction::Append)]
    exclude: Vec<String>,

    /// Optional JSON report output path.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// Folder to inventory.
    folder: PathBuf,

    /// Inventory database file.
    #[arg(long, default_value = "smartsync.db", value_name = "FILE")]
    db: PathBuf,

    /// Maximum traversal depth (root is depth 0).
    #[arg(long)]
    max_depth: Option<usize>,

    /// Exclude glob patterns (repeatable).
    #[arg(long = "exclude", value_name = "GLOB", num_args = 1.., action = ArgAction::Append)]
    exclude: Vec<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync(args) => run_sync_command(args),
        Commands::Scan(args) => run_scan_command(args),
    }
}

fn run_sync_command(args: SyncArgs) -> Result<()> {
    let SyncArgs {
        source,
        target,
        mode,
        apply,
        db,
        max_depth,
        exclude,
        output,
    } = args;

    let options = SyncOptions {
        mode: mode.into(),
        dry_run: !apply,
        db_path: db,
        max_depth,
        excludes: exclude,
        ..SyncOptions::new(source, target)
    };

    let report = run_sync(&options)?;

    for outcome in &report.operations {
        let label = match &outcome.status {
            OperationStatus::Simulated => "would".to_string(),
            OperationStatus::Applied => "done".to_string(),
            OperationStatus::Failed { kind, .. } => format!("FAILED({kind})"),
        };
        println!("{label:>12}  {}", outcome.operation.describe());
    }

    println!(
        "Scanned {} source file(s), {} target file(s) in {} ms.",
        report.metrics.source_files, report.metrics.target_files, report.metrics.elapsed_ms
    );
    println!(
        "Planned: {} rename(s), {} copy(ies), {} move(s), {} delete(s).",
        report.metrics.planned_renames,
        report.metrics.planned_copies,
        report.metrics.planned_moves,
        report.metrics.planned_deletes
    );
    if report.dry_run {
        println!("Dry run: nothing was changed. Re-run with --apply to perform operations.");
    } else {
        println!(
            "Applied {} operation(s), {} failed.",
            report.metrics.applied, report.metrics.failed
        );
    }
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }

    if let Some(path) = output {
        let payload =
            serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        fs::write(&path, payload)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

fn run_scan_command(args: ScanArgs) -> Result<()> {
    let ScanArgs {
        folder,
        db,
        max_depth,
        exclude,
    } = args;

    let mut store = SqliteStore::open(&db)
        .with_context(|| format!("failed to open inventory store {}", db.display()))?;
    let limits = ScanLimits {
        max_depth,
        excludes: exclude,
    };
    let mut warnings = Vec::new();
    let summary = build_inventory(&folder, &limits, &mut store, &mut warnings)
        .with_context(|| format!("failed to inventory {}", folder.display()))?;

    println!(
        "Inventoried {}: {} file(s), {} byte(s).",
        folder.display(),
        summary.files,
        summary.bytes
    );
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
