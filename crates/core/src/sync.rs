use std::path::PathBuf;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::SyncError;
use crate::executor::Executor;
use crate::inventory::{build_inventory, ScanLimits};
use crate::model::{
    OperationStatus, SyncMetrics, SyncMode, SyncReport, REPORT_VERSION,
};
use crate::planner::{plan, TreeRef};
use crate::store::{InventoryStore, SqliteStore};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub source: PathBuf,
    pub target: PathBuf,
    pub mode: SyncMode,
    /// No filesystem mutation when set; this is the default.
    pub dry_run: bool,
    /// Store location; `None` keeps the inventories in a throwaway
    /// in-memory database for the duration of the pass.
    pub db_path: Option<PathBuf>,
    pub max_depth: Option<usize>,
    pub excludes: Vec<String>,
    pub sync_id: Option<String>,
}

impl SyncOptions {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            mode: SyncMode::default(),
            dry_run: true,
            db_path: None,
            max_depth: None,
            excludes: Vec::new(),
            sync_id: None,
        }
    }
}

/// One full synchronization pass: rebuild both inventories, plan, execute,
/// report. Build-phase failures abort before anything is mutated; execution
/// failures surface as per-operation outcomes in the report.
pub fn run_sync(options: &SyncOptions) -> Result<SyncReport, SyncError> {
    let mut store: Box<dyn InventoryStore> = match &options.db_path {
        Some(path) => Box::new(SqliteStore::open(path)?),
        None => Box::new(SqliteStore::open_in_memory()?),
    };
    run_sync_with_store(options, store.as_mut())
}

/// Same as [`run_sync`] against a caller-owned store. The store handle is
/// shared by both folders' inventories for the duration of the pass; callers
/// synchronizing independent folder pairs in parallel must give each pair its
/// own store.
pub fn run_sync_with_store(
    options: &SyncOptions,
    store: &mut dyn InventoryStore,
) -> Result<SyncReport, SyncError> {
    let started = Instant::now();
    let sync_id = options
        .sync_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut warnings = Vec::new();

    info!(
        "sync {} starting: {} -> {} ({:?}, dry_run={})",
        sync_id,
        options.source.display(),
        options.target.display(),
        options.mode,
        options.dry_run
    );

    let limits = ScanLimits {
        max_depth: options.max_depth,
        excludes: options.excludes.clone(),
    };
    let source_summary = build_inventory(&options.source, &limits, store, &mut warnings)?;
    let target_summary = build_inventory(&options.target, &limits, store, &mut warnings)?;

    let source = TreeRef {
        root: options.source.clone(),
        folder: source_summary.folder.clone(),
    };
    let target = TreeRef {
        root: options.target.clone(),
        folder: target_summary.folder.clone(),
    };

    let plan = plan(store, options.mode, &source, &target)?;
    let mut metrics = SyncMetrics {
        source_files: source_summary.files,
        source_bytes: source_summary.bytes,
        target_files: target_summary.files,
        target_bytes: target_summary.bytes,
        ..SyncMetrics::default()
    };
    plan.record_counts(&mut metrics);

    let executor = Executor::new(options.dry_run);
    let outcomes = executor.execute(&plan.into_operations());
    for outcome in &outcomes {
        match &outcome.status {
            OperationStatus::Simulated => metrics.simulated += 1,
            OperationStatus::Applied => metrics.applied += 1,
            OperationStatus::Failed { message, .. } => {
                metrics.failed += 1;
                warnings.push(format!(
                    "operation failed: {}: {}",
                    outcome.operation.describe(),
                    message
                ));
            }
        }
    }
    metrics.elapsed_ms = started.elapsed().as_millis() as u64;

    info!(
        "sync {} finished: {} operation(s), {} applied, {} simulated, {} failed",
        sync_id,
        outcomes.len(),
        metrics.applied,
        metrics.simulated,
        metrics.failed
    );

    Ok(SyncReport {
        report_version: REPORT_VERSION.to_string(),
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        sync_id,
        source_root: options.source.to_string_lossy().to_string(),
        target_root: options.target.to_string_lossy().to_string(),
        mode: options.mode,
        dry_run: options.dry_run,
        metrics,
        operations: outcomes,
        warnings,
    })
}
