use std::fs;
use std::path::Path;

use filetime::FileTime;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::model::{OperationOutcome, OperationStatus, SyncOperation};

/// Applies planned operations to the filesystem, or only reports them when
/// dry-run is active. Dry-run is the default; nothing is mutated until a
/// caller opts out. Failures become per-operation outcomes and the batch
/// continues; there is no retry and no rollback.
#[derive(Debug, Clone)]
pub struct Executor {
    dry_run: bool,
}

impl Default for Executor {
    fn default() -> Self {
        Self { dry_run: true }
    }
}

impl Executor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn execute(&self, operations: &[SyncOperation]) -> Vec<OperationOutcome> {
        operations
            .iter()
            .map(|operation| self.execute_one(operation))
            .collect()
    }

    fn execute_one(&self, operation: &SyncOperation) -> OperationOutcome {
        if self.dry_run {
            info!("dry-run: {}", operation.describe());
            return OperationOutcome {
                operation: operation.clone(),
                status: OperationStatus::Simulated,
            };
        }

        match self.apply(operation) {
            Ok(()) => {
                info!("applied: {}", operation.describe());
                OperationOutcome {
                    operation: operation.clone(),
                    status: OperationStatus::Applied,
                }
            }
            Err(err) => {
                warn!("failed: {}: {}", operation.describe(), err);
                OperationOutcome {
                    operation: operation.clone(),
                    status: OperationStatus::Failed {
                        kind: err.kind().to_string(),
                        message: err.to_string(),
                    },
                }
            }
        }
    }

    fn apply(&self, operation: &SyncOperation) -> Result<(), SyncError> {
        let subject = operation.subject();
        if !subject.exists() {
            return Err(SyncError::NotFound {
                path: subject.to_path_buf(),
            });
        }

        match operation {
            SyncOperation::Rename { from, to } | SyncOperation::Move { from, to } => {
                ensure_parent(to)?;
                relocate(from, to)
            }
            SyncOperation::Copy { from, to } => {
                ensure_parent(to)?;
                copy_preserving(from, to)
            }
            SyncOperation::Delete { path } => {
                fs::remove_file(path)?;
                Ok(())
            }
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Rename where the filesystem allows it; cross-device relocations degrade
/// to a stat-preserving copy followed by an unlink.
fn relocate(from: &Path, to: &Path) -> Result<(), SyncError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_preserving(from, to)?;
            fs::remove_file(from)?;
            Ok(())
        }
    }
}

/// Copy contents and permissions, then carry the source's timestamps over so
/// the copy keeps the same match key.
fn copy_preserving(from: &Path, to: &Path) -> Result<(), SyncError> {
    let metadata = fs::metadata(from)?;
    fs::copy(from, to)?;
    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_times(to, atime, mtime)?;
    Ok(())
}
