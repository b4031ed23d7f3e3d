use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const REPORT_VERSION: &str = "1.0.0";

/// One regular file discovered during a scan. `relative_dir` is `"."` for
/// files sitting directly under the tree root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub relative_dir: PathBuf,
    pub name: String,
    pub size: u64,
    pub mtime: f64,
}

impl FileRecord {
    /// Path of this record relative to its tree root.
    pub fn relative_path(&self) -> PathBuf {
        if self.relative_dir == Path::new(".") {
            PathBuf::from(&self.name)
        } else {
            self.relative_dir.join(&self.name)
        }
    }

    /// Where this record lives (or would live) under `root`.
    pub fn absolute_path(&self, root: &Path) -> PathBuf {
        root.join(self.relative_path())
    }

    pub fn match_key(&self) -> MatchKey {
        MatchKey::of(self)
    }
}

/// The `(size, mtime)` content-equality heuristic. Two records from different
/// inventories are treated as the same content iff their keys are equal.
///
/// The mtime is kept as raw f64 bits so the key is `Eq + Hash`; both sides of
/// a comparison obtain mtimes from the same stat source, so bit equality and
/// value equality coincide. Replacing [`MatchKey::of`] with a hash-derived key
/// changes matching without touching the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchKey {
    pub size: u64,
    mtime_bits: u64,
}

impl MatchKey {
    pub fn of(record: &FileRecord) -> Self {
        Self {
            size: record.size,
            mtime_bits: record.mtime.to_bits(),
        }
    }

    pub fn mtime(&self) -> f64 {
        f64::from_bits(self.mtime_bits)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Reconcile target to match source via rename/copy/delete.
    #[default]
    Mirror,
    /// Relocate source files into target, deleting redundant source copies.
    Move,
}

/// A planned filesystem mutation. Paths are absolute; operations are derived
/// fresh from the two inventories on every pass and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SyncOperation {
    Rename { from: PathBuf, to: PathBuf },
    Copy { from: PathBuf, to: PathBuf },
    Delete { path: PathBuf },
    Move { from: PathBuf, to: PathBuf },
}

impl SyncOperation {
    /// The path that must still exist for this operation to be applicable.
    pub fn subject(&self) -> &Path {
        match self {
            SyncOperation::Rename { from, .. }
            | SyncOperation::Copy { from, .. }
            | SyncOperation::Move { from, .. } => from,
            SyncOperation::Delete { path } => path,
        }
    }

    /// Destination path, for operations that create or reassign one.
    pub fn destination(&self) -> Option<&Path> {
        match self {
            SyncOperation::Rename { to, .. }
            | SyncOperation::Copy { to, .. }
            | SyncOperation::Move { to, .. } => Some(to),
            SyncOperation::Delete { .. } => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SyncOperation::Rename { from, to } => {
                format!("rename {} -> {}", from.display(), to.display())
            }
            SyncOperation::Copy { from, to } => {
                format!("copy {} -> {}", from.display(), to.display())
            }
            SyncOperation::Delete { path } => format!("delete {}", path.display()),
            SyncOperation::Move { from, to } => {
                format!("move {} -> {}", from.display(), to.display())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum OperationStatus {
    /// Dry-run: the action was reported, the filesystem untouched.
    Simulated,
    Applied,
    Failed { kind: String, message: String },
}

/// Per-operation result. Failures never abort the remaining batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationOutcome {
    pub operation: SyncOperation,
    #[serde(flatten)]
    pub status: OperationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SyncMetrics {
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub source_files: u64,
    #[serde(default)]
    pub source_bytes: u64,
    #[serde(default)]
    pub target_files: u64,
    #[serde(default)]
    pub target_bytes: u64,
    #[serde(default)]
    pub planned_renames: u64,
    #[serde(default)]
    pub planned_copies: u64,
    #[serde(default)]
    pub planned_deletes: u64,
    #[serde(default)]
    pub planned_moves: u64,
    #[serde(default)]
    pub applied: u64,
    #[serde(default)]
    pub simulated: u64,
    #[serde(default)]
    pub failed: u64,
}

/// Full result of one synchronization pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncReport {
    pub report_version: String,
    pub generated_at: String,
    #[serde(default = "default_sync_id")]
    pub sync_id: String,
    pub source_root: String,
    pub target_root: String,
    pub mode: SyncMode,
    pub dry_run: bool,
    #[serde(default)]
    pub metrics: SyncMetrics,
    pub operations: Vec<OperationOutcome>,
    pub warnings: Vec<String>,
}

fn default_sync_id() -> String {
    "unknown".to_string()
}
