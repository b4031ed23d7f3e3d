use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::info;
use walkdir::WalkDir;

use crate::error::SyncError;
use crate::model::FileRecord;
use crate::store::{FolderId, InventoryStore};

/// Optional bounds on a scan. The defaults scan everything.
#[derive(Debug, Clone, Default)]
pub struct ScanLimits {
    pub max_depth: Option<usize>,
    pub excludes: Vec<String>,
}

pub struct ExcludeMatcher {
    globset: Option<GlobSet>,
}

impl ExcludeMatcher {
    pub fn new(patterns: &[String], warnings: &mut Vec<String>) -> Self {
        if patterns.is_empty() {
            return Self { globset: None };
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(err) => {
                    warnings.push(format!("invalid exclude glob '{pattern}': {err}; ignored."));
                }
            }
        }

        let globset = match builder.build() {
            Ok(set) if set.len() > 0 => Some(set),
            Ok(_) => None,
            Err(err) => {
                warnings.push(format!("failed to build exclude set: {err}"));
                None
            }
        };
        Self { globset }
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.globset
            .as_ref()
            .is_some_and(|set| set.is_match(path))
    }
}

/// What a completed rebuild committed to the store.
#[derive(Debug, Clone)]
pub struct InventorySummary {
    pub folder: FolderId,
    pub files: u64,
    pub bytes: u64,
}

fn access_error(path: &Path, source: std::io::Error) -> SyncError {
    SyncError::Access {
        path: path.to_path_buf(),
        source,
    }
}

/// Enumerate every regular file under `root`. Symlinks are not followed and
/// directories produce no records; an empty tree yields an empty inventory.
/// Any walk or stat failure aborts the scan with `Access`.
pub fn scan_folder(
    root: &Path,
    limits: &ScanLimits,
    excludes: &ExcludeMatcher,
) -> Result<Vec<FileRecord>, SyncError> {
    let mut records = Vec::new();

    let mut walker = WalkDir::new(root).follow_links(false);
    if let Some(depth) = limits.max_depth {
        walker = walker.max_depth(depth);
    }
    let iter = walker
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !excludes.is_excluded(entry.path()));

    for item in iter {
        let entry = item.map_err(|err| {
            let path = err
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf());
            SyncError::Access {
                path,
                source: err.into(),
            }
        })?;
        if entry.depth() == 0 || !entry.file_type().is_file() {
            continue;
        }

        let metadata = entry
            .metadata()
            .map_err(|err| access_error(entry.path(), err.into()))?;
        let modified = metadata
            .modified()
            .map_err(|err| access_error(entry.path(), err))?;
        let mtime = match modified.duration_since(UNIX_EPOCH) {
            Ok(duration) => duration.as_secs_f64(),
            Err(err) => -err.duration().as_secs_f64(),
        };

        let relative = entry.path().strip_prefix(root).map_err(|err| {
            access_error(
                entry.path(),
                std::io::Error::new(std::io::ErrorKind::Other, err),
            )
        })?;
        let relative_dir = match relative.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        records.push(FileRecord {
            relative_dir,
            name: entry.file_name().to_string_lossy().to_string(),
            size: metadata.len(),
            mtime,
        });
    }

    Ok(records)
}

/// Full rescan of `root`, replacing whatever the store previously held for
/// that folder. The commit is all-or-nothing: a failed scan leaves the prior
/// inventory untouched.
pub fn build_inventory(
    root: &Path,
    limits: &ScanLimits,
    store: &mut dyn InventoryStore,
    warnings: &mut Vec<String>,
) -> Result<InventorySummary, SyncError> {
    if !root.is_dir() {
        return Err(SyncError::Config {
            path: root.to_path_buf(),
        });
    }

    let excludes = ExcludeMatcher::new(&limits.excludes, warnings);
    let records = scan_folder(root, limits, &excludes)?;
    let folder = FolderId::for_path(root);
    store.replace(&folder, &records)?;

    let bytes = records.iter().map(|record| record.size).sum();
    info!(
        "inventory rebuilt for {}: {} file(s), {} byte(s)",
        root.display(),
        records.len(),
        bytes
    );
    Ok(InventorySummary {
        folder,
        files: records.len() as u64,
        bytes,
    })
}
