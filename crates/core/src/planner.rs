use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SyncError;
use crate::model::{FileRecord, SyncMetrics, SyncMode, SyncOperation};
use crate::store::{FolderId, InventoryStore, KeyGroup};

/// One folder as the planner sees it: its filesystem root plus its identity
/// in the inventory store.
#[derive(Debug, Clone)]
pub struct TreeRef {
    pub root: PathBuf,
    pub folder: FolderId,
}

impl TreeRef {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            folder: FolderId::for_path(root),
        }
    }
}

/// Mirror-mode plan. The stage fields make the ordering contract structural:
/// `into_operations` always emits renames, then copies, then deletes, so a
/// file a rename wants to reuse is never deleted first.
#[derive(Debug, Clone, Default)]
pub struct MirrorPlan {
    pub renames: Vec<SyncOperation>,
    pub copies: Vec<SyncOperation>,
    pub deletes: Vec<SyncOperation>,
}

impl MirrorPlan {
    pub fn is_empty(&self) -> bool {
        self.renames.is_empty() && self.copies.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.renames.len() + self.copies.len() + self.deletes.len()
    }

    pub fn into_operations(self) -> Vec<SyncOperation> {
        let mut operations = order_renames(self.renames);
        operations.extend(self.copies);
        operations.extend(self.deletes);
        operations
    }
}

/// Move-mode plan: relocations first, then deletions of source copies whose
/// content already exists at target. Target-side files are never touched.
#[derive(Debug, Clone, Default)]
pub struct MovePlan {
    pub moves: Vec<SyncOperation>,
    pub deletes: Vec<SyncOperation>,
}

impl MovePlan {
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.moves.len() + self.deletes.len()
    }

    pub fn into_operations(self) -> Vec<SyncOperation> {
        let mut operations = self.moves;
        operations.extend(self.deletes);
        operations
    }
}

#[derive(Debug, Clone)]
pub enum SyncPlan {
    Mirror(MirrorPlan),
    Move(MovePlan),
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        match self {
            SyncPlan::Mirror(plan) => plan.is_empty(),
            SyncPlan::Move(plan) => plan.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SyncPlan::Mirror(plan) => plan.len(),
            SyncPlan::Move(plan) => plan.len(),
        }
    }

    pub fn record_counts(&self, metrics: &mut SyncMetrics) {
        match self {
            SyncPlan::Mirror(plan) => {
                metrics.planned_renames = plan.renames.len() as u64;
                metrics.planned_copies = plan.copies.len() as u64;
                metrics.planned_deletes = plan.deletes.len() as u64;
            }
            SyncPlan::Move(plan) => {
                metrics.planned_moves = plan.moves.len() as u64;
                metrics.planned_deletes = plan.deletes.len() as u64;
            }
        }
    }

    pub fn into_operations(self) -> Vec<SyncOperation> {
        match self {
            SyncPlan::Mirror(plan) => plan.into_operations(),
            SyncPlan::Move(plan) => plan.into_operations(),
        }
    }
}

pub fn plan(
    store: &dyn InventoryStore,
    mode: SyncMode,
    source: &TreeRef,
    target: &TreeRef,
) -> Result<SyncPlan, SyncError> {
    match mode {
        SyncMode::Mirror => Ok(SyncPlan::Mirror(plan_mirror(store, source, target)?)),
        SyncMode::Move => Ok(SyncPlan::Move(plan_move(store, source, target)?)),
    }
}

/// Mirror planning.
///
/// Stage 1 walks every match key present on both sides and pairs records
/// one-to-one: records already at the source-implied path stay put, each
/// remaining source record claims one remaining target record as a rename,
/// surplus sources become copies and surplus targets become deletes. The
/// pairing is deterministic (store order) and never emits two operations for
/// the same file, so an ambiguous key cannot produce contradictory renames.
///
/// Stage 2 copies every source record whose key target lacks; stage 3
/// deletes every target record whose key source lacks; stage 4 drops deletes
/// whose path a rename or copy has already claimed as its destination.
pub fn plan_mirror(
    store: &dyn InventoryStore,
    source: &TreeRef,
    target: &TreeRef,
) -> Result<MirrorPlan, SyncError> {
    let mut plan = MirrorPlan::default();

    for group in store.shared_keys(&source.folder, &target.folder)? {
        pair_key_group(group, source, target, &mut plan);
    }

    for record in store.missing_in(&source.folder, &target.folder)? {
        plan.copies.push(SyncOperation::Copy {
            from: record.absolute_path(&source.root),
            to: record.absolute_path(&target.root),
        });
    }

    for record in store.missing_in(&target.folder, &source.folder)? {
        plan.deletes.push(SyncOperation::Delete {
            path: record.absolute_path(&target.root),
        });
    }

    let claimed: HashSet<PathBuf> = plan
        .renames
        .iter()
        .chain(plan.copies.iter())
        .filter_map(|operation| operation.destination().map(Path::to_path_buf))
        .collect();
    plan.deletes.retain(|operation| match operation {
        SyncOperation::Delete { path } => !claimed.contains(path),
        _ => true,
    });

    debug!(
        "mirror plan: {} rename(s), {} copy(ies), {} delete(s)",
        plan.renames.len(),
        plan.copies.len(),
        plan.deletes.len()
    );
    Ok(plan)
}

fn pair_key_group(group: KeyGroup, source: &TreeRef, target: &TreeRef, plan: &mut MirrorPlan) {
    let KeyGroup {
        in_a: sources,
        in_b: mut targets,
        ..
    } = group;

    // records already at their source-implied path need nothing
    let mut unmatched_sources: Vec<FileRecord> = Vec::new();
    for record in sources {
        let wanted = record.relative_path();
        if let Some(position) = targets
            .iter()
            .position(|candidate| candidate.relative_path() == wanted)
        {
            targets.remove(position);
        } else {
            unmatched_sources.push(record);
        }
    }

    let mut targets = targets.into_iter();
    for record in unmatched_sources {
        match targets.next() {
            Some(existing) => plan.renames.push(SyncOperation::Rename {
                from: existing.absolute_path(&target.root),
                to: record.absolute_path(&target.root),
            }),
            None => plan.copies.push(SyncOperation::Copy {
                from: record.absolute_path(&source.root),
                to: record.absolute_path(&target.root),
            }),
        }
    }
    for leftover in targets {
        plan.deletes.push(SyncOperation::Delete {
            path: leftover.absolute_path(&target.root),
        });
    }
}

/// Order renames so that no rename lands on a path another pending rename
/// still needs to vacate. A cycle of renames (files swapping paths) is broken
/// by parking one member at a temporary sibling path and renaming it into
/// place once its destination is free.
fn order_renames(mut pending: Vec<SyncOperation>) -> Vec<SyncOperation> {
    let mut ordered = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let occupied: HashSet<PathBuf> = pending
            .iter()
            .map(|operation| operation.subject().to_path_buf())
            .collect();
        let (ready, mut blocked): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|operation| {
                operation
                    .destination()
                    .map_or(true, |destination| !occupied.contains(destination))
            });
        if ready.is_empty() {
            // every remaining rename waits on another one: a cycle
            match blocked.first().cloned() {
                Some(SyncOperation::Rename { from, to }) => {
                    let parked = parked_path(&from);
                    ordered.push(SyncOperation::Rename {
                        from,
                        to: parked.clone(),
                    });
                    blocked[0] = SyncOperation::Rename { from: parked, to };
                }
                _ => {
                    ordered.extend(blocked);
                    break;
                }
            }
        } else {
            ordered.extend(ready);
        }
        pending = blocked;
    }
    ordered
}

/// Temporary sibling used to break a rename cycle; lives next to the file it
/// parks so the final rename stays on the same filesystem.
fn parked_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsStr::to_os_string).unwrap_or_default();
    name.push(".smartsync-tmp");
    path.with_file_name(name)
}

/// Move planning: source records with no key match at target are relocated;
/// the rest already exist at target and their source copy is discarded.
pub fn plan_move(
    store: &dyn InventoryStore,
    source: &TreeRef,
    target: &TreeRef,
) -> Result<MovePlan, SyncError> {
    let mut plan = MovePlan::default();

    for record in store.missing_in(&source.folder, &target.folder)? {
        plan.moves.push(SyncOperation::Move {
            from: record.absolute_path(&source.root),
            to: record.absolute_path(&target.root),
        });
    }

    for group in store.shared_keys(&source.folder, &target.folder)? {
        for record in group.in_a {
            plan.deletes.push(SyncOperation::Delete {
                path: record.absolute_path(&source.root),
            });
        }
    }

    debug!(
        "move plan: {} move(s), {} delete(s)",
        plan.moves.len(),
        plan.deletes.len()
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{plan_mirror, plan_move, TreeRef};
    use crate::model::{FileRecord, SyncOperation};
    use crate::store::{InventoryStore, MemoryStore};

    fn record(dir: &str, name: &str, size: u64, mtime: f64) -> FileRecord {
        FileRecord {
            relative_dir: PathBuf::from(dir),
            name: name.to_string(),
            size,
            mtime,
        }
    }

    fn trees() -> (TreeRef, TreeRef) {
        (
            TreeRef::new(Path::new("/virtual/source")),
            TreeRef::new(Path::new("/virtual/target")),
        )
    }

    fn populate(
        store: &mut MemoryStore,
        tree: &TreeRef,
        records: &[FileRecord],
    ) {
        store.replace(&tree.folder, records).expect("populate");
    }

    #[test]
    fn relocated_file_becomes_a_rename_not_copy_plus_delete() {
        let (source, target) = trees();
        let mut store = MemoryStore::new();
        populate(&mut store, &source, &[record("a", "x.txt", 10, 100.0)]);
        populate(&mut store, &target, &[record("b", "x.txt", 10, 100.0)]);

        let plan = plan_mirror(&store, &source, &target).expect("plan");
        assert_eq!(plan.renames.len(), 1);
        assert!(plan.copies.is_empty());
        assert!(plan.deletes.is_empty());
        assert_eq!(
            plan.renames[0],
            SyncOperation::Rename {
                from: PathBuf::from("/virtual/target/b/x.txt"),
                to: PathBuf::from("/virtual/target/a/x.txt"),
            }
        );
    }

    #[test]
    fn identical_trees_plan_nothing() {
        let (source, target) = trees();
        let mut store = MemoryStore::new();
        let records = [
            record(".", "a.txt", 5, 100.0),
            record("sub", "b.txt", 7, 200.0),
        ];
        populate(&mut store, &source, &records);
        populate(&mut store, &target, &records);

        let plan = plan_mirror(&store, &source, &target).expect("plan");
        assert!(plan.is_empty());
    }

    #[test]
    fn source_only_files_are_copied_and_target_only_deleted() {
        let (source, target) = trees();
        let mut store = MemoryStore::new();
        populate(&mut store, &source, &[record(".", "new.txt", 5, 100.0)]);
        populate(&mut store, &target, &[record(".", "old.txt", 9, 900.0)]);

        let plan = plan_mirror(&store, &source, &target).expect("plan");
        assert!(plan.renames.is_empty());
        assert_eq!(
            plan.copies,
            vec![SyncOperation::Copy {
                from: PathBuf::from("/virtual/source/new.txt"),
                to: PathBuf::from("/virtual/target/new.txt"),
            }]
        );
        assert_eq!(
            plan.deletes,
            vec![SyncOperation::Delete {
                path: PathBuf::from("/virtual/target/old.txt"),
            }]
        );
    }

    #[test]
    fn ambiguous_key_pairs_one_to_one_without_dropping_files() {
        let (source, target) = trees();
        let mut store = MemoryStore::new();
        populate(
            &mut store,
            &source,
            &[
                record("a", "one.txt", 10, 100.0),
                record("b", "two.txt", 10, 100.0),
            ],
        );
        populate(&mut store, &target, &[record("c", "old.txt", 10, 100.0)]);

        let plan = plan_mirror(&store, &source, &target).expect("plan");
        // exactly one decision per source file, the target file reused once
        assert_eq!(plan.renames.len(), 1);
        assert_eq!(plan.copies.len(), 1);
        assert!(plan.deletes.is_empty());

        let rename_to = match &plan.renames[0] {
            SyncOperation::Rename { to, .. } => to.clone(),
            other => panic!("unexpected operation: {other:?}"),
        };
        let copy_to = match &plan.copies[0] {
            SyncOperation::Copy { to, .. } => to.clone(),
            other => panic!("unexpected operation: {other:?}"),
        };
        assert_ne!(rename_to, copy_to);
    }

    #[test]
    fn surplus_target_duplicates_are_deleted() {
        let (source, target) = trees();
        let mut store = MemoryStore::new();
        populate(&mut store, &source, &[record(".", "keep.txt", 10, 100.0)]);
        populate(
            &mut store,
            &target,
            &[
                record(".", "keep.txt", 10, 100.0),
                record("copies", "extra.txt", 10, 100.0),
            ],
        );

        let plan = plan_mirror(&store, &source, &target).expect("plan");
        assert!(plan.renames.is_empty());
        assert!(plan.copies.is_empty());
        assert_eq!(
            plan.deletes,
            vec![SyncOperation::Delete {
                path: PathBuf::from("/virtual/target/copies/extra.txt"),
            }]
        );
    }

    #[test]
    fn delete_yields_to_operation_claiming_the_same_path() {
        // target holds stale content at the exact path source wants filled
        let (source, target) = trees();
        let mut store = MemoryStore::new();
        populate(&mut store, &source, &[record(".", "a.txt", 5, 100.0)]);
        populate(&mut store, &target, &[record(".", "a.txt", 9, 900.0)]);

        let plan = plan_mirror(&store, &source, &target).expect("plan");
        assert_eq!(plan.copies.len(), 1);
        // the copy overwrites in place; deleting afterwards would destroy it
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn renames_emit_before_copies_and_deletes() {
        let (source, target) = trees();
        let mut store = MemoryStore::new();
        populate(
            &mut store,
            &source,
            &[
                record("a", "moved.txt", 10, 100.0),
                record(".", "new.txt", 5, 50.0),
            ],
        );
        populate(
            &mut store,
            &target,
            &[
                record("b", "moved.txt", 10, 100.0),
                record(".", "stale.txt", 9, 900.0),
            ],
        );

        let operations = plan_mirror(&store, &source, &target)
            .expect("plan")
            .into_operations();
        assert!(matches!(operations[0], SyncOperation::Rename { .. }));
        assert!(matches!(operations[1], SyncOperation::Copy { .. }));
        assert!(matches!(operations[2], SyncOperation::Delete { .. }));
    }

    #[test]
    fn chained_renames_vacate_before_landing() {
        // one rename's destination is the path another rename still occupies
        let (source, target) = trees();
        let mut store = MemoryStore::new();
        populate(
            &mut store,
            &source,
            &[
                record("docs", "report.txt", 10, 100.0),
                record("archive", "report.txt", 20, 200.0),
            ],
        );
        populate(
            &mut store,
            &target,
            &[
                record("old", "report.txt", 10, 100.0),
                record("docs", "report.txt", 20, 200.0),
            ],
        );

        let operations = plan_mirror(&store, &source, &target)
            .expect("plan")
            .into_operations();
        assert_eq!(operations.len(), 2);
        // docs/report.txt must move to archive/ before old/ lands on docs/
        assert_eq!(
            operations[0],
            SyncOperation::Rename {
                from: PathBuf::from("/virtual/target/docs/report.txt"),
                to: PathBuf::from("/virtual/target/archive/report.txt"),
            }
        );
        assert_eq!(
            operations[1],
            SyncOperation::Rename {
                from: PathBuf::from("/virtual/target/old/report.txt"),
                to: PathBuf::from("/virtual/target/docs/report.txt"),
            }
        );
    }

    #[test]
    fn swapped_paths_are_broken_with_a_parking_rename() {
        // two target files exchange paths; neither rename can go first
        let (source, target) = trees();
        let mut store = MemoryStore::new();
        populate(
            &mut store,
            &source,
            &[
                record(".", "x.txt", 3, 100.0),
                record(".", "y.txt", 4, 200.0),
            ],
        );
        populate(
            &mut store,
            &target,
            &[
                record(".", "x.txt", 4, 200.0),
                record(".", "y.txt", 3, 100.0),
            ],
        );

        let operations = plan_mirror(&store, &source, &target)
            .expect("plan")
            .into_operations();
        assert_eq!(
            operations,
            vec![
                SyncOperation::Rename {
                    from: PathBuf::from("/virtual/target/y.txt"),
                    to: PathBuf::from("/virtual/target/y.txt.smartsync-tmp"),
                },
                SyncOperation::Rename {
                    from: PathBuf::from("/virtual/target/x.txt"),
                    to: PathBuf::from("/virtual/target/y.txt"),
                },
                SyncOperation::Rename {
                    from: PathBuf::from("/virtual/target/y.txt.smartsync-tmp"),
                    to: PathBuf::from("/virtual/target/x.txt"),
                },
            ]
        );
    }

    #[test]
    fn move_mode_relocates_missing_and_discards_duplicates() {
        let (source, target) = trees();
        let mut store = MemoryStore::new();
        populate(
            &mut store,
            &source,
            &[
                record(".", "fresh.txt", 5, 100.0),
                record("sub", "dup.txt", 7, 200.0),
            ],
        );
        populate(
            &mut store,
            &target,
            &[
                record("elsewhere", "dup.txt", 7, 200.0),
                record(".", "target-only.txt", 9, 900.0),
            ],
        );

        let plan = plan_move(&store, &source, &target).expect("plan");
        assert_eq!(
            plan.moves,
            vec![SyncOperation::Move {
                from: PathBuf::from("/virtual/source/fresh.txt"),
                to: PathBuf::from("/virtual/target/fresh.txt"),
            }]
        );
        assert_eq!(
            plan.deletes,
            vec![SyncOperation::Delete {
                path: PathBuf::from("/virtual/source/sub/dup.txt"),
            }]
        );

        // moves come first so a failed relocation never follows its cleanup
        let operations = plan.into_operations();
        assert!(matches!(operations[0], SyncOperation::Move { .. }));
        assert!(matches!(operations[1], SyncOperation::Delete { .. }));
    }

    #[test]
    fn move_mode_never_touches_target_records() {
        let (source, target) = trees();
        let mut store = MemoryStore::new();
        populate(&mut store, &source, &[]);
        populate(
            &mut store,
            &target,
            &[record(".", "precious.txt", 9, 900.0)],
        );

        let plan = plan_move(&store, &source, &target).expect("plan");
        assert!(plan.is_empty());
    }
}
