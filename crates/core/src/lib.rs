pub mod error;
pub mod executor;
pub mod inventory;
pub mod model;
pub mod planner;
pub mod store;
pub mod sync;

pub use error::SyncError;
pub use executor::Executor;
pub use inventory::{build_inventory, scan_folder, ExcludeMatcher, InventorySummary, ScanLimits};
pub use model::{
    FileRecord, MatchKey, OperationOutcome, OperationStatus, SyncMetrics, SyncMode, SyncOperation,
    SyncReport, REPORT_VERSION,
};
pub use planner::{plan, plan_mirror, plan_move, MirrorPlan, MovePlan, SyncPlan, TreeRef};
pub use store::{FolderId, InventoryStore, KeyGroup, MemoryStore, SqliteStore};
pub use sync::{run_sync, run_sync_with_store, SyncOptions};
