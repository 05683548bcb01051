// ── Directory synchronization ──
//
// `SyncEngine` runs sessions; `SyncHandle` observes one.

mod engine;
mod progress;

pub use engine::SyncEngine;
pub use progress::{
    ItemSyncStatus, SyncHandle, SyncMode, SyncProgress, SyncScope, SyncState, SyncSummary,
};
