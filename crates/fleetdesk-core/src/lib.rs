//! Local fleet cache and lending workflows between `fleetdesk-api` and the
//! CLI.
//!
//! This crate owns the domain model, the persistent entity cache, and the
//! background machinery that keeps it in step with the directory:
//!
//! - **[`Fleet`]**: Central facade. [`connect()`](Fleet::connect) builds the
//!   directory client and opens the cache; every other operation (sync,
//!   search, batches, user updates) hangs off it.
//!
//! - **[`FleetStore`]**: One [`EntityCache<T>`] per entity kind over a shared
//!   persistence backend. Upserts are last-write-wins on fetch time and keep
//!   locally owned lending state.
//!
//! - **[`SyncEngine`]**: Paginated, resumable background sync with at most
//!   one session per entity kind, observed through a [`SyncHandle`].
//!
//! - **[`UnifiedSearch`]**: Local matches first, then a debounced directory
//!   lookup merged in by natural key.
//!
//! - **[`LifecycleOrchestrator`]**: Batch checkout / check-in / reset /
//!   migration with per-device [`LifecycleTicket`]s and a final
//!   [`BatchLedger`].
//!
//! - **Org hierarchy** ([`hierarchy`]): path normalization and the
//!   arena-backed [`OrgTree`].

pub mod config;
pub mod convert;
pub mod directory;
pub mod error;
pub mod fleet;
pub mod hierarchy;
pub mod lifecycle;
pub mod model;
pub mod search;
pub mod store;
pub mod stream;
pub mod sync;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{
    BatchConfig, DirectoryConfig, FleetConfig, SearchConfig, SyncConfig, TlsVerification,
};
pub use directory::{Directory, DirectoryEntity, PageRequest};
pub use error::CoreError;
pub use fleet::{DirectoryFleet, Fleet};
pub use hierarchy::{OrgTree, OrgTreeView, OrgUnitNode, ROOT_PATH, parse_org_path};
pub use lifecycle::{
    BatchLedger, BatchOperation, BatchOutcome, DeviceLifecycle, InvalidIdentifier,
    LifecycleOrchestrator, LifecycleTicket, OperationKind, TicketSender, TicketStatus,
};
pub use search::{HitSource, SearchHit, SearchResults, UnifiedSearch, merge_unique};
pub use store::{EntityCache, FleetStore, UpsertReport};
pub use stream::{EntityFilter, EntityStream};
pub use sync::{
    ItemSyncStatus, SyncEngine, SyncHandle, SyncMode, SyncProgress, SyncScope, SyncState,
    SyncSummary,
};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    CachedEntity, Device, EntityKind, ExternalId, LifecycleState, OrgUnit, StatusSource, User,
};
