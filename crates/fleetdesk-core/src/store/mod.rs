// ── Local fleet store ──
//
// One `EntityCache` per entity kind over a shared persistence backend.

mod cache;
mod collection;
mod persistence;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

pub use cache::{CompleteListing, EntityCache, UpsertReport};
pub use persistence::{FilePersistence, MemoryPersistence, Persistence};

use crate::error::CoreError;
use crate::hierarchy::OrgTree;
use crate::model::{Device, OrgUnit, User};

/// The single shared mutable resource: cached devices, users, and org units.
pub struct FleetStore {
    devices: EntityCache<Device>,
    users: EntityCache<User>,
    org_units: EntityCache<OrgUnit>,
}

impl FleetStore {
    pub fn open(persistence: Arc<dyn Persistence>) -> Result<Self, CoreError> {
        let store = Self {
            devices: EntityCache::open(Arc::clone(&persistence))?,
            users: EntityCache::open(Arc::clone(&persistence))?,
            org_units: EntityCache::open(persistence)?,
        };
        info!(
            devices = store.devices.len(),
            users = store.users.len(),
            org_units = store.org_units.len(),
            "fleet store opened"
        );
        Ok(store)
    }

    /// File-backed store rooted at `dir`.
    pub fn open_dir(dir: &Path) -> Result<Self, CoreError> {
        Self::open(Arc::new(FilePersistence::new(dir)))
    }

    /// Ephemeral store; nothing survives the process.
    pub fn in_memory() -> Self {
        let persistence: Arc<dyn Persistence> = Arc::new(MemoryPersistence::new());
        Self {
            devices: EntityCache::empty(Arc::clone(&persistence)),
            users: EntityCache::empty(Arc::clone(&persistence)),
            org_units: EntityCache::empty(persistence),
        }
    }

    pub fn devices(&self) -> &EntityCache<Device> {
        &self.devices
    }

    pub fn users(&self) -> &EntityCache<User> {
        &self.users
    }

    pub fn org_units(&self) -> &EntityCache<OrgUnit> {
        &self.org_units
    }

    /// The org unit tree as currently known: synced units plus every path
    /// referenced by a cached device or user.
    pub fn org_tree(&self) -> OrgTree {
        let units = self.org_units.snapshot();
        let devices = self.devices.snapshot();
        let users = self.users.snapshot();

        let extra = devices
            .iter()
            .map(|d| d.org_unit_path.as_str())
            .chain(users.iter().map(|u| u.org_unit_path.as_str()));
        OrgTree::from_org_units(units.iter().map(|u| &**u), extra)
    }
}
