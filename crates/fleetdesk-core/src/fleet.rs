// ── Fleet facade ──
//
// The one type collaborators hold: cache reads, sync sessions, unified
// search, batch lifecycle operations, and single-user updates over a
// shared store and directory.

use std::collections::BTreeMap;
use std::sync::Arc;

use fleetdesk_api::{DirectoryClient, TlsMode, TransportConfig, UserPatch};
use tracing::{info, warn};

use crate::config::{BatchConfig, FleetConfig, SearchConfig, SyncConfig, TlsVerification};
use crate::directory::Directory;
use crate::error::CoreError;
use crate::hierarchy::{OrgTree, parse_org_path};
use crate::lifecycle::{
    BatchOperation, BatchOutcome, DeviceLifecycle, LifecycleOrchestrator, TicketSender,
};
use crate::model::{CachedEntity, Device, EntityKind, ExternalId, OrgUnit, User};
use crate::search::UnifiedSearch;
use crate::store::FleetStore;
use crate::stream::{EntityFilter, EntityStream};
use crate::sync::{SyncEngine, SyncHandle, SyncScope};

/// The production fleet, backed by the HTTP directory client.
pub type DirectoryFleet = Fleet<DirectoryClient>;

/// Cheaply cloneable via `Arc<FleetInner>`.
pub struct Fleet<D: Directory> {
    inner: Arc<FleetInner<D>>,
}

impl<D: Directory> Clone for Fleet<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct FleetInner<D: Directory> {
    directory: Arc<D>,
    store: Arc<FleetStore>,
    sync: SyncEngine<D>,
    device_search: UnifiedSearch<D, Device>,
    user_search: UnifiedSearch<D, User>,
    lifecycle: LifecycleOrchestrator<D>,
}

impl Fleet<DirectoryClient> {
    /// Build the production client and open the cache described by
    /// `config`. Nothing is fetched until a sync is started.
    pub fn connect(config: FleetConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            tls: match &config.directory.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            },
            timeout: config.directory.timeout,
        };
        let client = DirectoryClient::new(
            config.directory.base_url.as_str(),
            config.directory.customer.clone(),
            &config.directory.token,
            &transport,
        )?;

        let store = match &config.cache_dir {
            Some(dir) => FleetStore::open_dir(dir)?,
            None => FleetStore::in_memory(),
        };
        info!(
            directory = %config.directory.base_url,
            customer = %config.directory.customer,
            cache = ?config.cache_dir,
            "fleet ready"
        );

        Ok(Self::new(
            Arc::new(client),
            Arc::new(store),
            config.sync,
            config.batch,
            config.search,
        ))
    }
}

impl<D: Directory> Fleet<D> {
    pub fn new(
        directory: Arc<D>,
        store: Arc<FleetStore>,
        sync: SyncConfig,
        batch: BatchConfig,
        search: SearchConfig,
    ) -> Self {
        let sync = SyncEngine::new(Arc::clone(&directory), Arc::clone(&store), sync);
        let device_search =
            UnifiedSearch::new(Arc::clone(&directory), Arc::clone(&store), search.clone());
        let user_search = UnifiedSearch::new(Arc::clone(&directory), Arc::clone(&store), search);
        let lifecycle =
            LifecycleOrchestrator::new(Arc::clone(&directory), Arc::clone(&store), sync.clone(), batch);

        Self {
            inner: Arc::new(FleetInner {
                directory,
                store,
                sync,
                device_search,
                user_search,
                lifecycle,
            }),
        }
    }

    pub fn store(&self) -> &Arc<FleetStore> {
        &self.inner.store
    }

    // ── Cache reads ──────────────────────────────────────────────────

    pub fn devices(&self, filter: &EntityFilter<Device>) -> Vec<Arc<Device>> {
        self.inner.store.devices().query(filter)
    }

    pub fn users(&self, filter: &EntityFilter<User>) -> Vec<Arc<User>> {
        self.inner.store.users().query(filter)
    }

    pub fn org_units(&self) -> Vec<Arc<OrgUnit>> {
        self.inner.store.org_units().query(&EntityFilter::All)
    }

    pub fn org_tree(&self) -> OrgTree {
        self.inner.store.org_tree()
    }

    /// Exact-path entity counts for `kind`.
    pub fn counts_by_path(&self, kind: EntityKind) -> BTreeMap<String, usize> {
        match kind {
            EntityKind::Devices => self.inner.store.devices().counts_by_path(),
            EntityKind::Users => self.inner.store.users().counts_by_path(),
            EntityKind::OrgUnits => self.inner.store.org_units().counts_by_path(),
        }
    }

    pub fn device_stream(&self) -> EntityStream<Device> {
        self.inner.store.devices().subscribe()
    }

    pub fn user_stream(&self) -> EntityStream<User> {
        self.inner.store.users().subscribe()
    }

    // ── Sync ─────────────────────────────────────────────────────────

    pub fn start_sync(&self, kind: EntityKind, scope: SyncScope) -> SyncHandle {
        self.inner.sync.start_kind(kind, scope)
    }

    pub fn active_sync(&self, kind: EntityKind) -> Option<SyncHandle> {
        self.inner.sync.active(kind)
    }

    // ── Search ───────────────────────────────────────────────────────

    pub fn device_search(&self) -> &UnifiedSearch<D, Device> {
        &self.inner.device_search
    }

    pub fn user_search(&self) -> &UnifiedSearch<D, User> {
        &self.inner.user_search
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub async fn run_batch(
        &self,
        operation: BatchOperation,
        identifiers: &[String],
        updates: Option<TicketSender>,
    ) -> Result<BatchOutcome, CoreError> {
        self.inner
            .lifecycle
            .run_batch(operation, identifiers, updates)
            .await
    }

    pub fn apply_local_transition(
        &self,
        identifier: &str,
        action: DeviceLifecycle,
    ) -> Result<Arc<Device>, CoreError> {
        self.inner
            .lifecycle
            .apply_local_transition(identifier, action)
    }

    pub fn resolve_device(&self, identifier: &str) -> Result<Arc<Device>, CoreError> {
        self.inner.lifecycle.resolve(identifier)
    }

    // ── Users ────────────────────────────────────────────────────────

    pub async fn suspend_user(
        &self,
        user: &str,
        reason: Option<String>,
    ) -> Result<Arc<User>, CoreError> {
        let patch = UserPatch {
            suspended: Some(true),
            suspension_reason: reason,
            org_unit_path: None,
        };
        self.update_user(user, &patch).await
    }

    pub async fn unsuspend_user(&self, user: &str) -> Result<Arc<User>, CoreError> {
        let patch = UserPatch {
            suspended: Some(false),
            ..UserPatch::default()
        };
        self.update_user(user, &patch).await
    }

    pub async fn move_user(&self, user: &str, org_unit_path: &str) -> Result<Arc<User>, CoreError> {
        let patch = UserPatch {
            org_unit_path: Some(parse_org_path(org_unit_path)?),
            ..UserPatch::default()
        };
        self.update_user(user, &patch).await
    }

    /// Directory first, then the cache. `user` is an email or a user id.
    async fn update_user(&self, user: &str, patch: &UserPatch) -> Result<Arc<User>, CoreError> {
        let cache = self.inner.store.users();
        let key = cache
            .find_by_natural_key(user.trim())
            .or_else(|| cache.get(&ExternalId::from(user.trim())))
            .map_or_else(|| ExternalId::from(user.trim()), |u| u.external_id.clone());

        let updated = self.inner.directory.update_user(&key, patch).await?;
        let id = updated.external_id().clone();
        let report = cache.upsert_batch(vec![updated.clone()]);
        if let Some((_, reason)) = report.failed.first() {
            warn!(user = %id, %reason, "user updated in directory but not cached");
        }
        info!(user = %id, ?patch, "user updated");
        Ok(cache.get(&id).unwrap_or_else(|| Arc::new(updated)))
    }
}
