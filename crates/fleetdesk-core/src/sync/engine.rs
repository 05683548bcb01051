// ── Sync engine ──
//
// Background sessions that page through the directory and reconcile the
// local cache. At most one listing session per entity kind runs at a
// time; a second start request joins the one in flight. Item refreshes
// run on their own.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::progress::{ItemSyncStatus, SyncHandle, SyncMode, SyncProgress, SyncScope};
use crate::config::SyncConfig;
use crate::directory::{Directory, DirectoryEntity, PageRequest};
use crate::error::CoreError;
use crate::hierarchy::ROOT_PATH;
use crate::model::{CachedEntity, Device, EntityKind, ExternalId, OrgUnit, User};
use crate::store::{CompleteListing, FleetStore};

pub struct SyncEngine<D: Directory> {
    directory: Arc<D>,
    store: Arc<FleetStore>,
    config: SyncConfig,
    active: Arc<DashMap<EntityKind, SyncHandle>>,
}

impl<D: Directory> Clone for SyncEngine<D> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

impl<D: Directory> SyncEngine<D> {
    pub fn new(directory: Arc<D>, store: Arc<FleetStore>, config: SyncConfig) -> Self {
        Self {
            directory,
            store,
            config,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Start a session for `T`, or join the listing already running.
    ///
    /// Full and org-unit listings share one guard per kind: a second
    /// listing request joins the one in flight and its scope is ignored.
    /// `Items` refreshes always get a session of their own, even while a
    /// listing runs, because that listing may have read the rows before
    /// they changed. Must be called from within a tokio runtime.
    pub fn start<T: DirectoryEntity>(&self, scope: SyncScope) -> SyncHandle {
        if matches!(scope, SyncScope::Items(_)) {
            return self.launch::<T>(scope);
        }

        // The entry guard is held until the new handle is registered, so
        // two concurrent starts cannot both spawn.
        match self.active.entry(T::KIND) {
            Entry::Occupied(entry) if !entry.get().is_finished() => {
                let handle = entry.get().clone();
                info!(kind = %T::KIND, session = %handle.session_id(), "joining sync in flight");
                handle
            }
            entry => {
                let handle = self.launch::<T>(scope);
                entry.insert(handle.clone());
                handle
            }
        }
    }

    fn launch<T: DirectoryEntity>(&self, scope: SyncScope) -> SyncHandle {
        let mode = if T::cache(&self.store).last_full_sync().is_some() {
            SyncMode::Incremental
        } else {
            SyncMode::Initial
        };
        let session_id = Uuid::new_v4();
        let (tx, rx) = watch::channel(SyncProgress::new(T::KIND, session_id, mode, scope.clone()));
        let handle = SyncHandle::new(rx);

        info!(kind = %T::KIND, session = %session_id, %mode, ?scope, "sync started");
        let session = Session {
            engine: self.clone(),
            session_id,
            scope,
            tx,
        };
        tokio::spawn(session.run::<T>());
        handle
    }

    /// Runtime dispatch of [`start`](Self::start) by entity kind.
    pub fn start_kind(&self, kind: EntityKind, scope: SyncScope) -> SyncHandle {
        match kind {
            EntityKind::Devices => self.start::<Device>(scope),
            EntityKind::Users => self.start::<User>(scope),
            EntityKind::OrgUnits => self.start::<OrgUnit>(scope),
        }
    }

    /// The listing session currently running for `kind`, if any.
    pub fn active(&self, kind: EntityKind) -> Option<SyncHandle> {
        self.active
            .get(&kind)
            .map(|h| h.value().clone())
            .filter(|h| !h.is_finished())
    }

    pub fn is_syncing(&self, kind: EntityKind) -> bool {
        self.active(kind).is_some()
    }
}

// ── Session task ─────────────────────────────────────────────────────

struct Session<D: Directory> {
    engine: SyncEngine<D>,
    session_id: Uuid,
    scope: SyncScope,
    tx: watch::Sender<SyncProgress>,
}

impl<D: Directory> Session<D> {
    async fn run<T: DirectoryEntity>(self) {
        let started = Instant::now();
        let result = match &self.scope {
            SyncScope::Full => self.sync_listing::<T>(None).await,
            SyncScope::OrgUnit(path) => self.sync_listing::<T>(Some(path.clone())).await,
            SyncScope::Items(ids) => {
                self.sync_items::<T>(ids).await;
                Ok(())
            }
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(()) => {
                self.tx.send_modify(|p| p.complete(duration_ms));
                let progress = self.tx.borrow();
                info!(
                    kind = %T::KIND,
                    session = %self.session_id,
                    processed = progress.processed,
                    created = progress.summary.created,
                    updated = progress.summary.updated,
                    removed = progress.summary.removed,
                    failed = progress.summary.failed,
                    duration_ms,
                    "sync completed"
                );
            }
            Err(e) => {
                warn!(kind = %T::KIND, session = %self.session_id, error = %e, "sync failed");
                self.tx.send_modify(|p| p.fail(&e, duration_ms));
            }
        }

        let session_id = self.session_id;
        self.engine
            .active
            .remove_if(&T::KIND, |_, handle| handle.session_id() == session_id);
    }

    /// Page through a listing. A failed page ends the session; pages
    /// already applied stay applied.
    async fn sync_listing<T: DirectoryEntity>(
        &self,
        org_unit_path: Option<String>,
    ) -> Result<(), CoreError> {
        let directory: &D = &self.engine.directory;
        let page_size = self.engine.config.page_size.max(1);
        let mut seen: HashSet<ExternalId> = HashSet::new();
        let mut request = PageRequest {
            page_token: None,
            page_size,
            org_unit_path,
        };

        loop {
            let req = &request;
            let page = self
                .fetch_with_retry::<T, _, _, _>(move || T::fetch_page(directory, req))
                .await?;

            let has_more = page.next_page_token.as_deref().is_some_and(|t| !t.is_empty());
            let fetched = u64::try_from(page.items.len()).unwrap_or(u64::MAX);
            let ids: Vec<ExternalId> = page
                .items
                .iter()
                .map(|e| e.external_id().clone())
                .collect();

            self.tx.send_modify(|p| p.mark(&ids, ItemSyncStatus::Syncing));
            let report = T::cache(&self.engine.store).upsert_batch(page.items);
            seen.extend(ids.iter().cloned());
            self.tx.send_modify(|p| {
                p.apply_report(&ids, &report);
                p.record_page(fetched, page.total_count, has_more, u64::from(page_size));
            });
            debug!(
                kind = %T::KIND,
                fetched,
                applied = report.applied(),
                failed = report.failed.len(),
                has_more,
                "page applied"
            );

            if !has_more {
                break;
            }
            request.page_token = page.next_page_token;
        }

        if self.scope == SyncScope::Full {
            let cache = T::cache(&self.engine.store);
            let removed = cache.sweep_tombstones(&seen, &CompleteListing::new(ROOT_PATH));
            self.tx.send_modify(|p| p.summary.removed = removed.len());
            if let Err(e) = cache.record_full_sync(Utc::now()) {
                warn!(kind = %T::KIND, error = %e, "could not record full sync time");
            }
        }
        Ok(())
    }

    /// Re-fetch each listed record. Per-item failures are recorded and
    /// never fail the session.
    async fn sync_items<T: DirectoryEntity>(&self, ids: &[ExternalId]) {
        let directory: &D = &self.engine.directory;
        self.tx.send_modify(|p| {
            p.total_expected = Some(u64::try_from(ids.len()).unwrap_or(u64::MAX));
            p.mark(ids, ItemSyncStatus::Pending);
        });

        for id in ids {
            self.tx
                .send_modify(|p| p.mark(std::slice::from_ref(id), ItemSyncStatus::Syncing));

            match self
                .fetch_with_retry::<T, _, _, _>(move || T::fetch_one(directory, id))
                .await
            {
                Ok(Some(entity)) => {
                    let report = T::cache(&self.engine.store).upsert_batch(vec![entity]);
                    self.tx
                        .send_modify(|p| p.apply_report(std::slice::from_ref(id), &report));
                }
                Ok(None) => {
                    // Removal is left to the next full sync.
                    debug!(kind = %T::KIND, id = %id, "record no longer in directory");
                    self.tx
                        .send_modify(|p| p.mark(std::slice::from_ref(id), ItemSyncStatus::Done));
                }
                Err(e) => {
                    warn!(kind = %T::KIND, id = %id, error = %e, "item refresh failed");
                    self.tx.send_modify(|p| {
                        p.mark(std::slice::from_ref(id), ItemSyncStatus::Failed);
                        p.summary.failed += 1;
                    });
                }
            }
            self.tx.send_modify(SyncProgress::record_item);
        }
    }

    /// Run `fetch` until it succeeds, fails permanently, or runs out of
    /// attempts. Backoff doubles per retry and honors the directory's
    /// retry-after hint.
    async fn fetch_with_retry<T, F, Fut, R>(&self, mut fetch: F) -> Result<R, CoreError>
    where
        T: CachedEntity,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, CoreError>>,
    {
        let config = &self.engine.config;
        let max_attempts = config.max_page_attempts.max(1);
        let mut backoff = config.initial_backoff;
        let mut attempt = 1;

        loop {
            match fetch().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let wait = e.retry_after().map_or(backoff, |hint| hint.max(backoff));
                    warn!(
                        kind = %T::KIND,
                        attempt,
                        max_attempts,
                        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "fetch failed, retrying"
                    );
                    self.tx.send_modify(|p| p.summary.retries += 1);
                    sleep(wait).await;
                    backoff = backoff.saturating_mul(2).min(config.max_backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
