// ── Entity cache ──
//
// Durable local store for one entity type. Reads are served from the
// in-memory collection and never wait on the network; writes go through
// to the persistence backend first, then become visible in memory.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::collection::EntityCollection;
use super::persistence::Persistence;
use crate::error::CoreError;
use crate::hierarchy::{count_by_exact_path, is_within};
use crate::model::{CachedEntity, ExternalId};
use crate::stream::{EntityFilter, EntityStream};

const META_NAMESPACE: &str = "meta";

// ── Upsert reporting ────────────────────────────────────────────────

/// Result of applying one batch of directory records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub created: usize,
    pub updated: usize,
    /// Incoming record identical to the cached one, fetch time included.
    pub unchanged: usize,
    /// Incoming record older than the cached one; ignored.
    pub stale: usize,
    /// Applied, but locally owned fields were kept.
    pub protected: usize,
    /// Records that could not be written, with the reason.
    pub failed: Vec<(ExternalId, String)>,
}

impl UpsertReport {
    pub fn applied(&self) -> usize {
        self.created + self.updated
    }
}

/// Proof that a sync session fetched the complete remote listing for
/// `scope`. Only the sync engine can mint one, which is what keeps
/// tombstone sweeps away from partial or filtered listings.
#[derive(Debug)]
pub struct CompleteListing {
    scope: String,
}

impl CompleteListing {
    pub(crate) fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

// ── EntityCache ─────────────────────────────────────────────────────

pub struct EntityCache<T: CachedEntity> {
    collection: EntityCollection<T>,
    persistence: Arc<dyn Persistence>,
    last_full_sync: watch::Sender<Option<DateTime<Utc>>>,
}

impl<T: CachedEntity> EntityCache<T> {
    /// Load every persisted record of this kind. Unreadable records are
    /// logged and skipped rather than failing the whole cache.
    pub fn open(persistence: Arc<dyn Persistence>) -> Result<Self, CoreError> {
        let collection = EntityCollection::new();
        let namespace = T::KIND.namespace();

        let mut loaded = Vec::new();
        for (key, bytes) in persistence.load(namespace)? {
            match serde_json::from_slice::<T>(&bytes) {
                Ok(entity) => loaded.push((entity.external_id().clone(), entity.natural_key(), entity)),
                Err(e) => warn!(kind = %T::KIND, key = %key, error = %e, "skipping corrupt cache record"),
            }
        }
        let count = loaded.len();
        collection.upsert_many(loaded);

        let last_full_sync = persistence
            .get(META_NAMESPACE, &last_full_sync_key::<T>())?
            .and_then(|bytes| serde_json::from_slice::<DateTime<Utc>>(&bytes).ok());

        debug!(kind = %T::KIND, count, ?last_full_sync, "opened entity cache");
        let (last_full_sync, _) = watch::channel(last_full_sync);
        Ok(Self {
            collection,
            persistence,
            last_full_sync,
        })
    }

    /// A cache with nothing loaded, over a fresh backend.
    pub(crate) fn empty(persistence: Arc<dyn Persistence>) -> Self {
        let (last_full_sync, _) = watch::channel(None);
        Self {
            collection: EntityCollection::new(),
            persistence,
            last_full_sync,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// Matching entities ordered by display name (case-insensitive), then
    /// natural key. Served from memory.
    pub fn query(&self, filter: &EntityFilter<T>) -> Vec<Arc<T>> {
        let mut hits: Vec<(String, String, Arc<T>)> = self
            .collection
            .snapshot()
            .iter()
            .filter(|e| filter.matches(e))
            .map(|e| (e.display_name().to_lowercase(), e.natural_key(), Arc::clone(e)))
            .collect();
        hits.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        hits.into_iter().map(|(_, _, e)| e).collect()
    }

    pub fn get(&self, id: &ExternalId) -> Option<Arc<T>> {
        self.collection.get(id)
    }

    /// Look up by natural key; the key is case-normalized here.
    pub fn find_by_natural_key(&self, key: &str) -> Option<Arc<T>> {
        self.collection
            .get_by_natural_key(key)
            .or_else(|| self.collection.get_by_natural_key(&key.to_lowercase()))
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.collection.snapshot()
    }

    pub fn subscribe(&self) -> EntityStream<T> {
        EntityStream::new(self.collection.subscribe())
    }

    /// Exact-path entity counts (see [`count_by_exact_path`]).
    pub fn counts_by_path(&self) -> BTreeMap<String, usize> {
        let snapshot = self.collection.snapshot();
        count_by_exact_path(snapshot.iter().map(|e| &**e))
    }

    pub fn len(&self) -> usize {
        self.collection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.len() == 0
    }

    /// Completion time of the last successful full sync, if any.
    pub fn last_full_sync(&self) -> Option<DateTime<Utc>> {
        *self.last_full_sync.borrow()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Apply a batch of directory records.
    ///
    /// Last-write-wins on `last_synced_at`: a record older than the cached
    /// copy is skipped. Re-applying the same batch changes nothing. A
    /// record that fails to persist is reported and the rest of the batch
    /// still applies. Each record is reconciled against the cached copy
    /// while holding its entry, so a concurrent [`apply_local`] is never
    /// overwritten.
    ///
    /// [`apply_local`]: Self::apply_local
    pub fn upsert_batch(&self, batch: Vec<T>) -> UpsertReport {
        let mut report = UpsertReport::default();
        let mut touched = false;

        for mut incoming in batch {
            let id = incoming.external_id().clone();
            if id.is_empty() {
                report
                    .failed
                    .push((id, "record has no directory id".to_owned()));
                continue;
            }

            let written = self
                .collection
                .update_unpublished(&id, |cached| -> Result<_, CoreError> {
                    if let Some(cached) = cached {
                        if incoming.last_synced_at() < cached.last_synced_at() {
                            report.stale += 1;
                            return Ok(None);
                        }
                        if incoming.reconcile_with_cached(cached) {
                            report.protected += 1;
                        }
                        if incoming == *cached {
                            report.unchanged += 1;
                            return Ok(None);
                        }
                    }
                    self.persist(&incoming)?;
                    if cached.is_some() {
                        report.updated += 1;
                    } else {
                        report.created += 1;
                    }
                    Ok(Some((incoming.natural_key(), incoming)))
                });

            match written {
                Ok(Some(_)) => touched = true,
                Ok(None) => {}
                Err(e) => {
                    warn!(kind = %T::KIND, id = %id, error = %e, "cache write failed");
                    report.failed.push((id, e.to_string()));
                }
            }
        }

        if touched {
            self.collection.publish();
        }
        report
    }

    /// Apply a local change to one cached record (lifecycle transitions,
    /// single-entity updates). The change is persisted before it is visible,
    /// and is serialized with directory upserts of the same record.
    /// `change` runs while the record is locked and must not touch this
    /// cache.
    pub fn apply_local(
        &self,
        id: &ExternalId,
        change: impl FnOnce(&mut T),
    ) -> Result<Arc<T>, CoreError> {
        let written = self.collection.update(id, |current| {
            let Some(current) = current else {
                return Err(CoreError::NotFound {
                    entity_type: T::KIND.to_string(),
                    identifier: id.to_string(),
                });
            };
            let mut updated = current.clone();
            change(&mut updated);
            self.persist(&updated)?;
            Ok(Some((updated.natural_key(), updated)))
        })?;
        written.ok_or_else(|| CoreError::Internal(format!("{} {id} was not written", T::KIND)))
    }

    /// Remove cached entities within the listing's scope that the listing
    /// did not report. Returns the removed ids.
    pub fn sweep_tombstones(
        &self,
        seen: &HashSet<ExternalId>,
        listing: &CompleteListing,
    ) -> Vec<ExternalId> {
        let doomed: Vec<ExternalId> = self
            .collection
            .snapshot()
            .iter()
            .filter(|e| is_within(e.org_unit_path(), listing.scope()))
            .map(|e| e.external_id().clone())
            .filter(|id| !seen.contains(id))
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for id in doomed {
            if let Err(e) = self.persistence.delete(T::KIND.namespace(), id.as_str()) {
                warn!(kind = %T::KIND, id = %id, error = %e, "tombstone delete failed; keeping record");
                continue;
            }
            self.collection.remove(&id);
            removed.push(id);
        }

        if !removed.is_empty() {
            info!(kind = %T::KIND, scope = listing.scope(), removed = removed.len(), "swept tombstones");
        }
        removed
    }

    pub(crate) fn record_full_sync(&self, at: DateTime<Utc>) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec(&at).map_err(CoreError::persistence)?;
        self.persistence
            .put(META_NAMESPACE, &last_full_sync_key::<T>(), &bytes)?;
        self.last_full_sync.send_replace(Some(at));
        Ok(())
    }

    fn persist(&self, entity: &T) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec(entity).map_err(CoreError::persistence)?;
        self.persistence
            .put(T::KIND.namespace(), entity.external_id().as_str(), &bytes)
    }
}

fn last_full_sync_key<T: CachedEntity>() -> String {
    format!("{}.last_full_sync", T::KIND)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::device::tests::device;
    use crate::model::{Device, LifecycleState, StatusSource};
    use crate::store::persistence::{FilePersistence, MemoryPersistence};
    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;
    use std::sync::{Mutex, mpsc};

    fn cache() -> EntityCache<Device> {
        EntityCache::open(Arc::new(MemoryPersistence::new())).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(secs)
    }

    fn synced(id: &str, serial: &str, ou: &str, secs: i64) -> Device {
        let mut d = device(id, serial, ou);
        d.last_synced_at = at(secs);
        d
    }

    /// Rejects writes for one key so per-record failure paths can be exercised.
    struct FailingPersistence {
        inner: MemoryPersistence,
        poisoned_key: &'static str,
    }

    impl Persistence for FailingPersistence {
        fn load(&self, ns: &str) -> Result<Vec<(String, Vec<u8>)>, CoreError> {
            self.inner.load(ns)
        }
        fn get(&self, ns: &str, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
            self.inner.get(ns, key)
        }
        fn put(&self, ns: &str, key: &str, value: &[u8]) -> Result<(), CoreError> {
            if key == self.poisoned_key {
                return Err(CoreError::persistence("disk full"));
            }
            self.inner.put(ns, key, value)
        }
        fn delete(&self, ns: &str, key: &str) -> Result<(), CoreError> {
            self.inner.delete(ns, key)
        }
    }

    /// Parks the first write after [`arm`](Self::arm) until released, so a
    /// second writer can be started while the first is mid-update.
    #[derive(Default)]
    struct GatedPersistence {
        inner: MemoryPersistence,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl GatedPersistence {
        fn arm(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (entered_tx, entered_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            *self.entered.lock().unwrap() = Some(entered_tx);
            *self.release.lock().unwrap() = Some(release_rx);
            (entered_rx, release_tx)
        }
    }

    impl Persistence for GatedPersistence {
        fn load(&self, ns: &str) -> Result<Vec<(String, Vec<u8>)>, CoreError> {
            self.inner.load(ns)
        }
        fn get(&self, ns: &str, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
            self.inner.get(ns, key)
        }
        fn put(&self, ns: &str, key: &str, value: &[u8]) -> Result<(), CoreError> {
            let entered = self.entered.lock().unwrap().take();
            if let Some(entered) = entered {
                let release = self.release.lock().unwrap().take().unwrap();
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
            self.inner.put(ns, key, value)
        }
        fn delete(&self, ns: &str, key: &str) -> Result<(), CoreError> {
            self.inner.delete(ns, key)
        }
    }

    #[test]
    fn upsert_is_idempotent() {
        let cache = cache();
        let batch = vec![synced("d-1", "SN1", "/A", 10), synced("d-2", "SN2", "/B", 10)];

        let first = cache.upsert_batch(batch.clone());
        assert_eq!(first.created, 2);
        let snapshot: Vec<Device> = cache.query(&EntityFilter::All).iter().map(|d| (**d).clone()).collect();

        let second = cache.upsert_batch(batch);
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.applied(), 0);
        let again: Vec<Device> = cache.query(&EntityFilter::All).iter().map(|d| (**d).clone()).collect();
        assert_eq!(again, snapshot);
    }

    #[test]
    fn older_records_never_overwrite_newer() {
        let cache = cache();
        cache.upsert_batch(vec![synced("d-1", "SN1", "/New", 20)]);

        let report = cache.upsert_batch(vec![synced("d-1", "SN1", "/Old", 10)]);
        assert_eq!(report.stale, 1);
        assert_eq!(cache.get(&ExternalId::from("d-1")).unwrap().org_unit_path, "/New");
    }

    #[test]
    fn lending_state_survives_sync() {
        let cache = cache();
        let mut loaned = synced("d-1", "SN1", "/A", 10);
        loaned.status = LifecycleState::PendingSignature;
        loaned.status_source = StatusSource::Local;
        loaned.assignee = Some("ada@school.example".into());
        cache.upsert_batch(vec![loaned]);

        let report = cache.upsert_batch(vec![synced("d-1", "SN1", "/B", 20)]);
        assert_eq!(report.protected, 1);
        assert_eq!(report.updated, 1);

        let cached = cache.get(&ExternalId::from("d-1")).unwrap();
        assert_eq!(cached.status, LifecycleState::PendingSignature);
        assert_eq!(cached.assignee.as_deref(), Some("ada@school.example"));
        assert_eq!(cached.org_unit_path, "/B");
    }

    #[test]
    fn checkout_during_a_sync_write_is_not_lost() {
        let gate = Arc::new(GatedPersistence::default());
        let cache: EntityCache<Device> =
            EntityCache::open(Arc::clone(&gate) as Arc<dyn Persistence>).unwrap();
        cache.upsert_batch(vec![synced("d-1", "SN1", "/A", 10)]);
        let (entered, release) = gate.arm();

        std::thread::scope(|s| {
            // A directory page, fetched before the checkout, parks mid-write.
            let sync = s.spawn(|| cache.upsert_batch(vec![synced("d-1", "SN1", "/B", 20)]));
            entered.recv().unwrap();

            let checkout = s.spawn(|| {
                cache
                    .apply_local(&ExternalId::from("d-1"), |d| {
                        d.status = LifecycleState::CheckedOut;
                        d.status_source = StatusSource::Local;
                        d.assignee = Some("ada@school.example".into());
                    })
                    .unwrap()
            });
            std::thread::sleep(std::time::Duration::from_millis(50));
            release.send(()).unwrap();

            assert_eq!(sync.join().unwrap().updated, 1);
            assert_eq!(checkout.join().unwrap().status, LifecycleState::CheckedOut);
        });

        let cached = cache.get(&ExternalId::from("d-1")).unwrap();
        assert_eq!(cached.status, LifecycleState::CheckedOut);
        assert_eq!(cached.assignee.as_deref(), Some("ada@school.example"));
        assert_eq!(cached.org_unit_path, "/B");

        let reopened: EntityCache<Device> = EntityCache::open(gate).unwrap();
        let persisted = reopened.get(&ExternalId::from("d-1")).unwrap();
        assert_eq!(persisted.status, LifecycleState::CheckedOut);
        assert_eq!(persisted.org_unit_path, "/B");
    }

    #[test]
    fn one_failed_record_does_not_abort_the_batch() {
        let cache: EntityCache<Device> = EntityCache::open(Arc::new(FailingPersistence {
            inner: MemoryPersistence::new(),
            poisoned_key: "d-2",
        }))
        .unwrap();

        let report = cache.upsert_batch(vec![
            synced("d-1", "SN1", "/A", 1),
            synced("d-2", "SN2", "/A", 1),
            synced("", "SN3", "/A", 1),
            synced("d-4", "SN4", "/A", 1),
        ]);

        assert_eq!(report.created, 2);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].0, ExternalId::from("d-2"));
        assert!(cache.get(&ExternalId::from("d-2")).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn duplicate_ids_in_one_batch_resolve_by_timestamp() {
        let cache = cache();
        let report = cache.upsert_batch(vec![
            synced("d-1", "SN1", "/Newer", 20),
            synced("d-1", "SN1", "/Older", 10),
        ]);
        assert_eq!(report.created, 1);
        assert_eq!(report.stale, 1);
        assert_eq!(cache.get(&ExternalId::from("d-1")).unwrap().org_unit_path, "/Newer");
    }

    #[test]
    fn query_sorts_by_display_name() {
        let cache = cache();
        let mut tagged = synced("d-3", "SN3", "/A", 1);
        tagged.asset_tag = Some("alpha".into());
        cache.upsert_batch(vec![
            synced("d-1", "ZED", "/A", 1),
            synced("d-2", "Bravo", "/B", 1),
            tagged,
        ]);

        let names: Vec<String> = cache
            .query(&EntityFilter::All)
            .iter()
            .map(|d| d.display_name().to_owned())
            .collect();
        assert_eq!(names, vec!["alpha", "Bravo", "ZED"]);

        let in_a = cache.query(&EntityFilter::InOrgUnit("/A".into()));
        assert_eq!(in_a.len(), 2);
    }

    #[test]
    fn sweep_only_touches_the_listing_scope() {
        let cache = cache();
        cache.upsert_batch(vec![
            synced("d-1", "SN1", "/A", 1),
            synced("d-2", "SN2", "/A/B", 1),
            synced("d-3", "SN3", "/C", 1),
        ]);

        let seen: HashSet<ExternalId> = [ExternalId::from("d-1")].into();
        let removed = cache.sweep_tombstones(&seen, &CompleteListing::new("/A"));

        assert_eq!(removed, vec![ExternalId::from("d-2")]);
        assert!(cache.get(&ExternalId::from("d-3")).is_some());
    }

    #[test]
    fn apply_local_persists_and_publishes() {
        let cache = cache();
        cache.upsert_batch(vec![synced("d-1", "SN1", "/A", 1)]);
        let stream = cache.subscribe();

        let updated = cache
            .apply_local(&ExternalId::from("d-1"), |d| d.org_unit_path = "/B".into())
            .unwrap();
        assert_eq!(updated.org_unit_path, "/B");
        assert_eq!(stream.latest()[0].org_unit_path, "/B");
        assert_eq!(stream.current()[0].org_unit_path, "/A");

        let missing = cache.apply_local(&ExternalId::from("nope"), |_| {});
        assert!(matches!(missing, Err(CoreError::NotFound { .. })));
    }

    #[test]
    fn file_backed_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let persistence: Arc<dyn Persistence> = Arc::new(FilePersistence::new(dir.path()));

        {
            let cache: EntityCache<Device> = EntityCache::open(Arc::clone(&persistence)).unwrap();
            cache.upsert_batch(vec![synced("d-1", "SN1", "/A", 1)]);
            cache.record_full_sync(at(100)).unwrap();
        }

        let reopened: EntityCache<Device> = EntityCache::open(persistence).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.last_full_sync(), Some(at(100)));
        assert!(reopened.find_by_natural_key("sn1").is_some());
    }
}
