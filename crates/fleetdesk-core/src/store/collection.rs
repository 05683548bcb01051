// ── Generic reactive entity collection ──
//
// Lock-free concurrent storage with O(1) lookups and push-based
// change notification via `watch` channels.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::model::ExternalId;

/// A lock-free, reactive collection for a single entity type.
///
/// Records are stored as `Arc<T>` and replaced whole, so a concurrent
/// reader sees either the old or the new record, never a mix. Every
/// mutation bumps a version counter and rebuilds the snapshot that
/// subscribers receive.
pub(crate) struct EntityCollection<T: Clone + Send + Sync + 'static> {
    /// Primary storage: directory id -> entity.
    by_id: DashMap<ExternalId, Arc<T>>,

    /// Secondary index: natural key (serial, email, path) -> id.
    natural_to_id: DashMap<String, ExternalId>,

    /// Reverse of `natural_to_id` for efficient removal.
    id_to_natural: DashMap<ExternalId, String>,

    version: watch::Sender<u64>,

    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_id: DashMap::new(),
            natural_to_id: DashMap::new(),
            id_to_natural: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Insert or replace one entity. Returns `true` if the id was new.
    #[cfg(test)]
    pub(crate) fn upsert(&self, id: ExternalId, natural_key: String, entity: T) -> bool {
        let is_new = self.insert(id, natural_key, entity);
        self.publish();
        is_new
    }

    /// Insert or replace many entities, publishing a single snapshot.
    pub(crate) fn upsert_many(&self, items: impl IntoIterator<Item = (ExternalId, String, T)>) {
        let mut touched = false;
        for (id, natural_key, entity) in items {
            self.insert(id, natural_key, entity);
            touched = true;
        }
        if touched {
            self.publish();
        }
    }

    /// Read-modify-write one entity under its map entry, publishing on
    /// change. See [`update_unpublished`](Self::update_unpublished).
    pub(crate) fn update<E>(
        &self,
        id: &ExternalId,
        f: impl FnOnce(Option<&T>) -> Result<Option<(String, T)>, E>,
    ) -> Result<Option<Arc<T>>, E> {
        let written = self.update_unpublished(id, f)?;
        if written.is_some() {
            self.publish();
        }
        Ok(written)
    }

    /// Read-modify-write one entity while holding its map entry.
    ///
    /// `f` sees the current entity and returns the replacement with its
    /// natural key, or `None` to leave it alone. Writers to the same id are
    /// serialized, so a replacement is always derived from the value it
    /// replaces. Batch callers publish once with [`publish`](Self::publish).
    pub(crate) fn update_unpublished<E>(
        &self,
        id: &ExternalId,
        f: impl FnOnce(Option<&T>) -> Result<Option<(String, T)>, E>,
    ) -> Result<Option<Arc<T>>, E> {
        match self.by_id.entry(id.clone()) {
            Entry::Occupied(mut slot) => {
                let Some((natural_key, entity)) = f(Some(&**slot.get()))? else {
                    return Ok(None);
                };
                let entity = Arc::new(entity);
                slot.insert(Arc::clone(&entity));
                self.index(id, natural_key);
                Ok(Some(entity))
            }
            Entry::Vacant(slot) => {
                let Some((natural_key, entity)) = f(None)? else {
                    return Ok(None);
                };
                let entity = Arc::new(entity);
                slot.insert(Arc::clone(&entity));
                self.index(id, natural_key);
                Ok(Some(entity))
            }
        }
    }

    /// Remove an entity by id. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, id: &ExternalId) -> Option<Arc<T>> {
        let removed = self.by_id.remove(id).map(|(_, v)| v);
        if removed.is_some() {
            if let Some((_, key)) = self.id_to_natural.remove(id) {
                self.natural_to_id.remove_if(&key, |_, owner| owner == id);
            }
            self.publish();
        }
        removed
    }

    pub(crate) fn get(&self, id: &ExternalId) -> Option<Arc<T>> {
        self.by_id.get(id).map(|r| Arc::clone(r.value()))
    }

    /// Look up by natural key (already case-normalized by the caller).
    pub(crate) fn get_by_natural_key(&self, key: &str) -> Option<Arc<T>> {
        // Release the index guard before touching `by_id`; writers hold a
        // `by_id` entry while they update the index.
        let id = self.natural_to_id.get(key)?.value().clone();
        self.by_id.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn insert(&self, id: ExternalId, natural_key: String, entity: T) -> bool {
        let is_new = self.by_id.insert(id.clone(), Arc::new(entity)).is_none();
        self.index(&id, natural_key);
        is_new
    }

    fn index(&self, id: &ExternalId, natural_key: String) {
        // Drop the stale natural-key mapping if the record's key changed.
        if let Some(old_key) = self.id_to_natural.get(id).map(|k| k.value().clone()) {
            if old_key != natural_key {
                self.natural_to_id.remove_if(&old_key, |_, owner| owner == id);
            }
        }
        self.natural_to_id.insert(natural_key.clone(), id.clone());
        self.id_to_natural.insert(id.clone(), natural_key);
    }

    pub(crate) fn publish(&self) {
        let values: Vec<Arc<T>> = self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn id(s: &str) -> ExternalId {
        ExternalId::from(s)
    }

    #[test]
    fn upsert_reports_new_ids() {
        let col: EntityCollection<String> = EntityCollection::new();
        assert!(col.upsert(id("d-1"), "sn1".into(), "hello".into()));
        assert!(!col.upsert(id("d-1"), "sn1".into(), "world".into()));
        assert_eq!(*col.get(&id("d-1")).unwrap(), "world");
    }

    #[test]
    fn natural_key_lookup_follows_renames() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.upsert(id("d-1"), "old-serial".into(), "v1".into());
        col.upsert(id("d-1"), "new-serial".into(), "v2".into());

        assert!(col.get_by_natural_key("old-serial").is_none());
        assert_eq!(*col.get_by_natural_key("new-serial").unwrap(), "v2");
    }

    #[test]
    fn remove_cleans_up_indexes() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.upsert(id("d-1"), "sn1".into(), "hello".into());

        assert_eq!(*col.remove(&id("d-1")).unwrap(), "hello");
        assert!(col.get(&id("d-1")).is_none());
        assert!(col.get_by_natural_key("sn1").is_none());
        assert_eq!(col.len(), 0);
        assert!(col.remove(&id("d-1")).is_none());
    }

    #[test]
    fn update_sees_the_value_it_replaces() {
        let col: EntityCollection<String> = EntityCollection::new();
        col.upsert(id("d-1"), "sn1".into(), "v1".into());

        let written = col
            .update(&id("d-1"), |current| {
                Ok::<_, ()>(current.map(|v| ("sn2".to_owned(), format!("{v}+v2"))))
            })
            .unwrap();
        assert_eq!(written.as_deref().map(String::as_str), Some("v1+v2"));
        assert_eq!(*col.get_by_natural_key("sn2").unwrap(), "v1+v2");
        assert!(col.get_by_natural_key("sn1").is_none());

        let untouched = col.update(&id("d-9"), |_| Ok::<_, ()>(None)).unwrap();
        assert!(untouched.is_none());
        assert!(col.get(&id("d-9")).is_none());
        assert_eq!(col.update(&id("d-1"), |_| Err::<Option<(String, String)>, _>("nope")), Err("nope"));
        assert_eq!(*col.get(&id("d-1")).unwrap(), "v1+v2");
    }

    #[test]
    fn batch_upsert_publishes_once() {
        let col: EntityCollection<String> = EntityCollection::new();
        let before = col.version();
        col.upsert_many([
            (id("a"), "a".into(), "x".into()),
            (id("b"), "b".into(), "y".into()),
        ]);
        assert_eq!(col.version(), before + 1);
        assert_eq!(col.snapshot().len(), 2);

        col.upsert_many(Vec::new());
        assert_eq!(col.version(), before + 1);
    }
}
