// ── Unified search ──
//
// Instant local-cache matches, then a debounced live directory lookup
// layered on top. Results are published through a `watch` channel; each
// new query supersedes the previous one and cancels its remote leg.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SearchConfig;
use crate::directory::{Directory, DirectoryEntity};
use crate::model::CachedEntity;
use crate::store::FleetStore;
use crate::stream::EntityFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HitSource {
    /// Served from the local cache.
    Local,
    /// Found only by the live directory lookup.
    Remote,
}

#[derive(Debug, Clone)]
pub struct SearchHit<T> {
    pub entity: Arc<T>,
    pub source: HitSource,
}

/// Merged results for one query.
#[derive(Debug, Clone)]
pub struct SearchResults<T> {
    pub query: String,
    /// Increases with every `search` call.
    pub generation: u64,
    pub hits: Vec<SearchHit<T>>,
    /// Hits served purely from the local cache.
    pub local_count: usize,
    /// Remote hits whose natural key was not already present.
    pub remote_added: usize,
    /// The remote leg is still outstanding.
    pub background_syncing: bool,
    /// The remote leg failed; local hits are still valid.
    pub remote_error: Option<String>,
}

impl<T> SearchResults<T> {
    fn empty(query: &str, generation: u64) -> Self {
        Self {
            query: query.to_owned(),
            generation,
            hits: Vec::new(),
            local_count: 0,
            remote_added: 0,
            background_syncing: false,
            remote_error: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !self.background_syncing
    }
}

/// Merge local and remote matches in one pass, first-seen wins.
///
/// Local entries come first and are never replaced. Remote entries whose
/// natural key is already present (locally or earlier in the remote list)
/// are dropped. Returns the hits and how many came from each side.
pub fn merge_unique<T: CachedEntity>(
    local: impl IntoIterator<Item = Arc<T>>,
    remote: impl IntoIterator<Item = T>,
) -> (Vec<SearchHit<T>>, usize, usize) {
    let mut seen = HashSet::new();
    let mut hits = Vec::new();

    for entity in local {
        if seen.insert(entity.natural_key()) {
            hits.push(SearchHit {
                entity,
                source: HitSource::Local,
            });
        }
    }
    let local_count = hits.len();

    for entity in remote {
        if seen.insert(entity.natural_key()) {
            hits.push(SearchHit {
                entity: Arc::new(entity),
                source: HitSource::Remote,
            });
        }
    }
    let remote_added = hits.len() - local_count;
    (hits, local_count, remote_added)
}

// ── UnifiedSearch ────────────────────────────────────────────────────

/// Search-as-you-type over one entity kind.
pub struct UnifiedSearch<D: Directory, T: DirectoryEntity> {
    directory: Arc<D>,
    store: Arc<FleetStore>,
    config: SearchConfig,
    results: Arc<watch::Sender<SearchResults<T>>>,
    generation: AtomicU64,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl<D: Directory, T: DirectoryEntity> UnifiedSearch<D, T> {
    pub fn new(directory: Arc<D>, store: Arc<FleetStore>, config: SearchConfig) -> Self {
        let (results, _) = watch::channel(SearchResults::empty("", 0));
        Self {
            directory,
            store,
            config,
            results: Arc::new(results),
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    /// Start a query and return its generation.
    ///
    /// Local matches are published before this returns. Terms shorter
    /// than the configured minimum publish an empty result and never
    /// reach the directory. Must be called from within a tokio runtime.
    pub fn search(&self, term: &str) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        let previous = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let term = term.trim();
        if term.chars().count() < self.config.min_term_len {
            self.results
                .send_replace(SearchResults::empty(term, generation));
            return generation;
        }

        let local = T::cache(&self.store).query(&EntityFilter::matching(term));
        let (hits, local_count, _) = merge_unique(local, Vec::new());
        debug!(kind = %T::KIND, term, generation, local_count, "local search served");
        self.results.send_replace(SearchResults {
            query: term.to_owned(),
            generation,
            hits,
            local_count,
            remote_added: 0,
            background_syncing: true,
            remote_error: None,
        });

        let directory = Arc::clone(&self.directory);
        let results = Arc::clone(&self.results);
        let debounce = self.config.debounce;
        let limit = self.config.remote_limit;
        let term = term.to_owned();

        tokio::spawn(async move {
            let remote = tokio::select! {
                biased;
                () = token.cancelled() => {
                    debug!(kind = %T::KIND, generation, "search superseded");
                    return;
                }
                remote = async {
                    sleep(debounce).await;
                    T::search_remote(&*directory, &term, limit).await
                } => remote,
            };

            results.send_if_modified(|current| {
                // A newer query has already replaced these results.
                if current.generation != generation {
                    return false;
                }
                match remote {
                    Ok(found) => {
                        let local = current
                            .hits
                            .iter()
                            .filter(|h| h.source == HitSource::Local)
                            .map(|h| Arc::clone(&h.entity));
                        let (hits, local_count, remote_added) = merge_unique(local, found);
                        debug!(kind = %T::KIND, generation, local_count, remote_added, "remote search merged");
                        current.hits = hits;
                        current.local_count = local_count;
                        current.remote_added = remote_added;
                    }
                    Err(e) => {
                        warn!(kind = %T::KIND, generation, error = %e, "remote search failed");
                        current.remote_error = Some(e.to_string());
                    }
                }
                current.background_syncing = false;
                true
            });
        });

        generation
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchResults<T>> {
        self.results.subscribe()
    }

    pub fn current(&self) -> SearchResults<T> {
        self.results.borrow().clone()
    }

    /// Wait until the results for `generation` have settled, or a newer
    /// query has replaced them.
    pub async fn wait_settled(&self, generation: u64) -> SearchResults<T> {
        let mut rx = self.results.subscribe();
        let settled = rx
            .wait_for(|r| r.generation > generation || (r.generation == generation && r.is_settled()))
            .await
            .map(|r| r.clone());
        // The sender lives as long as `self`, so the channel cannot close here.
        settled.unwrap_or_else(|_| self.current())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::CoreError;
    use crate::model::{Device, ExternalId};
    use crate::testing::{FakeDirectory, device};
    use pretty_assertions::assert_eq;

    fn keys(results: &SearchResults<Device>) -> Vec<(String, HitSource)> {
        results
            .hits
            .iter()
            .map(|h| (h.entity.serial_number.clone(), h.source))
            .collect()
    }

    fn searcher(fake: FakeDirectory, cached: Vec<Device>) -> (UnifiedSearch<FakeDirectory, Device>, Arc<FakeDirectory>) {
        let fake = Arc::new(fake);
        let store = Arc::new(FleetStore::in_memory());
        store.devices().upsert_batch(cached);
        let search = UnifiedSearch::new(Arc::clone(&fake), store, SearchConfig::default());
        (search, fake)
    }

    #[test]
    fn merge_keeps_local_and_drops_duplicates() {
        let mut local = device("d-1", "SN1", "/A");
        local.notes = Some("cached".into());
        let remote = vec![
            device("d-1", "sn1", "/A"),
            device("d-2", "SN2", "/A"),
            device("d-3", "SN2", "/B"),
        ];

        let (hits, local_count, remote_added) = merge_unique(vec![Arc::new(local)], remote);

        assert_eq!(local_count, 1);
        assert_eq!(remote_added, 1);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, HitSource::Local);
        assert_eq!(hits[0].entity.notes.as_deref(), Some("cached"));
        assert_eq!(hits[1].entity.external_id, ExternalId::from("d-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn local_hits_first_then_remote_additions() {
        let fake = FakeDirectory::new().with_devices(vec![
            device("d-1", "SN100", "/A"),
            device("d-2", "SN101", "/A"),
        ]);
        let (search, _fake) = searcher(fake, vec![device("d-1", "SN100", "/A")]);

        let generation = search.search("sn10");
        let immediate = search.current();
        assert!(immediate.background_syncing);
        assert_eq!(immediate.local_count, 1);
        assert_eq!(keys(&immediate), vec![("SN100".to_owned(), HitSource::Local)]);

        let settled = search.wait_settled(generation).await;
        assert!(!settled.background_syncing);
        assert_eq!(settled.remote_added, 1);
        assert_eq!(
            keys(&settled),
            vec![
                ("SN100".to_owned(), HitSource::Local),
                ("SN101".to_owned(), HitSource::Remote),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn short_terms_never_reach_the_directory() {
        let (search, fake) = searcher(FakeDirectory::new(), vec![device("d-1", "SN1", "/A")]);

        let generation = search.search("sn");
        let results = search.wait_settled(generation).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(results.hits.is_empty());
        assert!(!results.background_syncing);
        assert_eq!(fake.search_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn new_query_cancels_previous_remote_leg() {
        let fake = FakeDirectory::new()
            .with_devices(vec![device("d-1", "AAA-1", "/A"), device("d-2", "BBB-2", "/A")])
            .with_search_delay(Duration::from_secs(1));
        let (search, fake) = searcher(fake, Vec::new());

        let first = search.search("aaa");
        let second = search.search("bbb");
        assert!(second > first);

        let settled = search.wait_settled(second).await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(fake.search_calls(), 1);
        let latest = search.current();
        assert_eq!(latest.generation, second);
        assert_eq!(latest.query, "bbb");
        assert_eq!(keys(&settled), vec![("BBB-2".to_owned(), HitSource::Remote)]);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_failure_keeps_local_hits() {
        let (search, fake) = searcher(FakeDirectory::new(), vec![device("d-1", "SN100", "/A")]);
        fake.fail_next_list_with(CoreError::Timeout { timeout_secs: 30 });

        let generation = search.search("SN100");
        let settled = search.wait_settled(generation).await;

        assert_eq!(settled.local_count, 1);
        assert_eq!(settled.hits.len(), 1);
        assert!(settled.remote_error.is_some());
        assert!(!settled.background_syncing);
    }
}
