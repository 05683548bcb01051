// ── Domain model ──
//
// Canonical types for everything mirrored from the directory. The cache,
// sync engine, and search merger are generic over `CachedEntity`.

pub mod device;
pub mod entity_id;
pub mod org_unit;
pub mod user;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use device::{Device, LifecycleState, StatusSource};
pub use entity_id::{EntityKind, ExternalId};
pub use org_unit::OrgUnit;
pub use user::{User, student_id_from_email};

/// A record the local cache can hold.
///
/// Every cached type has a directory-assigned id (the cache key), a
/// natural key used to deduplicate search results (serial number, email,
/// path), and the fetch timestamp that drives last-write-wins.
pub trait CachedEntity:
    Clone + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const KIND: EntityKind;

    fn external_id(&self) -> &ExternalId;

    /// Case-normalized identity as a human would type it.
    fn natural_key(&self) -> String;

    fn display_name(&self) -> &str;

    fn org_unit_path(&self) -> &str;

    fn last_synced_at(&self) -> DateTime<Utc>;

    /// Substring match against searchable fields. `term` is already lowercased.
    fn matches(&self, term: &str) -> bool;

    /// Carry locally owned fields over from the cached copy before an
    /// incoming directory record replaces it. Returns `true` when anything
    /// was kept.
    fn reconcile_with_cached(&mut self, _cached: &Self) -> bool {
        false
    }
}
