// ── Org unit domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CachedEntity;
use super::entity_id::{EntityKind, ExternalId};

/// A directory organizational unit as cached locally.
///
/// The directory never returns the root unit; the hierarchy synthesizes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnit {
    pub external_id: ExternalId,
    pub name: String,
    pub path: String,
    pub parent_path: Option<String>,
    pub block_inheritance: bool,
    pub description: Option<String>,
    pub last_synced_at: DateTime<Utc>,
}

impl CachedEntity for OrgUnit {
    const KIND: EntityKind = EntityKind::OrgUnits;

    fn external_id(&self) -> &ExternalId {
        &self.external_id
    }

    /// Paths are case-sensitive in the directory, so the key is the path as-is.
    fn natural_key(&self) -> String {
        self.path.clone()
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    /// An org unit "lives in" its own path for scope and tombstone purposes.
    fn org_unit_path(&self) -> &str {
        &self.path
    }

    fn last_synced_at(&self) -> DateTime<Utc> {
        self.last_synced_at
    }

    fn matches(&self, term: &str) -> bool {
        self.path.to_lowercase().contains(term)
    }
}
