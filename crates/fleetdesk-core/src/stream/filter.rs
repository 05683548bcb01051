// ── Filter predicates for cache queries ──

use crate::hierarchy::is_within;
use crate::model::CachedEntity;

/// Filter predicate for any cached entity type.
pub enum EntityFilter<T> {
    All,
    /// Entities directly in this org unit (exact path).
    InOrgUnit(String),
    /// Entities in this org unit or any descendant.
    WithinOrgUnit(String),
    /// Case-insensitive substring search over the entity's searchable fields.
    Matching(String),
    /// Every inner filter must match.
    AllOf(Vec<EntityFilter<T>>),
    Custom(Box<dyn Fn(&T) -> bool + Send + Sync>),
}

impl<T: CachedEntity> EntityFilter<T> {
    pub fn matching(term: &str) -> Self {
        Self::Matching(term.trim().to_lowercase())
    }

    pub fn matches(&self, entity: &T) -> bool {
        match self {
            Self::All => true,
            Self::InOrgUnit(path) => entity.org_unit_path() == path,
            Self::WithinOrgUnit(path) => is_within(entity.org_unit_path(), path),
            Self::Matching(term) => term.is_empty() || entity.matches(term),
            Self::AllOf(filters) => filters.iter().all(|f| f.matches(entity)),
            Self::Custom(f) => f(entity),
        }
    }
}

impl<T> std::fmt::Debug for EntityFilter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::InOrgUnit(p) => f.debug_tuple("InOrgUnit").field(p).finish(),
            Self::WithinOrgUnit(p) => f.debug_tuple("WithinOrgUnit").field(p).finish(),
            Self::Matching(t) => f.debug_tuple("Matching").field(t).finish(),
            Self::AllOf(inner) => f.debug_tuple("AllOf").field(inner).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
