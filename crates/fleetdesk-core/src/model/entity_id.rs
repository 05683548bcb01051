// ── Core identity types ──
//
// ExternalId and EntityKind form the foundation of every cached type.
// The directory assigns the id; the cache never invents one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── ExternalId ──────────────────────────────────────────────────────

/// Stable identifier assigned by the remote directory
/// (device id, user id, or org unit id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ExternalId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<String> for ExternalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ExternalId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ── EntityKind ──────────────────────────────────────────────────────

/// The entity types mirrored from the directory. Each kind has its own
/// cache namespace and at most one active sync session.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum EntityKind {
    Devices,
    Users,
    OrgUnits,
}

impl EntityKind {
    /// Cache namespace (also the on-disk directory name).
    pub fn namespace(self) -> &'static str {
        self.into()
    }
}
