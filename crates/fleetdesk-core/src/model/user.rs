// ── User domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CachedEntity;
use super::entity_id::{EntityKind, ExternalId};

/// A directory user account as cached locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub external_id: ExternalId,
    pub primary_email: String,
    pub full_name: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub org_unit_path: String,
    pub suspended: bool,
    pub is_admin: bool,
    /// Parsed from student mailboxes shaped `name.<digits>@domain`.
    pub student_id: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_synced_at: DateTime<Utc>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Extract the student number from `first.123456@school.example`.
///
/// The local part must be exactly one dot-free name, a dot, and a run of
/// ASCII digits; anything else yields `None`.
pub fn student_id_from_email(email: &str) -> Option<String> {
    let (local, _domain) = email.split_once('@')?;
    let (name, digits) = local.split_once('.')?;
    if name.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.to_owned())
}

impl CachedEntity for User {
    const KIND: EntityKind = EntityKind::Users;

    fn external_id(&self) -> &ExternalId {
        &self.external_id
    }

    fn natural_key(&self) -> String {
        self.primary_email.to_lowercase()
    }

    fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.primary_email
        } else {
            &self.full_name
        }
    }

    fn org_unit_path(&self) -> &str {
        &self.org_unit_path
    }

    fn last_synced_at(&self) -> DateTime<Utc> {
        self.last_synced_at
    }

    fn matches(&self, term: &str) -> bool {
        self.primary_email.to_lowercase().contains(term)
            || self.full_name.to_lowercase().contains(term)
            || self.student_id.as_deref().is_some_and(|id| id.contains(term))
    }
}
