// ── Device domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity_id::{EntityKind, ExternalId};
use super::CachedEntity;

/// Where a device's lifecycle state comes from.
///
/// The directory knows whether a device is provisioned, but lending
/// (who has it, whether the agreement is signed) only exists locally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusSource {
    #[default]
    Directory,
    Local,
}

/// Device lifecycle state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
pub enum LifecycleState {
    #[serde(rename = "available")]
    #[strum(serialize = "available")]
    Available,
    #[serde(rename = "checked_out")]
    #[strum(serialize = "checked_out")]
    CheckedOut,
    #[serde(rename = "pending_signature")]
    #[strum(serialize = "pending_signature")]
    PendingSignature,
    #[serde(rename = "checked_out (signed)")]
    #[strum(serialize = "checked_out (signed)")]
    CheckedOutSigned,
    #[serde(rename = "reset_wiped")]
    #[strum(serialize = "reset_wiped")]
    ResetWiped,
    #[serde(rename = "deprovisioned")]
    #[strum(serialize = "deprovisioned")]
    Deprovisioned,
    #[serde(rename = "disabled")]
    #[strum(serialize = "disabled")]
    Disabled,
}

impl LifecycleState {
    /// Map a directory status (`ACTIVE`, `DISABLED`, ...) to a local state.
    /// Unknown and missing statuses count as available.
    pub fn from_directory_status(status: Option<&str>) -> Self {
        match status {
            Some("DEPROVISIONED") => Self::Deprovisioned,
            Some("DISABLED") => Self::Disabled,
            _ => Self::Available,
        }
    }

    /// The device is with a borrower.
    pub fn is_lending(self) -> bool {
        matches!(
            self,
            Self::CheckedOut | Self::PendingSignature | Self::CheckedOutSigned
        )
    }
}

/// A managed device as cached locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub external_id: ExternalId,
    pub serial_number: String,
    /// Asset tag printed on the device (`annotatedAssetId` in the directory).
    pub asset_tag: Option<String>,
    pub model: Option<String>,
    pub org_unit_path: String,
    pub status: LifecycleState,
    pub status_source: StatusSource,
    /// Current borrower, usually an email address.
    pub assignee: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub os_version: Option<String>,
    /// When the device itself last checked in with the directory.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// When this record was fetched from the directory.
    pub last_synced_at: DateTime<Utc>,
    /// Directory payload as received, including unmodeled fields.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl CachedEntity for Device {
    const KIND: EntityKind = EntityKind::Devices;

    fn external_id(&self) -> &ExternalId {
        &self.external_id
    }

    fn natural_key(&self) -> String {
        if self.serial_number.is_empty() {
            self.external_id.as_str().to_lowercase()
        } else {
            self.serial_number.to_lowercase()
        }
    }

    fn display_name(&self) -> &str {
        self.asset_tag
            .as_deref()
            .filter(|tag| !tag.is_empty())
            .unwrap_or(&self.serial_number)
    }

    fn org_unit_path(&self) -> &str {
        &self.org_unit_path
    }

    fn last_synced_at(&self) -> DateTime<Utc> {
        self.last_synced_at
    }

    fn matches(&self, term: &str) -> bool {
        [
            Some(self.serial_number.as_str()),
            self.asset_tag.as_deref(),
            self.assignee.as_deref(),
            self.model.as_deref(),
            self.notes.as_deref(),
            Some(self.external_id.as_str()),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(term))
    }

    /// Keep locally owned lending state across directory refreshes.
    ///
    /// A device on loan keeps its state and borrower; any other locally
    /// set state (e.g. `reset_wiped`) keeps its state until it is returned
    /// to service.
    fn reconcile_with_cached(&mut self, cached: &Self) -> bool {
        if cached.status.is_lending() {
            self.status = cached.status;
            self.status_source = cached.status_source;
            self.assignee.clone_from(&cached.assignee);
            true
        } else if cached.status_source == StatusSource::Local {
            self.status = cached.status;
            self.status_source = StatusSource::Local;
            true
        } else {
            false
        }
    }
}
