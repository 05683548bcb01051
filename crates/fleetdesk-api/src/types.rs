//! Wire types for the directory API.
//!
//! All types match the JSON bodies of the `admin/directory/v1/` endpoints.
//! Field names use camelCase via `#[serde(rename_all = "camelCase")]`, and
//! every record keeps unmodeled fields in an `extra` map so the raw
//! attributes survive into the local cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Pagination ───────────────────────────────────────────────────────

/// Cursor-paginated list envelope.
///
/// `total_count` is optional: most listings only report a cursor, so the
/// consumer has to refine its estimate of the total as pages arrive.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
    pub total_count: Option<u64>,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next_page_token.is_none()
    }

    /// Convert the items, keeping the cursor metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_page_token: self.next_page_token,
            total_count: self.total_count,
        }
    }
}

/// Query parameters shared by every paginated listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub page_token: Option<String>,
    pub max_results: u32,
    /// Restrict to an org unit (and its children, per directory semantics).
    pub org_unit_path: Option<String>,
    /// Free-text directory query (e.g. `asset_id:CB-100`).
    pub query: Option<String>,
}

impl ListParams {
    pub(crate) fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("maxResults", self.max_results.to_string())];
        if let Some(ref token) = self.page_token {
            params.push(("pageToken", token.clone()));
        }
        if let Some(ref ou) = self.org_unit_path {
            params.push(("orgUnitPath", ou.clone()));
        }
        if let Some(ref q) = self.query {
            params.push(("query", q.clone()));
        }
        params
    }
}

// ── Devices ──────────────────────────────────────────────────────────

/// A managed ChromeOS device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChromeOsDevice {
    pub device_id: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    /// One of `ACTIVE`, `DEPROVISIONED`, `DISABLED`, `INACTIVE`, ...
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub org_unit_path: Option<String>,
    #[serde(default)]
    pub annotated_asset_id: Option<String>,
    #[serde(default)]
    pub annotated_user: Option<String>,
    #[serde(default)]
    pub annotated_location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// RFC 3339 timestamp of the device's last check-in with the directory.
    #[serde(default)]
    pub last_sync: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    /// Catch-all for fields not modeled above.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeviceListResponse {
    #[serde(default)]
    pub chromeosdevices: Vec<ChromeOsDevice>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub total_count: Option<u64>,
}

/// Body for `moveDevicesToOu`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MoveDevicesRequest<'a> {
    pub device_ids: &'a [String],
}

/// Remote command types accepted by `issueCommand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceCommandType {
    /// Remove all user profiles from the device (the "reset" operation).
    WipeUsers,
    /// Full factory reset.
    RemotePowerwash,
    Reboot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IssueCommandRequest {
    pub command_type: DeviceCommandType,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCommandResponse {
    pub command_id: String,
}

/// Annotation fields that can be patched on a device.
///
/// `None` leaves a field untouched; `Some("")` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAnnotation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated_asset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// ── Users ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserName {
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// A directory user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: String,
    pub primary_email: String,
    #[serde(default)]
    pub name: UserName,
    #[serde(default)]
    pub org_unit_path: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub creation_time: Option<String>,
    #[serde(default)]
    pub last_login_time: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserListResponse {
    #[serde(default)]
    pub users: Vec<DirectoryUser>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Partial user update (suspend / unsuspend / move).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspended: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspension_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_unit_path: Option<String>,
}

// ── Org units ────────────────────────────────────────────────────────

/// A directory organizational unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgUnitResponse {
    #[serde(default)]
    pub org_unit_id: Option<String>,
    pub name: String,
    pub org_unit_path: String,
    #[serde(default)]
    pub parent_org_unit_path: Option<String>,
    #[serde(default)]
    pub block_inheritance: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrgUnitListResponse {
    #[serde(default)]
    pub organization_units: Vec<OrgUnitResponse>,
}

// ── Errors ───────────────────────────────────────────────────────────

/// Error body: `{ "error": { "code": 400, "message": "...", "errors": [{ "reason": "..." }] } }`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub reason: Option<String>,
}
