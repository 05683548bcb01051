// ── API-to-domain type conversions ──
//
// Bridges raw `fleetdesk_api` response types into canonical model types.
// Each constructor normalizes field names, parses timestamps, and stamps
// the record with the time it was fetched.

use chrono::{DateTime, Utc};
use serde::Serialize;

use fleetdesk_api::{ChromeOsDevice, DirectoryUser, OrgUnitResponse};

use crate::hierarchy::{normalize_org_path, parent_path_of};
use crate::model::{
    Device, ExternalId, LifecycleState, OrgUnit, StatusSource, User, student_id_from_email,
};

// ── Helpers ────────────────────────────────────────────────────────

fn parse_datetime(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Empty annotation fields mean "unset" in the directory.
fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty())
}

fn org_path(raw: Option<&str>) -> String {
    raw.and_then(normalize_org_path).unwrap_or_else(|| "/".to_owned())
}

fn raw_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}

// ── Device ─────────────────────────────────────────────────────────

impl Device {
    /// Build a cache record from a directory device fetched at `synced_at`.
    pub fn from_directory(device: ChromeOsDevice, synced_at: DateTime<Utc>) -> Self {
        let raw = raw_json(&device);
        Self {
            external_id: ExternalId::new(device.device_id),
            serial_number: device.serial_number.unwrap_or_default(),
            asset_tag: non_empty(device.annotated_asset_id),
            model: device.model,
            org_unit_path: org_path(device.org_unit_path.as_deref()),
            status: LifecycleState::from_directory_status(device.status.as_deref()),
            status_source: StatusSource::Directory,
            assignee: non_empty(device.annotated_user),
            location: non_empty(device.annotated_location),
            notes: non_empty(device.notes),
            os_version: device.os_version,
            last_seen_at: parse_datetime(device.last_sync.as_deref()),
            last_synced_at: synced_at,
            raw,
        }
    }
}

// ── User ───────────────────────────────────────────────────────────

impl User {
    pub fn from_directory(user: DirectoryUser, synced_at: DateTime<Utc>) -> Self {
        let raw = raw_json(&user);
        let full_name = user
            .name
            .full_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| {
                [user.name.given_name.as_deref(), user.name.family_name.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ")
            });

        Self {
            external_id: ExternalId::new(user.id),
            student_id: student_id_from_email(&user.primary_email),
            primary_email: user.primary_email,
            full_name,
            given_name: user.name.given_name,
            family_name: user.name.family_name,
            org_unit_path: org_path(user.org_unit_path.as_deref()),
            suspended: user.suspended,
            is_admin: user.is_admin,
            last_login_at: parse_datetime(user.last_login_time.as_deref())
                .filter(|t| t.timestamp() > 0),
            last_synced_at: synced_at,
            raw,
        }
    }
}

// ── Org unit ───────────────────────────────────────────────────────

impl OrgUnit {
    pub fn from_directory(unit: OrgUnitResponse, synced_at: DateTime<Utc>) -> Self {
        let path = org_path(Some(&unit.org_unit_path));
        let parent_path = unit
            .parent_org_unit_path
            .as_deref()
            .and_then(normalize_org_path)
            .or_else(|| parent_path_of(&path));

        Self {
            external_id: ExternalId::new(unit.org_unit_id.unwrap_or_else(|| path.clone())),
            name: unit.name,
            path,
            parent_path,
            block_inheritance: unit.block_inheritance,
            description: non_empty(unit.description),
            last_synced_at: synced_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn device_maps_annotations_and_status() {
        let wire: ChromeOsDevice = serde_json::from_value(json!({
            "deviceId": "d-1",
            "serialNumber": "5CD001",
            "status": "DISABLED",
            "orgUnitPath": "/Students//Grade 5",
            "annotatedAssetId": "CB-100",
            "annotatedUser": "",
            "lastSync": "2026-09-01T08:30:00.000Z",
            "bootMode": "Verified"
        }))
        .unwrap();

        let device = Device::from_directory(wire, Utc::now());
        assert_eq!(device.status, LifecycleState::Disabled);
        assert_eq!(device.asset_tag.as_deref(), Some("CB-100"));
        assert_eq!(device.assignee, None);
        assert_eq!(device.org_unit_path, "/Students/Grade 5");
        assert!(device.last_seen_at.is_some());
        assert_eq!(device.raw["bootMode"], json!("Verified"));
    }

    #[test]
    fn user_builds_name_and_student_id() {
        let wire: DirectoryUser = serde_json::from_value(json!({
            "id": "u-1",
            "primaryEmail": "ada.12345@school.example",
            "name": { "givenName": "Ada", "familyName": "Lovelace" },
            "lastLoginTime": "1970-01-01T00:00:00.000Z"
        }))
        .unwrap();

        let user = User::from_directory(wire, Utc::now());
        assert_eq!(user.full_name, "Ada Lovelace");
        assert_eq!(user.student_id.as_deref(), Some("12345"));
        assert_eq!(user.org_unit_path, "/");
        assert_eq!(user.last_login_at, None);
    }

    #[test]
    fn org_unit_without_id_uses_path() {
        let wire: OrgUnitResponse = serde_json::from_value(json!({
            "name": "Grade 5",
            "orgUnitPath": "/Students/Grade 5"
        }))
        .unwrap();

        let unit = OrgUnit::from_directory(wire, Utc::now());
        assert_eq!(unit.external_id.as_str(), "/Students/Grade 5");
        assert_eq!(unit.parent_path.as_deref(), Some("/Students"));
    }
}
