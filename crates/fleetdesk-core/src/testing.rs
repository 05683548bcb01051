// ── In-memory directory for tests ──

#![allow(clippy::unwrap_used)]

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use fleetdesk_api::{DeviceAnnotation, UserPatch};

use crate::directory::{Directory, Page, PageRequest};
use crate::error::CoreError;
use crate::hierarchy::is_within;
use crate::model::{CachedEntity, Device, ExternalId, LifecycleState, OrgUnit, StatusSource, User};

pub(crate) fn device(id: &str, serial: &str, ou: &str) -> Device {
    crate::model::device::tests::device(id, serial, ou)
}

pub(crate) fn user(id: &str, email: &str, ou: &str) -> User {
    User {
        external_id: ExternalId::from(id),
        primary_email: email.into(),
        full_name: email.split('@').next().unwrap_or_default().into(),
        given_name: None,
        family_name: None,
        org_unit_path: ou.into(),
        suspended: false,
        is_admin: false,
        student_id: None,
        last_login_at: None,
        last_synced_at: DateTime::<Utc>::UNIX_EPOCH,
        raw: serde_json::Value::Null,
    }
}

pub(crate) fn org_unit(path: &str) -> OrgUnit {
    OrgUnit {
        external_id: ExternalId::new(format!("id:{path}")),
        name: crate::hierarchy::name_of(path),
        path: path.into(),
        parent_path: crate::hierarchy::parent_path_of(path),
        block_inheritance: false,
        description: None,
        last_synced_at: DateTime::<Utc>::UNIX_EPOCH,
    }
}

fn transient() -> CoreError {
    CoreError::Api {
        message: "backend unavailable".into(),
        reason: None,
        status: Some(503),
    }
}

/// A directory held in memory. Listings paginate by offset; every
/// returned record is stamped with a strictly increasing tick of the
/// directory clock.
#[derive(Default)]
pub(crate) struct FakeDirectory {
    devices: Mutex<Vec<Device>>,
    users: Mutex<Vec<User>>,
    org_units: Mutex<Vec<OrgUnit>>,
    report_totals: bool,
    /// Scripted outcomes for upcoming listing calls; `None` succeeds.
    list_failures: Mutex<VecDeque<Option<CoreError>>>,
    broken: Mutex<HashSet<ExternalId>>,
    search_delay: Duration,
    list_delay: Duration,
    clock: AtomicI64,
    list_calls: AtomicUsize,
    search_calls: AtomicUsize,
    mutations: Mutex<Vec<String>>,
}

impl FakeDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_devices(self, devices: Vec<Device>) -> Self {
        *self.devices.lock().unwrap() = devices;
        self
    }

    pub(crate) fn with_users(self, users: Vec<User>) -> Self {
        *self.users.lock().unwrap() = users;
        self
    }

    pub(crate) fn with_org_units(self, units: Vec<OrgUnit>) -> Self {
        *self.org_units.lock().unwrap() = units;
        self
    }

    pub(crate) fn reporting_totals(mut self) -> Self {
        self.report_totals = true;
        self
    }

    pub(crate) fn with_search_delay(mut self, delay: Duration) -> Self {
        self.search_delay = delay;
        self
    }

    /// Device listings take their snapshot, then wait `delay` before
    /// answering, like a slow page that is already stale on arrival.
    pub(crate) fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    /// The next `count` listing calls fail with a transient error.
    pub(crate) fn fail_next_lists(&self, count: usize) {
        let mut failures = self.list_failures.lock().unwrap();
        failures.extend((0..count).map(|_| Some(transient())));
    }

    /// The next listing call fails with `error`.
    pub(crate) fn fail_next_list_with(&self, error: CoreError) {
        self.list_failures.lock().unwrap().push_back(Some(error));
    }

    /// The next `count` listing calls succeed before any queued failure.
    pub(crate) fn succeed_next_lists(&self, count: usize) {
        let mut failures = self.list_failures.lock().unwrap();
        failures.extend((0..count).map(|_| None));
    }

    /// Every mutation on this device is rejected.
    pub(crate) fn break_device(&self, id: &str) {
        self.broken.lock().unwrap().insert(ExternalId::from(id));
    }

    pub(crate) fn remove_device(&self, id: &str) {
        self.devices
            .lock()
            .unwrap()
            .retain(|d| d.external_id.as_str() != id);
    }

    pub(crate) fn stored_device(&self, id: &str) -> Option<Device> {
        self.devices
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.external_id.as_str() == id)
            .cloned()
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    fn take_failure(&self) -> Result<(), CoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match self.list_failures.lock().unwrap().pop_front() {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }

    fn check_mutable(&self, id: &ExternalId, what: &str) -> Result<(), CoreError> {
        self.mutations.lock().unwrap().push(format!("{what} {id}"));
        if self.broken.lock().unwrap().contains(id) {
            return Err(CoreError::Api {
                message: format!("Invalid Input: {id}"),
                reason: Some("invalid".into()),
                status: Some(400),
            });
        }
        Ok(())
    }

    fn paginate<T: CachedEntity>(
        &self,
        all: Vec<T>,
        request: &PageRequest,
        stamp: impl Fn(&mut T, DateTime<Utc>),
    ) -> Page<T> {
        let all: Vec<T> = all
            .into_iter()
            .filter(|e| {
                request
                    .org_unit_path
                    .as_deref()
                    .is_none_or(|scope| is_within(e.org_unit_path(), scope))
            })
            .collect();
        let offset: usize = request
            .page_token
            .as_deref()
            .map_or(0, |t| t.parse().unwrap());
        let size = usize::try_from(request.page_size).unwrap();
        let end = (offset + size).min(all.len());
        let total = u64::try_from(all.len()).unwrap();

        let now = self.now();
        let items = all[offset..end]
            .iter()
            .cloned()
            .map(|mut e| {
                stamp(&mut e, now);
                e
            })
            .collect();
        Page {
            items,
            next_page_token: (end < all.len()).then(|| end.to_string()),
            total_count: self.report_totals.then_some(total),
        }
    }
}

impl Directory for FakeDirectory {
    fn now(&self) -> DateTime<Utc> {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(1_000_000 + tick)
    }

    async fn list_devices(&self, request: &PageRequest) -> Result<Page<Device>, CoreError> {
        self.take_failure()?;
        let all = self.devices.lock().unwrap().clone();
        let page = self.paginate(all, request, |d, at| d.last_synced_at = at);
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        Ok(page)
    }

    async fn get_device(&self, id: &ExternalId) -> Result<Device, CoreError> {
        self.take_failure()?;
        let mut device = self
            .stored_device(id.as_str())
            .ok_or_else(|| CoreError::NotFound {
                entity_type: "device".into(),
                identifier: id.to_string(),
            })?;
        device.last_synced_at = self.now();
        Ok(device)
    }

    async fn search_devices(&self, term: &str, limit: u32) -> Result<Vec<Device>, CoreError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if !self.search_delay.is_zero() {
            tokio::time::sleep(self.search_delay).await;
        }
        self.take_failure()?;
        let term = term.to_lowercase();
        let now = self.now();
        let devices = self.devices.lock().unwrap().clone();
        Ok(devices
            .into_iter()
            .filter(|d| d.matches(&term))
            .take(usize::try_from(limit).unwrap())
            .map(|mut d| {
                d.last_synced_at = now;
                d
            })
            .collect())
    }

    async fn list_users(&self, request: &PageRequest) -> Result<Page<User>, CoreError> {
        self.take_failure()?;
        let all = self.users.lock().unwrap().clone();
        Ok(self.paginate(all, request, |u, at| u.last_synced_at = at))
    }

    async fn get_user(&self, id: &ExternalId) -> Result<User, CoreError> {
        self.take_failure()?;
        let users = self.users.lock().unwrap().clone();
        let mut user = users
            .into_iter()
            .find(|u| u.external_id == *id)
            .ok_or_else(|| CoreError::NotFound {
                entity_type: "user".into(),
                identifier: id.to_string(),
            })?;
        user.last_synced_at = self.now();
        Ok(user)
    }

    async fn search_users(&self, term: &str, limit: u32) -> Result<Vec<User>, CoreError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if !self.search_delay.is_zero() {
            tokio::time::sleep(self.search_delay).await;
        }
        self.take_failure()?;
        let term = term.to_lowercase();
        let now = self.now();
        let users = self.users.lock().unwrap().clone();
        Ok(users
            .into_iter()
            .filter(|u| u.matches(&term))
            .take(usize::try_from(limit).unwrap())
            .map(|mut u| {
                u.last_synced_at = now;
                u
            })
            .collect())
    }

    async fn list_org_units(&self) -> Result<Vec<OrgUnit>, CoreError> {
        self.take_failure()?;
        let now = self.now();
        let units = self.org_units.lock().unwrap().clone();
        Ok(units
            .into_iter()
            .map(|mut u| {
                u.last_synced_at = now;
                u
            })
            .collect())
    }

    async fn move_devices(&self, ids: &[ExternalId], org_unit_path: &str) -> Result<(), CoreError> {
        for id in ids {
            self.check_mutable(id, &format!("move->{org_unit_path}"))?;
        }
        let mut devices = self.devices.lock().unwrap();
        for device in devices.iter_mut().filter(|d| ids.contains(&d.external_id)) {
            device.org_unit_path = org_unit_path.to_owned();
        }
        Ok(())
    }

    async fn wipe_users(&self, id: &ExternalId) -> Result<(), CoreError> {
        self.check_mutable(id, "wipe")
    }

    async fn annotate_device(
        &self,
        id: &ExternalId,
        annotation: &DeviceAnnotation,
    ) -> Result<Device, CoreError> {
        self.check_mutable(id, "annotate")?;
        let now = self.now();
        let mut devices = self.devices.lock().unwrap();
        let device = devices
            .iter_mut()
            .find(|d| d.external_id == *id)
            .ok_or_else(|| CoreError::NotFound {
                entity_type: "device".into(),
                identifier: id.to_string(),
            })?;
        if let Some(user) = &annotation.annotated_user {
            device.assignee = (!user.is_empty()).then(|| user.clone());
        }
        if let Some(notes) = &annotation.notes {
            device.notes = Some(notes.clone());
        }
        let mut returned = device.clone();
        returned.status = LifecycleState::Available;
        returned.status_source = StatusSource::Directory;
        returned.last_synced_at = now;
        Ok(returned)
    }

    async fn update_user(&self, id: &ExternalId, patch: &UserPatch) -> Result<User, CoreError> {
        self.mutations.lock().unwrap().push(format!("update {id}"));
        let now = self.now();
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.external_id == *id)
            .ok_or_else(|| CoreError::NotFound {
                entity_type: "user".into(),
                identifier: id.to_string(),
            })?;
        if let Some(suspended) = patch.suspended {
            user.suspended = suspended;
        }
        if let Some(path) = &patch.org_unit_path {
            user.org_unit_path.clone_from(path);
        }
        let mut returned = user.clone();
        returned.last_synced_at = now;
        Ok(returned)
    }
}
