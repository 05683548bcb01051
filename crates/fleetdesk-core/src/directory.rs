// ── Remote directory seam ──
//
// `Directory` is everything the core needs from the remote side, already
// translated into domain types. `DirectoryClient` is the production
// implementation; tests drive the core with an in-memory fake.

use std::future::Future;

use chrono::{DateTime, Utc};
use fleetdesk_api::{DeviceAnnotation, DeviceCommandType, DirectoryClient, ListParams, UserPatch};
use tracing::debug;

pub use fleetdesk_api::Page;

use crate::error::CoreError;
use crate::hierarchy::is_within;
use crate::model::{CachedEntity, Device, ExternalId, OrgUnit, User};
use crate::store::{EntityCache, FleetStore};

/// One page request in a sync session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub page_token: Option<String>,
    pub page_size: u32,
    /// Restrict the listing to this org unit and its descendants.
    pub org_unit_path: Option<String>,
}

impl PageRequest {
    fn to_list_params(&self) -> ListParams {
        ListParams {
            page_token: self.page_token.clone(),
            max_results: self.page_size,
            org_unit_path: self.org_unit_path.clone(),
            query: None,
        }
    }
}

/// The remote directory as seen by the core.
///
/// Every method is a single remote round trip. Implementations stamp the
/// returned records with the time the request was issued, so a record never
/// claims to be newer than a change made after its request went out.
pub trait Directory: Send + Sync + 'static {
    /// Clock used for record stamps. Local writes that follow a directory
    /// mutation are stamped with it too.
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn list_devices(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Page<Device>, CoreError>> + Send;

    fn get_device(&self, id: &ExternalId)
    -> impl Future<Output = Result<Device, CoreError>> + Send;

    fn search_devices(
        &self,
        term: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Device>, CoreError>> + Send;

    fn list_users(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Page<User>, CoreError>> + Send;

    fn get_user(&self, id: &ExternalId) -> impl Future<Output = Result<User, CoreError>> + Send;

    fn search_users(
        &self,
        term: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<User>, CoreError>> + Send;

    /// The full org unit listing. The directory does not paginate it.
    fn list_org_units(&self) -> impl Future<Output = Result<Vec<OrgUnit>, CoreError>> + Send;

    fn move_devices(
        &self,
        ids: &[ExternalId],
        org_unit_path: &str,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    /// Remove all user profiles from the device (`WIPE_USERS`).
    fn wipe_users(&self, id: &ExternalId) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn annotate_device(
        &self,
        id: &ExternalId,
        annotation: &DeviceAnnotation,
    ) -> impl Future<Output = Result<Device, CoreError>> + Send;

    fn update_user(
        &self,
        id: &ExternalId,
        patch: &UserPatch,
    ) -> impl Future<Output = Result<User, CoreError>> + Send;
}

// ── DirectoryClient ──────────────────────────────────────────────────

impl Directory for DirectoryClient {
    async fn list_devices(&self, request: &PageRequest) -> Result<Page<Device>, CoreError> {
        let now = Directory::now(self);
        let page = DirectoryClient::list_devices(self, &request.to_list_params()).await?;
        Ok(page.map(|d| Device::from_directory(d, now)))
    }

    async fn get_device(&self, id: &ExternalId) -> Result<Device, CoreError> {
        let now = Directory::now(self);
        let device = DirectoryClient::get_device(self, id.as_str()).await?;
        Ok(Device::from_directory(device, now))
    }

    async fn search_devices(&self, term: &str, limit: u32) -> Result<Vec<Device>, CoreError> {
        let now = Directory::now(self);
        let devices = DirectoryClient::search_devices(self, term, limit).await?;
        Ok(devices
            .into_iter()
            .map(|d| Device::from_directory(d, now))
            .collect())
    }

    async fn list_users(&self, request: &PageRequest) -> Result<Page<User>, CoreError> {
        let now = Directory::now(self);
        let page = DirectoryClient::list_users(self, &request.to_list_params()).await?;
        Ok(page.map(|u| User::from_directory(u, now)))
    }

    async fn get_user(&self, id: &ExternalId) -> Result<User, CoreError> {
        let now = Directory::now(self);
        let user = DirectoryClient::get_user(self, id.as_str()).await?;
        Ok(User::from_directory(user, now))
    }

    async fn search_users(&self, term: &str, limit: u32) -> Result<Vec<User>, CoreError> {
        let now = Directory::now(self);
        let users = DirectoryClient::search_users(self, term, limit).await?;
        Ok(users
            .into_iter()
            .map(|u| User::from_directory(u, now))
            .collect())
    }

    async fn list_org_units(&self) -> Result<Vec<OrgUnit>, CoreError> {
        let now = Directory::now(self);
        let units = DirectoryClient::list_org_units(self).await?;
        Ok(units
            .into_iter()
            .map(|u| OrgUnit::from_directory(u, now))
            .collect())
    }

    async fn move_devices(&self, ids: &[ExternalId], org_unit_path: &str) -> Result<(), CoreError> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_owned()).collect();
        DirectoryClient::move_devices(self, &ids, org_unit_path).await?;
        Ok(())
    }

    async fn wipe_users(&self, id: &ExternalId) -> Result<(), CoreError> {
        let response =
            DirectoryClient::issue_command(self, id.as_str(), DeviceCommandType::WipeUsers).await?;
        debug!(device = %id, command_id = ?response.command_id, "wipe issued");
        Ok(())
    }

    async fn annotate_device(
        &self,
        id: &ExternalId,
        annotation: &DeviceAnnotation,
    ) -> Result<Device, CoreError> {
        let now = Directory::now(self);
        let device = DirectoryClient::annotate_device(self, id.as_str(), annotation).await?;
        Ok(Device::from_directory(device, now))
    }

    async fn update_user(&self, id: &ExternalId, patch: &UserPatch) -> Result<User, CoreError> {
        let now = Directory::now(self);
        let user = DirectoryClient::update_user(self, id.as_str(), patch).await?;
        Ok(User::from_directory(user, now))
    }
}

// ── Per-kind dispatch ────────────────────────────────────────────────

/// A cached entity type the sync engine and search merger can fetch.
///
/// Ties each kind to its cache in the store and to the directory calls
/// that list, re-fetch, and search it.
pub trait DirectoryEntity: CachedEntity {
    fn cache(store: &FleetStore) -> &EntityCache<Self>;

    fn fetch_page<D: Directory>(
        directory: &D,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Page<Self>, CoreError>> + Send;

    /// Re-fetch one record. `Ok(None)` when the directory no longer has it.
    fn fetch_one<D: Directory>(
        directory: &D,
        id: &ExternalId,
    ) -> impl Future<Output = Result<Option<Self>, CoreError>> + Send;

    fn search_remote<D: Directory>(
        directory: &D,
        term: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Self>, CoreError>> + Send;
}

fn found<T>(result: Result<T, CoreError>) -> Result<Option<T>, CoreError> {
    match result {
        Ok(entity) => Ok(Some(entity)),
        Err(CoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

impl DirectoryEntity for Device {
    fn cache(store: &FleetStore) -> &EntityCache<Self> {
        store.devices()
    }

    fn fetch_page<D: Directory>(
        directory: &D,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Page<Self>, CoreError>> + Send {
        directory.list_devices(request)
    }

    async fn fetch_one<D: Directory>(directory: &D, id: &ExternalId) -> Result<Option<Self>, CoreError> {
        found(directory.get_device(id).await)
    }

    fn search_remote<D: Directory>(
        directory: &D,
        term: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Self>, CoreError>> + Send {
        directory.search_devices(term, limit)
    }
}

impl DirectoryEntity for User {
    fn cache(store: &FleetStore) -> &EntityCache<Self> {
        store.users()
    }

    fn fetch_page<D: Directory>(
        directory: &D,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Page<Self>, CoreError>> + Send {
        directory.list_users(request)
    }

    async fn fetch_one<D: Directory>(directory: &D, id: &ExternalId) -> Result<Option<Self>, CoreError> {
        found(directory.get_user(id).await)
    }

    fn search_remote<D: Directory>(
        directory: &D,
        term: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Self>, CoreError>> + Send {
        directory.search_users(term, limit)
    }
}

/// Org units arrive as one unpaginated listing, so every "page" is the
/// whole (scoped) set and searches filter it locally.
impl DirectoryEntity for OrgUnit {
    fn cache(store: &FleetStore) -> &EntityCache<Self> {
        store.org_units()
    }

    async fn fetch_page<D: Directory>(
        directory: &D,
        request: &PageRequest,
    ) -> Result<Page<Self>, CoreError> {
        let units = directory.list_org_units().await?;
        let items: Vec<OrgUnit> = match &request.org_unit_path {
            Some(scope) => units
                .into_iter()
                .filter(|u| is_within(&u.path, scope))
                .collect(),
            None => units,
        };
        let total = u64::try_from(items.len()).ok();
        Ok(Page {
            items,
            next_page_token: None,
            total_count: total,
        })
    }

    async fn fetch_one<D: Directory>(directory: &D, id: &ExternalId) -> Result<Option<Self>, CoreError> {
        let units = directory.list_org_units().await?;
        Ok(units.into_iter().find(|u| u.external_id == *id))
    }

    async fn search_remote<D: Directory>(
        directory: &D,
        term: &str,
        limit: u32,
    ) -> Result<Vec<Self>, CoreError> {
        let term = term.trim().to_lowercase();
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let units = directory.list_org_units().await?;
        Ok(units
            .into_iter()
            .filter(|u| u.matches(&term))
            .take(limit)
            .collect())
    }
}
