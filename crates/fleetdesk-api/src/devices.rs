// ChromeOS device endpoints
//
// Listing and lookup via `customer/{customer}/devices/chromeos`, plus the
// write paths the lending workflow needs: OU moves, remote commands, and
// annotation updates.

use tracing::debug;

use crate::client::DirectoryClient;
use crate::error::Error;
use crate::types::{
    ChromeOsDevice, DeviceAnnotation, DeviceCommandType, DeviceListResponse, IssueCommandRequest,
    IssueCommandResponse, ListParams, MoveDevicesRequest, Page,
};

impl DirectoryClient {
    /// List one page of devices.
    ///
    /// `GET /customer/{customer}/devices/chromeos?maxResults=..&pageToken=..`
    pub async fn list_devices(&self, params: &ListParams) -> Result<Page<ChromeOsDevice>, Error> {
        let url = self.customer_url(&["devices", "chromeos"]);
        let mut query = params.to_query();
        query.push(("projection", "FULL".to_owned()));

        let resp: DeviceListResponse = self.get(url, &query).await?;
        debug!(
            count = resp.chromeosdevices.len(),
            has_more = resp.next_page_token.is_some(),
            "listed device page"
        );
        Ok(Page {
            items: resp.chromeosdevices,
            next_page_token: resp.next_page_token,
            total_count: resp.total_count,
        })
    }

    /// Fetch a single device by its directory ID.
    ///
    /// `GET /customer/{customer}/devices/chromeos/{deviceId}`
    pub async fn get_device(&self, device_id: &str) -> Result<ChromeOsDevice, Error> {
        let url = self.customer_url(&["devices", "chromeos", device_id]);
        self.get(url, &[("projection", "FULL".to_owned())]).await
    }

    /// Free-text device search (serial, asset ID, annotated user, ...).
    ///
    /// Returns only the first page; search is an interactive lookup, not a sync.
    pub async fn search_devices(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<ChromeOsDevice>, Error> {
        let params = ListParams {
            max_results,
            query: Some(query.to_owned()),
            ..ListParams::default()
        };
        Ok(self.list_devices(&params).await?.items)
    }

    /// Move devices into an org unit.
    ///
    /// `POST /customer/{customer}/devices/chromeos/moveDevicesToOu?orgUnitPath=..`
    pub async fn move_devices(&self, device_ids: &[String], org_unit_path: &str) -> Result<(), Error> {
        let url = self.customer_url(&["devices", "chromeos", "moveDevicesToOu"]);
        debug!(count = device_ids.len(), org_unit_path, "moving devices");
        self.post_no_response(
            url,
            &[("orgUnitPath", org_unit_path.to_owned())],
            &MoveDevicesRequest { device_ids },
        )
        .await
    }

    /// Issue a remote command (wipe users, powerwash, reboot).
    ///
    /// `POST /customer/{customer}/devices/chromeos/{deviceId}:issueCommand`
    pub async fn issue_command(
        &self,
        device_id: &str,
        command_type: DeviceCommandType,
    ) -> Result<IssueCommandResponse, Error> {
        let action = format!("{device_id}:issueCommand");
        let url = self.customer_url(&["devices", "chromeos", &action]);
        debug!(device_id, ?command_type, "issuing device command");
        self.post(url, &[], &IssueCommandRequest { command_type }).await
    }

    /// Update annotation fields on a device.
    ///
    /// `PUT /customer/{customer}/devices/chromeos/{deviceId}`
    pub async fn annotate_device(
        &self,
        device_id: &str,
        annotation: &DeviceAnnotation,
    ) -> Result<ChromeOsDevice, Error> {
        let url = self.customer_url(&["devices", "chromeos", device_id]);
        debug!(device_id, "updating device annotation");
        self.put(url, annotation).await
    }
}
