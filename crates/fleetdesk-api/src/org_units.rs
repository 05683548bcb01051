// Org unit endpoints

use tracing::debug;

use crate::client::DirectoryClient;
use crate::error::Error;
use crate::types::{OrgUnitListResponse, OrgUnitResponse};

impl DirectoryClient {
    /// List every org unit below the root (the root itself is not returned).
    ///
    /// `GET /customer/{customer}/orgunits?type=all`
    pub async fn list_org_units(&self) -> Result<Vec<OrgUnitResponse>, Error> {
        let url = self.customer_url(&["orgunits"]);
        let resp: OrgUnitListResponse = self.get(url, &[("type", "all".to_owned())]).await?;
        debug!(count = resp.organization_units.len(), "listed org units");
        Ok(resp.organization_units)
    }
}
