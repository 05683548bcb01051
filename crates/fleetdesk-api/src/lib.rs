// fleetdesk-api: Async Rust client for a Google-Admin-style device directory

pub mod client;
pub mod devices;
pub mod error;
pub mod org_units;
pub mod transport;
pub mod types;
pub mod users;

pub use client::{DEFAULT_CUSTOMER, DirectoryClient};
pub use error::Error;
pub use transport::{TlsMode, TransportConfig};
pub use types::{
    ChromeOsDevice, DeviceAnnotation, DeviceCommandType, DirectoryUser, IssueCommandResponse,
    ListParams, OrgUnitResponse, Page, UserName, UserPatch,
};
