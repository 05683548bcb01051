// ── Batch operations and ledgers ──

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::state::DeviceLifecycle;
use super::ticket::{LifecycleTicket, OperationKind, TicketStatus};
use crate::error::CoreError;
use crate::hierarchy::parse_org_path;
use crate::model::ExternalId;
use crate::sync::SyncHandle;

/// The operation a batch applies to every device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "operation")]
pub enum BatchOperation {
    /// Lend the devices to `assignee` (usually an email address).
    Checkout { assignee: String },
    Checkin,
    /// Wipe all user data. Irreversible; `confirmed` must be set by the
    /// caller after asking the operator.
    Reset { confirmed: bool },
    Migrate { target_org_unit: String },
}

impl BatchOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Checkout { .. } => OperationKind::Checkout,
            Self::Checkin => OperationKind::Checkin,
            Self::Reset { .. } => OperationKind::Reset,
            Self::Migrate { .. } => OperationKind::Migrate,
        }
    }

    /// The lending transition this operation performs. Migration moves a
    /// device between org units without touching its lending state.
    pub fn lifecycle_action(&self) -> Option<DeviceLifecycle> {
        match self {
            Self::Checkout { .. } => Some(DeviceLifecycle::Checkout),
            Self::Checkin => Some(DeviceLifecycle::Checkin),
            Self::Reset { .. } => Some(DeviceLifecycle::Reset),
            Self::Migrate { .. } => None,
        }
    }

    pub fn target_org_unit(&self) -> Option<&str> {
        match self {
            Self::Migrate { target_org_unit } => Some(target_org_unit.as_str()),
            _ => None,
        }
    }

    /// Check parameters before anything runs, normalizing the migration
    /// target path.
    pub(crate) fn validated(self) -> Result<Self, CoreError> {
        match self {
            Self::Checkout { assignee } => {
                let assignee = assignee.trim();
                if assignee.is_empty() {
                    return Err(CoreError::ValidationFailed {
                        message: "checkout needs an assignee".into(),
                    });
                }
                Ok(Self::Checkout {
                    assignee: assignee.to_owned(),
                })
            }
            Self::Reset { confirmed: false } => Err(CoreError::ValidationFailed {
                message: "reset wipes user data and must be confirmed".into(),
            }),
            Self::Migrate { target_org_unit } => Ok(Self::Migrate {
                target_org_unit: parse_org_path(&target_org_unit)?,
            }),
            op @ (Self::Checkin | Self::Reset { confirmed: true }) => Ok(op),
        }
    }
}

/// An identifier that did not resolve to exactly one new device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidIdentifier {
    pub input: String,
    pub reason: String,
}

/// Final record of a batch. Every ticket is terminal.
#[derive(Debug, Clone, Serialize)]
pub struct BatchLedger {
    pub id: Uuid,
    pub operation: OperationKind,
    pub target_org_unit: Option<String>,
    /// In dispatch order.
    pub tickets: Vec<LifecycleTicket>,
    /// Rejected before dispatch; never ticketed.
    pub invalid: Vec<InvalidIdentifier>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchLedger {
    pub fn total(&self) -> usize {
        self.tickets.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(TicketStatus::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(TicketStatus::Error)
    }

    pub fn succeeded_ids(&self) -> Vec<ExternalId> {
        self.tickets
            .iter()
            .filter(|t| t.status == TicketStatus::Success)
            .map(|t| t.device_id.clone())
            .collect()
    }

    fn count(&self, status: TicketStatus) -> usize {
        self.tickets.iter().filter(|t| t.status == status).count()
    }
}

/// A finished batch plus the cache refresh it triggered, if any.
///
/// The ledger is final when this is returned; the refresh runs on.
#[derive(Debug)]
pub struct BatchOutcome {
    pub ledger: BatchLedger,
    pub refresh: Option<SyncHandle>,
}
