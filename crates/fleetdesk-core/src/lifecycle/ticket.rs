// ── Batch tickets ──
//
// One ticket per resolved device in a batch. A ticket only moves forward:
// pending -> processing -> success | error, or pending -> error when the
// device cannot take the operation at all.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CoreError;
use crate::model::{Device, ExternalId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Processing,
    Success,
    Error,
}

impl TicketStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing | Self::Error)
                | (Self::Processing, Self::Success | Self::Error)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    Checkout,
    Checkin,
    Reset,
    Migrate,
}

/// One device's record within a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleTicket {
    /// Dispatch position within the batch.
    pub index: usize,
    pub device_id: ExternalId,
    /// The identifier as the operator typed it.
    pub identifier: String,
    pub serial_number: String,
    pub operation: OperationKind,
    pub source_org_unit: String,
    /// Set for migrations.
    pub target_org_unit: Option<String>,
    pub status: TicketStatus,
    /// Outcome detail; the directory's error message on failure.
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl LifecycleTicket {
    pub(crate) fn pending(
        index: usize,
        identifier: String,
        device: &Device,
        operation: OperationKind,
        target_org_unit: Option<String>,
    ) -> Self {
        Self {
            index,
            device_id: device.external_id.clone(),
            identifier,
            serial_number: device.serial_number.clone(),
            operation,
            source_org_unit: device.org_unit_path.clone(),
            target_org_unit,
            status: TicketStatus::Pending,
            message: None,
            updated_at: Utc::now(),
        }
    }

    /// Move to `next`. Terminal tickets and backward moves are rejected.
    pub(crate) fn advance(
        &mut self,
        next: TicketStatus,
        message: Option<String>,
    ) -> Result<(), CoreError> {
        if !self.status.can_advance_to(next) {
            return Err(CoreError::Internal(format!(
                "ticket {} for {} cannot go from {} to {next}",
                self.index, self.device_id, self.status
            )));
        }
        self.status = next;
        if message.is_some() {
            self.message = message;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
