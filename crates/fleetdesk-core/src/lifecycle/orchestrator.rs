// ── Lifecycle orchestrator ──
//
// Resolves operator-typed identifiers to cached devices, then drives one
// ticket per device through the directory mutation with bounded
// concurrency and a shared rate limit. Every ticket ends terminal; one
// device's failure never stops the others.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use fleetdesk_api::DeviceAnnotation;
use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::batch::{BatchLedger, BatchOperation, BatchOutcome, InvalidIdentifier};
use super::state::DeviceLifecycle;
use super::ticket::{LifecycleTicket, TicketStatus};
use crate::config::BatchConfig;
use crate::directory::Directory;
use crate::error::CoreError;
use crate::model::{Device, LifecycleState, StatusSource};
use crate::store::FleetStore;
use crate::sync::{SyncEngine, SyncScope};

/// Receives a copy of a ticket after every transition.
pub type TicketSender = mpsc::UnboundedSender<LifecycleTicket>;

pub struct LifecycleOrchestrator<D: Directory> {
    directory: Arc<D>,
    store: Arc<FleetStore>,
    sync: SyncEngine<D>,
    config: BatchConfig,
}

impl<D: Directory> LifecycleOrchestrator<D> {
    pub fn new(
        directory: Arc<D>,
        store: Arc<FleetStore>,
        sync: SyncEngine<D>,
        config: BatchConfig,
    ) -> Self {
        Self {
            directory,
            store,
            sync,
            config,
        }
    }

    // ── Resolution ───────────────────────────────────────────────────

    /// Find the cached device for a serial number or asset tag,
    /// case-insensitively. Serial numbers win over asset tags.
    pub fn resolve(&self, identifier: &str) -> Result<Arc<Device>, CoreError> {
        let needle = identifier.trim().to_lowercase();
        if needle.is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "empty device identifier".into(),
            });
        }

        let devices = self.store.devices();
        if let Some(device) = devices.find_by_natural_key(&needle) {
            return Ok(device);
        }

        let tagged: Vec<Arc<Device>> = devices
            .snapshot()
            .iter()
            .filter(|d| {
                d.asset_tag
                    .as_deref()
                    .is_some_and(|tag| tag.to_lowercase() == needle)
            })
            .cloned()
            .collect();
        match tagged.len() {
            1 => Ok(Arc::clone(&tagged[0])),
            0 => Err(CoreError::NotFound {
                entity_type: "device".into(),
                identifier: identifier.trim().to_owned(),
            }),
            n => Err(CoreError::ValidationFailed {
                message: format!("asset tag {:?} matches {n} devices", identifier.trim()),
            }),
        }
    }

    /// Resolve every identifier; each device may appear only once.
    fn resolve_all(
        &self,
        identifiers: &[String],
    ) -> (Vec<(String, Arc<Device>)>, Vec<InvalidIdentifier>) {
        let mut resolved = Vec::new();
        let mut invalid = Vec::new();
        let mut taken = HashSet::new();

        for input in identifiers {
            match self.resolve(input) {
                Ok(device) if taken.insert(device.external_id.clone()) => {
                    resolved.push((input.trim().to_owned(), device));
                }
                Ok(device) => invalid.push(InvalidIdentifier {
                    input: input.clone(),
                    reason: format!("duplicate of device {}", device.serial_number),
                }),
                Err(CoreError::NotFound { .. }) => invalid.push(InvalidIdentifier {
                    input: input.clone(),
                    reason: "no cached device with this serial number or asset tag".into(),
                }),
                Err(e) => invalid.push(InvalidIdentifier {
                    input: input.clone(),
                    reason: e.to_string(),
                }),
            }
        }
        (resolved, invalid)
    }

    // ── Batch execution ──────────────────────────────────────────────

    /// Run `operation` over every resolvable identifier.
    ///
    /// Parameter errors (unconfirmed reset, malformed target path, missing
    /// assignee) fail the call before anything is touched. Unresolved
    /// identifiers are listed in the ledger's `invalid` section and get no
    /// ticket. `updates` receives every ticket transition.
    pub async fn run_batch(
        &self,
        operation: BatchOperation,
        identifiers: &[String],
        updates: Option<TicketSender>,
    ) -> Result<BatchOutcome, CoreError> {
        let operation = operation.validated()?;
        let started_at = Utc::now();
        let batch_id = Uuid::new_v4();
        let (resolved, invalid) = self.resolve_all(identifiers);

        for bad in &invalid {
            warn!(batch = %batch_id, input = %bad.input, reason = %bad.reason, "identifier rejected");
        }
        info!(
            batch = %batch_id,
            operation = %operation.kind(),
            devices = resolved.len(),
            invalid = invalid.len(),
            "batch started"
        );

        let target = operation.target_org_unit().map(str::to_owned);
        let work: Vec<(LifecycleTicket, Arc<Device>)> = resolved
            .into_iter()
            .enumerate()
            .map(|(index, (input, device))| {
                let ticket =
                    LifecycleTicket::pending(index, input, &device, operation.kind(), target.clone());
                (ticket, device)
            })
            .collect();
        for (ticket, _) in &work {
            notify(updates.as_ref(), ticket);
        }

        let limiter = (!self.config.inter_item_delay.is_zero()).then(|| {
            let mut limiter = interval(self.config.inter_item_delay);
            limiter.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Mutex::new(limiter)
        });

        let mut tickets: Vec<LifecycleTicket> = stream::iter(work)
            .map(|(ticket, device)| {
                self.process(ticket, device, &operation, limiter.as_ref(), updates.as_ref())
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        tickets.sort_by_key(|t| t.index);

        let ledger = BatchLedger {
            id: batch_id,
            operation: operation.kind(),
            target_org_unit: target,
            tickets,
            invalid,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            batch = %batch_id,
            succeeded = ledger.succeeded(),
            failed = ledger.failed(),
            total = ledger.total(),
            "batch finished"
        );

        // Item refreshes run beside any listing sync already in flight.
        let affected = ledger.succeeded_ids();
        let refresh = (self.config.refresh_after_batch && !affected.is_empty())
            .then(|| self.sync.start::<Device>(SyncScope::Items(affected)));
        Ok(BatchOutcome { ledger, refresh })
    }

    /// Drive one ticket to a terminal state.
    async fn process(
        &self,
        mut ticket: LifecycleTicket,
        resolved: Arc<Device>,
        operation: &BatchOperation,
        limiter: Option<&Mutex<Interval>>,
        updates: Option<&TicketSender>,
    ) -> LifecycleTicket {
        // Earlier tickets or a sync may have refreshed the record since
        // resolution.
        let device = self.store.devices().get(&ticket.device_id).unwrap_or(resolved);

        // Lending rules are checked locally; a refused transition never
        // reaches the directory.
        if let Some(action) = operation.lifecycle_action() {
            if let Err(e) = device.status.apply(action) {
                advance(&mut ticket, TicketStatus::Error, Some(e.to_string()), updates);
                return ticket;
            }
        }

        if let Some(limiter) = limiter {
            limiter.lock().await.tick().await;
        }

        advance(&mut ticket, TicketStatus::Processing, None, updates);
        match self.execute(operation, &device).await {
            Ok(message) => {
                debug!(device = %ticket.device_id, %message, "ticket succeeded");
                advance(&mut ticket, TicketStatus::Success, Some(message), updates);
            }
            Err(e) => {
                warn!(device = %ticket.device_id, error = %e, "ticket failed");
                advance(&mut ticket, TicketStatus::Error, Some(e.to_string()), updates);
            }
        }
        ticket
    }

    /// The directory mutation for one device, then the matching local
    /// update. Returns the ticket's success message.
    async fn execute(&self, operation: &BatchOperation, device: &Device) -> Result<String, CoreError> {
        let id = &device.external_id;
        match operation {
            BatchOperation::Checkout { assignee } => {
                let annotation = DeviceAnnotation {
                    annotated_user: Some(assignee.clone()),
                    ..DeviceAnnotation::default()
                };
                self.directory.annotate_device(id, &annotation).await?;
                self.apply_locally(device, |d| {
                    d.status = LifecycleState::CheckedOut;
                    d.status_source = StatusSource::Local;
                    d.assignee = Some(assignee.clone());
                });
                Ok(format!("checked out to {assignee}"))
            }
            BatchOperation::Checkin => {
                let annotation = DeviceAnnotation {
                    annotated_user: Some(String::new()),
                    ..DeviceAnnotation::default()
                };
                self.directory.annotate_device(id, &annotation).await?;
                self.apply_locally(device, |d| {
                    d.status = LifecycleState::Available;
                    d.status_source = StatusSource::Directory;
                    d.assignee = None;
                });
                Ok("checked in".to_owned())
            }
            BatchOperation::Reset { .. } => {
                self.directory.wipe_users(id).await?;
                self.apply_locally(device, |d| {
                    d.status = LifecycleState::ResetWiped;
                    d.status_source = StatusSource::Local;
                    d.assignee = None;
                });
                Ok("user data wipe issued".to_owned())
            }
            BatchOperation::Migrate { target_org_unit } => {
                if device.org_unit_path == *target_org_unit {
                    return Ok(format!("already in {target_org_unit}"));
                }
                self.directory
                    .move_devices(std::slice::from_ref(id), target_org_unit)
                    .await?;
                self.apply_locally(device, |d| d.org_unit_path.clone_from(target_org_unit));
                Ok(format!("moved {} -> {target_org_unit}", device.org_unit_path))
            }
        }
    }

    /// The directory already accepted the change, so a local write
    /// failure only delays convergence until the next refresh.
    ///
    /// The write is stamped with the mutation time; a listing requested
    /// before the mutation is then stale and cannot undo it.
    fn apply_locally(&self, device: &Device, change: impl FnOnce(&mut Device)) {
        let changed_at = self.directory.now();
        let result = self.store.devices().apply_local(&device.external_id, |d| {
            change(d);
            d.last_synced_at = d.last_synced_at.max(changed_at);
        });
        if let Err(e) = result {
            warn!(device = %device.external_id, error = %e, "local update failed after directory change");
        }
    }

    // ── Local-only transitions ───────────────────────────────────────

    /// Apply a lending step that has no directory side (signature
    /// requests, signing, returning a reset device to service).
    pub fn apply_local_transition(
        &self,
        identifier: &str,
        action: DeviceLifecycle,
    ) -> Result<Arc<Device>, CoreError> {
        let source = match action {
            DeviceLifecycle::RequestSignature | DeviceLifecycle::Sign => StatusSource::Local,
            DeviceLifecycle::ReturnToService => StatusSource::Directory,
            DeviceLifecycle::Checkout | DeviceLifecycle::Checkin | DeviceLifecycle::Reset => {
                return Err(CoreError::ValidationFailed {
                    message: format!("{action} changes the directory; run it as a batch"),
                });
            }
        };

        let device = self.resolve(identifier)?;
        let next = device.status.apply(action)?;
        let updated = self.store.devices().apply_local(&device.external_id, |d| {
            d.status = next;
            d.status_source = source;
        })?;
        info!(device = %updated.external_id, %action, status = %next, "lifecycle transition");
        Ok(updated)
    }
}

fn notify(updates: Option<&TicketSender>, ticket: &LifecycleTicket) {
    if let Some(tx) = updates {
        // A dropped receiver only means nobody is watching.
        let _ = tx.send(ticket.clone());
    }
}

fn advance(
    ticket: &mut LifecycleTicket,
    next: TicketStatus,
    message: Option<String>,
    updates: Option<&TicketSender>,
) {
    match ticket.advance(next, message) {
        Ok(()) => notify(updates, ticket),
        Err(e) => warn!(error = %e, "ticket transition refused"),
    }
}
