// ── Sync session state ──
//
// One `SyncProgress` value per session, published through a `watch`
// channel. The engine is the only writer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{EntityKind, ExternalId};
use crate::store::UpsertReport;

/// Whether this is the first sync of an entity type or a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncMode {
    /// No full sync has ever completed for this entity type.
    Initial,
    Incremental,
}

/// Which part of the directory a session lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum SyncScope {
    /// Everything of this kind. The only scope that tombstones.
    Full,
    /// One org unit and its descendants.
    OrgUnit(String),
    /// Re-fetch specific records.
    Items(Vec<ExternalId>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SyncState {
    Running,
    Completed,
    Failed { error: String },
}

/// Per-row sync status, for marking in-flight rows in a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ItemSyncStatus {
    Pending,
    Syncing,
    Done,
    Failed,
}

/// Totals for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub stale: usize,
    pub protected: usize,
    pub failed: usize,
    /// Tombstoned records.
    pub removed: usize,
    pub pages: usize,
    /// Page or item fetches that were retried after a transient failure.
    pub retries: usize,
    pub duration_ms: u64,
}

impl SyncSummary {
    fn absorb(&mut self, report: &UpsertReport) {
        self.created += report.created;
        self.updated += report.updated;
        self.unchanged += report.unchanged;
        self.stale += report.stale;
        self.protected += report.protected;
        self.failed += report.failed.len();
    }
}

/// Observable state of one sync session.
///
/// `processed` and `percent` never decrease within a session. `percent`
/// stays below 100 until the listing is known to be complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncProgress {
    pub kind: EntityKind,
    pub session_id: Uuid,
    pub mode: SyncMode,
    pub scope: SyncScope,
    pub state: SyncState,
    pub started_at: DateTime<Utc>,
    /// Best current estimate; refined as pages report cursor or total.
    pub total_expected: Option<u64>,
    pub processed: u64,
    pub percent: u8,
    pub item_status: BTreeMap<ExternalId, ItemSyncStatus>,
    pub summary: SyncSummary,
}

impl SyncProgress {
    pub(crate) fn new(kind: EntityKind, session_id: Uuid, mode: SyncMode, scope: SyncScope) -> Self {
        Self {
            kind,
            session_id,
            mode,
            scope,
            state: SyncState::Running,
            started_at: Utc::now(),
            total_expected: None,
            processed: 0,
            percent: 0,
            item_status: BTreeMap::new(),
            summary: SyncSummary::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.state, SyncState::Running)
    }

    /// Initial syncs always show progress; refreshes only while running.
    pub fn should_display(&self) -> bool {
        self.mode == SyncMode::Initial || !self.is_terminal()
    }

    /// Rows currently being written.
    pub fn syncing_ids(&self) -> impl Iterator<Item = &ExternalId> {
        self.item_status
            .iter()
            .filter(|(_, status)| **status == ItemSyncStatus::Syncing)
            .map(|(id, _)| id)
    }

    pub fn status_of(&self, id: &ExternalId) -> Option<ItemSyncStatus> {
        self.item_status.get(id).copied()
    }

    // ── Engine-side updates ──────────────────────────────────────────

    pub(crate) fn mark(&mut self, ids: &[ExternalId], status: ItemSyncStatus) {
        for id in ids {
            self.item_status.insert(id.clone(), status);
        }
    }

    /// Record the outcome of writing `ids` to the cache.
    pub(crate) fn apply_report(&mut self, ids: &[ExternalId], report: &UpsertReport) {
        for id in ids {
            let failed = report.failed.iter().any(|(failed_id, _)| failed_id == id);
            let status = if failed {
                ItemSyncStatus::Failed
            } else {
                ItemSyncStatus::Done
            };
            self.item_status.insert(id.clone(), status);
        }
        self.summary.absorb(report);
    }

    /// Account for one fetched page and refine the expected total.
    pub(crate) fn record_page(
        &mut self,
        fetched: u64,
        reported_total: Option<u64>,
        has_more: bool,
        page_size: u64,
    ) {
        self.processed += fetched;
        self.summary.pages += 1;
        let floor = self.processed;
        self.total_expected = Some(match reported_total {
            Some(total) => total.max(floor),
            // Unknown remainder: assume at least one more page.
            None if has_more => floor + page_size.max(1),
            None => floor,
        });
        self.refresh_percent();
    }

    pub(crate) fn record_item(&mut self) {
        self.processed += 1;
        self.refresh_percent();
    }

    pub(crate) fn complete(&mut self, duration_ms: u64) {
        self.total_expected = Some(self.processed);
        self.percent = 100;
        self.summary.duration_ms = duration_ms;
        self.state = SyncState::Completed;
    }

    /// Partial progress stays as it is.
    pub(crate) fn fail(&mut self, error: &CoreError, duration_ms: u64) {
        self.summary.duration_ms = duration_ms;
        self.state = SyncState::Failed {
            error: error.to_string(),
        };
    }

    fn refresh_percent(&mut self) {
        let raw = match self.total_expected {
            Some(total) if total > 0 => self.processed.saturating_mul(100) / total,
            _ => 0,
        };
        let capped = u8::try_from(raw.min(99)).unwrap_or(99);
        self.percent = self.percent.max(capped);
    }
}

// ── SyncHandle ───────────────────────────────────────────────────────

/// A subscription to one sync session. Cheap to clone; every clone
/// observes the same session.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    kind: EntityKind,
    session_id: Uuid,
    rx: watch::Receiver<SyncProgress>,
}

impl SyncHandle {
    pub(crate) fn new(rx: watch::Receiver<SyncProgress>) -> Self {
        let (kind, session_id) = {
            let progress = rx.borrow();
            (progress.kind, progress.session_id)
        };
        Self {
            kind,
            session_id,
            rx,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// A receiver for progress updates.
    pub fn progress(&self) -> watch::Receiver<SyncProgress> {
        self.rx.clone()
    }

    pub fn current(&self) -> SyncProgress {
        self.rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.rx.borrow().is_terminal()
    }

    /// Wait for the session to finish.
    pub async fn wait(&self) -> Result<SyncSummary, CoreError> {
        let mut rx = self.rx.clone();
        let progress = rx
            .wait_for(SyncProgress::is_terminal)
            .await
            .map_err(|_| CoreError::Internal(format!("{} sync task vanished", self.kind)))?
            .clone();

        match progress.state {
            SyncState::Completed => Ok(progress.summary),
            SyncState::Failed { error } => Err(CoreError::SyncFailed {
                kind: self.kind,
                message: error,
            }),
            SyncState::Running => Err(CoreError::Internal("sync still running".into())),
        }
    }
}
