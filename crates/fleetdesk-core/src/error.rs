// ── Core error types ──
//
// User-facing errors from fleetdesk-core. Consumers never see HTTP status
// codes or JSON parse failures directly; the `From<fleetdesk_api::Error>`
// impl translates transport-layer errors into domain variants.

use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::DeviceLifecycle;
use crate::model::{EntityKind, LifecycleState};

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach directory at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Directory request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Directory rate limit hit -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Entity not found: {entity_type} {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Invalid org unit path {path:?}: {reason}")]
    InvalidOrgPath { path: String, reason: String },

    #[error("Cannot {action} a device that is {from}")]
    InvalidTransition {
        from: LifecycleState,
        action: DeviceLifecycle,
    },

    // ── Sync errors ──────────────────────────────────────────────────
    #[error("{kind} sync failed: {message}")]
    SyncFailed { kind: EntityKind, message: String },

    // ── Local cache errors ───────────────────────────────────────────
    #[error("Cache persistence error: {message}")]
    Persistence { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("Directory API error: {message}")]
    Api {
        message: String,
        /// Machine-readable reason from the directory (e.g. `invalid`).
        reason: Option<String>,
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the failure is transient and the same request may succeed
    /// if repeated after a backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::RateLimited { .. } => {
                true
            }
            Self::Api {
                status: Some(status),
                ..
            } => *status >= 500,
            _ => false,
        }
    }

    /// Minimum wait the directory asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(Duration::from_secs(*retry_after_secs)),
            _ => None,
        }
    }

    pub(crate) fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence {
            message: err.to_string(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<fleetdesk_api::Error> for CoreError {
    fn from(err: fleetdesk_api::Error) -> Self {
        match err {
            fleetdesk_api::Error::Unauthorized { message } => {
                CoreError::AuthenticationFailed { message }
            }
            fleetdesk_api::Error::Forbidden { message } => CoreError::PermissionDenied { message },
            fleetdesk_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() || e.is_request() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        reason: None,
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            fleetdesk_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            fleetdesk_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            fleetdesk_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            fleetdesk_api::Error::RateLimited { retry_after_secs } => {
                CoreError::RateLimited { retry_after_secs }
            }
            fleetdesk_api::Error::NotFound { resource } => CoreError::NotFound {
                entity_type: "resource".into(),
                identifier: resource,
            },
            fleetdesk_api::Error::Api {
                status,
                message,
                reason,
            } => CoreError::Api {
                message,
                reason,
                status: Some(status),
            },
            fleetdesk_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
