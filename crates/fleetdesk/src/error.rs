//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text and distinct exit codes.

use miette::Diagnostic;
use thiserror::Error;

use fleetdesk_config::ConfigError;
use fleetdesk_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    /// A batch ran but some devices failed.
    pub const PARTIAL: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the directory at {url}")]
    #[diagnostic(
        code(fleetdesk::connection_failed),
        help(
            "{reason}\n\
             Check network access, or set ca_cert in your profile behind a TLS-inspecting proxy."
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Directory rate limit hit")]
    #[diagnostic(
        code(fleetdesk::rate_limited),
        help("Wait {retry_after_secs}s, or lower batch.concurrency in your profile.")
    )]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(fleetdesk::timeout),
        help("Increase the timeout with --timeout or in your profile.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(fleetdesk::auth_failed),
        help(
            "The directory token is missing, expired, or revoked.\n\
             Run: fleetdesk config set-token"
        )
    )]
    AuthFailed { message: String },

    #[error("No directory token configured for profile '{profile}'")]
    #[diagnostic(
        code(fleetdesk::no_credentials),
        help(
            "Store one with: fleetdesk config set-token --profile {profile}\n\
             Or set FLEETDESK_TOKEN."
        )
    )]
    NoCredentials { profile: String },

    #[error("Permission denied: {message}")]
    #[diagnostic(
        code(fleetdesk::permission_denied),
        help("The token's account needs device and user management rights.")
    )]
    PermissionDenied { message: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(fleetdesk::not_found),
        help("Run: fleetdesk {list_command} (or sync first: fleetdesk sync {resource_type}s)")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{message}")]
    #[diagnostic(
        code(fleetdesk::invalid_transition),
        help("Check the device's current status with: fleetdesk devices get <serial>")
    )]
    InvalidTransition { message: String },

    // ── Directory / sync ─────────────────────────────────────────────
    #[error("Directory error ({code}): {message}")]
    #[diagnostic(code(fleetdesk::api_error))]
    ApiError { code: String, message: String },

    #[error("{message}")]
    #[diagnostic(
        code(fleetdesk::sync_failed),
        help("Progress made so far is kept; run the same sync again to continue.")
    )]
    SyncFailed { message: String },

    #[error("{failed} of {total} devices failed")]
    #[diagnostic(
        code(fleetdesk::batch_partial),
        help("Failed tickets carry the directory's message; fix and rerun with just those devices.")
    )]
    BatchFailures { failed: usize, total: usize },

    #[error("Local cache error: {message}")]
    #[diagnostic(
        code(fleetdesk::cache),
        help("Check permissions on the cache directory, or point --cache-dir elsewhere.")
    )]
    Cache { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fleetdesk::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(fleetdesk::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: fleetdesk config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(fleetdesk::config),
        help("Config file: {path}")
    )]
    Config { message: String, path: String },

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(fleetdesk::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    #[error("Aborted")]
    #[diagnostic(code(fleetdesk::aborted))]
    Aborted,

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(fleetdesk::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::RateLimited { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::PermissionDenied { .. } => exit_code::PERMISSION,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::InvalidTransition { .. } => exit_code::CONFLICT,
            Self::BatchFailures { .. } => exit_code::PARTIAL,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed { url, reason },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::PermissionDenied { message } => CliError::PermissionDenied { message },
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::RateLimited { retry_after_secs } => {
                CliError::RateLimited { retry_after_secs }
            }
            CoreError::NotFound {
                entity_type,
                identifier,
            } => CliError::NotFound {
                list_command: format!("{entity_type}s list"),
                resource_type: entity_type,
                identifier,
            },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::InvalidOrgPath { path, reason } => CliError::Validation {
                field: "org unit".into(),
                reason: format!("{path:?}: {reason}"),
            },
            err @ CoreError::InvalidTransition { .. } => CliError::InvalidTransition {
                message: err.to_string(),
            },
            err @ CoreError::SyncFailed { .. } => CliError::SyncFailed {
                message: err.to_string(),
            },
            CoreError::Persistence { message } => CliError::Cache { message },
            CoreError::Api {
                message,
                reason,
                status,
            } => CliError::ApiError {
                code: reason
                    .or_else(|| status.map(|s| s.to_string()))
                    .unwrap_or_else(|| "unknown".into()),
                message,
            },
            CoreError::Config { message } => CliError::Config {
                message,
                path: fleetdesk_config::config_path().display().to_string(),
            },
            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::ProfileNotFound { name } => {
                let available = fleetdesk_config::load_config_or_default()
                    .profiles
                    .into_keys()
                    .collect::<Vec<_>>()
                    .join(", ");
                CliError::ProfileNotFound {
                    name,
                    available: if available.is_empty() {
                        "(none)".into()
                    } else {
                        available
                    },
                }
            }
            ConfigError::Io(err) => CliError::Io(err),
            other => CliError::Config {
                message: other.to_string(),
                path: fleetdesk_config::config_path().display().to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetdesk_core::{DeviceLifecycle, LifecycleState};

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                CoreError::AuthenticationFailed {
                    message: "expired".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::NotFound {
                    entity_type: "device".into(),
                    identifier: "SN1".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::InvalidTransition {
                    from: LifecycleState::Available,
                    action: DeviceLifecycle::Checkin,
                },
                exit_code::CONFLICT,
            ),
            (
                CoreError::InvalidOrgPath {
                    path: "A".into(),
                    reason: "path must start with '/'".into(),
                },
                exit_code::USAGE,
            ),
            (CoreError::Timeout { timeout_secs: 30 }, exit_code::TIMEOUT),
        ];
        for (core, code) in cases {
            assert_eq!(CliError::from(core).exit_code(), code);
        }
    }

    #[test]
    fn api_errors_keep_the_directory_reason() {
        let err = CliError::from(CoreError::Api {
            message: "Invalid Input: d-1".into(),
            reason: Some("invalid".into()),
            status: Some(400),
        });
        assert_eq!(err.to_string(), "Directory error (invalid): Invalid Input: d-1");
        assert_eq!(err.exit_code(), exit_code::GENERAL);
    }
}
