use thiserror::Error;

/// Top-level error type for the `fleetdesk-api` crate.
///
/// Covers every failure mode of the directory surface: authentication,
/// transport, structured API errors, and response decoding.
/// `fleetdesk-core` maps these into domain-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Bearer token missing, expired, or rejected.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Token accepted but lacks the scope for this call.
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The directory throttled this client.
    #[error("Rate limited -- retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── Directory API ───────────────────────────────────────────────
    /// Requested entity does not exist.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Structured error body returned by the directory.
    #[error("Directory API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        message: String,
        /// Machine-readable reason (e.g. `invalidOrgunit`).
        reason: Option<String>,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }

    /// Extract the directory's machine-readable reason, if available.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Api { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Api {
            status: 503,
            message: "backend unavailable".into(),
            reason: None,
        };
        assert!(err.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let err = Error::Api {
            status: 400,
            message: "Invalid Input: orgUnitPath".into(),
            reason: Some("invalid".into()),
        };
        assert!(!err.is_transient());
        assert_eq!(err.reason(), Some("invalid"));
    }

    #[test]
    fn rate_limit_is_transient() {
        assert!(Error::RateLimited { retry_after_secs: 3 }.is_transient());
        assert!(!Error::Unauthorized { message: "expired".into() }.is_transient());
    }
}
