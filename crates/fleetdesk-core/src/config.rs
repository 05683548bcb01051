// ── Runtime fleet configuration ──
//
// These types describe how to reach the directory and how the sync,
// search, and batch machinery behaves. They carry credential data and
// tuning, but never touch disk. The CLI builds a `FleetConfig` and hands
// it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file (corporate proxies, test gateways).
    CustomCa(PathBuf),
}

/// How to reach the remote directory.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Directory base URL (e.g. `https://admin.googleapis.com`).
    pub base_url: Url,
    /// Customer identifier; `my_customer` resolves to the token's account.
    pub customer: String,
    /// OAuth bearer token.
    pub token: SecretString,
    pub tls: TlsVerification,
    pub timeout: Duration,
}

/// Page fetching and retry policy for sync sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Records requested per page.
    pub page_size: u32,
    /// Attempts per page (first try included) before the session fails.
    pub max_page_attempts: u32,
    /// Backoff before the first retry; doubles on each further attempt.
    pub initial_backoff: Duration,
    /// Upper bound for the doubled backoff.
    pub max_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 200,
            max_page_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Batch lifecycle execution policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Devices processed in parallel. `1` processes tickets strictly in order.
    pub concurrency: usize,
    /// Minimum spacing between remote mutations across all workers.
    /// `Duration::ZERO` disables the limiter.
    pub inter_item_delay: Duration,
    /// Re-fetch affected devices after the batch finishes.
    pub refresh_after_batch: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            inter_item_delay: Duration::from_millis(250),
            refresh_after_batch: true,
        }
    }
}

/// Interactive search behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    /// Terms shorter than this (in characters) never reach the directory.
    pub min_term_len: usize,
    /// Quiet period before the remote leg starts.
    pub debounce: Duration,
    /// Maximum remote results requested per search.
    pub remote_limit: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_term_len: 3,
            debounce: Duration::from_millis(250),
            remote_limit: 25,
        }
    }
}

/// Everything a `Fleet` needs to run.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub directory: DirectoryConfig,
    /// Where the entity cache is persisted. `None` keeps it in memory.
    pub cache_dir: Option<PathBuf>,
    pub sync: SyncConfig,
    pub batch: BatchConfig,
    pub search: SearchConfig,
}

impl FleetConfig {
    /// Default tuning around the given directory connection.
    pub fn new(directory: DirectoryConfig) -> Self {
        Self {
            directory,
            cache_dir: None,
            sync: SyncConfig::default(),
            batch: BatchConfig::default(),
            search: SearchConfig::default(),
        }
    }
}
