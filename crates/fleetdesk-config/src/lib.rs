//! Shared configuration for fleetdesk tools: TOML profiles, token
//! resolution, and translation into `fleetdesk_core::FleetConfig`.
//!
//! Core never sees these types; it receives a pre-built `FleetConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fleetdesk_core::{
    BatchConfig, DirectoryConfig, FleetConfig, SearchConfig, SyncConfig, TlsVerification,
};

const APP: &str = "fleetdesk";
const KEYRING_SERVICE: &str = "fleetdesk";
const DEFAULT_DIRECTORY_URL: &str = "https://admin.googleapis.com";
const DEFAULT_CUSTOMER: &str = "my_customer";

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("No directory token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("Profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error(transparent)]
    Figment(#[from] Box<figment::Error>),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl Config {
    /// The named profile, or the default one when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());
        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile)),
            None => Err(ConfigError::ProfileNotFound { name }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    30
}

/// One directory tenant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Directory base URL.
    #[serde(default = "default_directory_url")]
    pub directory_url: String,

    /// Customer id; `my_customer` means the token's own account.
    #[serde(default = "default_customer")]
    pub customer: String,

    /// Bearer token (plaintext; prefer the keyring or `token_env`).
    pub token: Option<String>,

    /// Name of an environment variable holding the token.
    pub token_env: Option<String>,

    /// Custom CA certificate for TLS-intercepting proxies.
    pub ca_cert: Option<PathBuf>,

    pub timeout: Option<u64>,

    /// Where the entity cache lives. Defaults to the platform data dir.
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub batch: BatchSettings,

    #[serde(default)]
    pub search: SearchSettings,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            directory_url: default_directory_url(),
            customer: default_customer(),
            token: None,
            token_env: None,
            ca_cert: None,
            timeout: None,
            cache_dir: None,
            sync: SyncSettings::default(),
            batch: BatchSettings::default(),
            search: SearchSettings::default(),
        }
    }
}

fn default_directory_url() -> String {
    DEFAULT_DIRECTORY_URL.into()
}
fn default_customer() -> String {
    DEFAULT_CUSTOMER.into()
}

/// Optional overrides; unset fields keep the core defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncSettings {
    pub page_size: Option<u32>,
    pub max_page_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BatchSettings {
    pub concurrency: Option<usize>,
    pub delay_ms: Option<u64>,
    pub refresh_after_batch: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SearchSettings {
    pub min_term_len: Option<usize>,
    pub debounce_ms: Option<u64>,
    pub remote_limit: Option<u32>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", APP, APP)
}

/// `config.toml` under the platform config dir.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Per-profile cache directory under the platform data dir.
pub fn default_cache_dir(profile_name: &str) -> PathBuf {
    project_dirs()
        .map_or_else(
            || home_fallback(".local/share"),
            |dirs| dirs.data_dir().to_path_buf(),
        )
        .join("cache")
        .join(profile_name)
}

fn home_fallback(sub: &str) -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
        .join(sub)
        .join(APP)
}

// ── Loading & saving ────────────────────────────────────────────────

/// Load from the default path, merged over defaults and under
/// `FLEETDESK_`-prefixed environment variables (`__` separates levels).
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FLEETDESK_").split("__"))
        .extract()?;
    Ok(config)
}

/// Load config, falling back to defaults when it is missing or unreadable.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    save_config_to(config, &config_path())
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(())
}

// ── Credentials ─────────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/token"),
    )?)
}

/// Resolve the bearer token: `token_env` variable, then the system
/// keyring, then the plaintext value in the profile.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_token_with(profile, profile_name, || {
        keyring_entry(profile_name)
            .and_then(|e| e.get_password().map_err(ConfigError::from))
            .ok()
    })
}

fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    keyring: impl FnOnce() -> Option<String>,
) -> Result<SecretString, ConfigError> {
    let from_env = || {
        profile
            .token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
    };
    let plaintext = || profile.token.clone();

    from_env()
        .filter(|t| !t.is_empty())
        .or_else(|| keyring().filter(|t| !t.is_empty()))
        .or_else(|| plaintext().filter(|t| !t.is_empty()))
        .map(SecretString::from)
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })
}

/// Store `token` in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token)?;
    Ok(())
}

// ── Translation into core config ────────────────────────────────────

/// The single boundary where file-level types become core types.
pub fn profile_to_fleet_config(
    profile: &Profile,
    profile_name: &str,
    token: SecretString,
    default_timeout_secs: u64,
) -> Result<FleetConfig, ConfigError> {
    let base_url: url::Url =
        profile
            .directory_url
            .parse()
            .map_err(|e: url::ParseError| ConfigError::Validation {
                field: "directory_url".into(),
                reason: format!("invalid URL {:?}: {e}", profile.directory_url),
            })?;
    if profile.customer.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "customer".into(),
            reason: "customer id cannot be empty".into(),
        });
    }

    let tls = profile
        .ca_cert
        .clone()
        .map_or(TlsVerification::SystemDefaults, TlsVerification::CustomCa);
    let directory = DirectoryConfig {
        base_url,
        customer: profile.customer.trim().to_owned(),
        token,
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(default_timeout_secs)),
    };

    let sync = {
        let d = SyncConfig::default();
        let s = &profile.sync;
        SyncConfig {
            page_size: s.page_size.unwrap_or(d.page_size).clamp(1, 500),
            max_page_attempts: s.max_page_attempts.unwrap_or(d.max_page_attempts).max(1),
            initial_backoff: s
                .initial_backoff_ms
                .map_or(d.initial_backoff, Duration::from_millis),
            max_backoff: s.max_backoff_ms.map_or(d.max_backoff, Duration::from_millis),
        }
    };
    let batch = {
        let d = BatchConfig::default();
        let b = &profile.batch;
        BatchConfig {
            concurrency: b.concurrency.unwrap_or(d.concurrency).max(1),
            inter_item_delay: b.delay_ms.map_or(d.inter_item_delay, Duration::from_millis),
            refresh_after_batch: b.refresh_after_batch.unwrap_or(d.refresh_after_batch),
        }
    };
    let search = {
        let d = SearchConfig::default();
        let s = &profile.search;
        SearchConfig {
            min_term_len: s.min_term_len.unwrap_or(d.min_term_len),
            debounce: s.debounce_ms.map_or(d.debounce, Duration::from_millis),
            remote_limit: s.remote_limit.unwrap_or(d.remote_limit),
        }
    };

    Ok(FleetConfig {
        directory,
        cache_dir: Some(
            profile
                .cache_dir
                .clone()
                .unwrap_or_else(|| default_cache_dir(profile_name)),
        ),
        sync,
        batch,
        search,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
default_profile = "district"

[profiles.district]
customer = "C01abc"
token = "plain-token"
cache_dir = "/var/cache/fleetdesk"

[profiles.district.batch]
concurrency = 4
delay_ms = 0

[profiles.district.search]
debounce_ms = 100
"#;

    #[test]
    fn loads_profiles_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = load_config_from(&path).unwrap();
        let (name, profile) = config.profile(None).unwrap();

        assert_eq!(name, "district");
        assert_eq!(profile.directory_url, DEFAULT_DIRECTORY_URL);
        assert_eq!(profile.customer, "C01abc");
        assert_eq!(profile.batch.concurrency, Some(4));
        assert_eq!(config.defaults.timeout, 30);
        assert!(matches!(
            config.profile(Some("missing")),
            Err(ConfigError::ProfileNotFound { .. })
        ));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn save_then_load_keeps_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.profiles.insert(
            "default".into(),
            Profile {
                token_env: Some("FLEETDESK_TEST_TOKEN".into()),
                ..Profile::default()
            },
        );

        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn profile_translates_into_fleet_config() {
        let profile = Profile {
            directory_url: "https://directory.test".into(),
            customer: " C01abc ".into(),
            batch: BatchSettings {
                delay_ms: Some(0),
                ..BatchSettings::default()
            },
            sync: SyncSettings {
                page_size: Some(10_000),
                ..SyncSettings::default()
            },
            ..Profile::default()
        };

        let config =
            profile_to_fleet_config(&profile, "district", SecretString::from("t"), 15).unwrap();

        assert_eq!(config.directory.customer, "C01abc");
        assert_eq!(config.directory.timeout, Duration::from_secs(15));
        assert_eq!(config.directory.token.expose_secret(), "t");
        assert_eq!(config.batch.inter_item_delay, Duration::ZERO);
        assert_eq!(config.batch.concurrency, 1);
        assert_eq!(config.sync.page_size, 500);
        assert_eq!(config.search, SearchConfig::default());
        assert!(config.cache_dir.unwrap().ends_with("district"));
    }

    #[test]
    fn invalid_profile_values_are_rejected() {
        let bad_url = Profile {
            directory_url: "not a url".into(),
            ..Profile::default()
        };
        assert!(matches!(
            profile_to_fleet_config(&bad_url, "p", SecretString::from("t"), 30),
            Err(ConfigError::Validation { .. })
        ));

        let no_customer = Profile {
            customer: "  ".into(),
            ..Profile::default()
        };
        assert!(matches!(
            profile_to_fleet_config(&no_customer, "p", SecretString::from("t"), 30),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn token_resolution_order() {
        let profile = Profile {
            token: Some("plain".into()),
            token_env: Some("PATH".into()),
            ..Profile::default()
        };
        let path = std::env::var("PATH").unwrap();
        let token = resolve_token_with(&profile, "p", || Some("kept".into())).unwrap();
        assert_eq!(token.expose_secret(), path);

        let profile = Profile {
            token_env: Some("FLEETDESK_TEST_UNSET_TOKEN_VAR".into()),
            ..profile
        };
        let token = resolve_token_with(&profile, "p", || Some("kept".into())).unwrap();
        assert_eq!(token.expose_secret(), "kept");

        let token = resolve_token_with(&profile, "p", || None).unwrap();
        assert_eq!(token.expose_secret(), "plain");

        let bare = Profile::default();
        assert!(matches!(
            resolve_token_with(&bare, "p", || Some(String::new())),
            Err(ConfigError::NoCredentials { .. })
        ));
    }
}
