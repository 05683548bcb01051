//! CLI configuration: thin wrapper around `fleetdesk_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides (--directory-url,
//! --token, etc.).

use secrecy::SecretString;

use fleetdesk_config::Profile;
use fleetdesk_core::FleetConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use fleetdesk_config::{Config, config_path, load_config_or_default, save_config};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build a `FleetConfig` from the config file, profile, and CLI overrides.
///
/// Flags win over the profile. Without a profile, flags alone must name a
/// token; the directory URL and customer fall back to their defaults.
pub fn build_fleet_config(global: &GlobalOpts) -> Result<FleetConfig, CliError> {
    let cfg = fleetdesk_config::load_config()?;
    let name = active_profile_name(global, &cfg);

    let (mut profile, from_file) = match cfg.profiles.get(&name) {
        Some(profile) => (profile.clone(), true),
        None if global.token.is_some() => (Profile::default(), false),
        None if global.profile.is_some() => {
            return Err(fleetdesk_config::ConfigError::ProfileNotFound { name }.into());
        }
        None => return Err(CliError::NoCredentials { profile: name }),
    };

    if let Some(url) = &global.directory_url {
        profile.directory_url.clone_from(url);
    }
    if let Some(customer) = &global.customer {
        profile.customer.clone_from(customer);
    }
    if let Some(dir) = &global.cache_dir {
        profile.cache_dir = Some(dir.clone());
    }

    let token = match &global.token {
        Some(token) => SecretString::from(token.clone()),
        None => fleetdesk_config::resolve_token(&profile, &name)?,
    };
    let timeout = global.timeout.unwrap_or(cfg.defaults.timeout);

    tracing::debug!(profile = %name, from_file, "resolved fleet configuration");
    Ok(fleetdesk_config::profile_to_fleet_config(
        &profile, &name, token, timeout,
    )?)
}
