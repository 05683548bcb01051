//! Config subcommand handlers.

use std::fmt::Write as _;

use dialoguer::{Input, Password, Select};

use fleetdesk_config::Profile;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::util::prompt_err;

/// Format config for display, masking secrets.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(default) = &cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    for (name, p) in &cfg.profiles {
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "directory_url = \"{}\"", p.directory_url);
        let _ = writeln!(out, "customer = \"{}\"", p.customer);
        if p.token.is_some() {
            let _ = writeln!(out, "token = \"****\"");
        }
        if let Some(env) = &p.token_env {
            let _ = writeln!(out, "token_env = \"{env}\"");
        }
        if let Some(ca) = &p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(dir) = &p.cache_dir {
            let _ = writeln!(out, "cache_dir = \"{}\"", dir.display());
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
    }

    out
}

fn prompt_token() -> Result<String, CliError> {
    let token = Password::new()
        .with_prompt("Directory token")
        .interact()
        .map_err(prompt_err)?;
    if token.trim().is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "token cannot be empty".into(),
        });
    }
    Ok(token)
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => {
            let config_path = config::config_path();
            eprintln!("fleetdesk configuration");
            eprintln!("   Config path: {}\n", config_path.display());

            let defaults = Profile::default();
            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default("default".into())
                .interact_text()
                .map_err(prompt_err)?;
            let directory_url: String = Input::new()
                .with_prompt("Directory URL")
                .default(defaults.directory_url.clone())
                .interact_text()
                .map_err(prompt_err)?;
            let customer: String = Input::new()
                .with_prompt("Customer id")
                .default(defaults.customer.clone())
                .interact_text()
                .map_err(prompt_err)?;

            let token = prompt_token()?;
            let choices = &[
                "Store in system keyring (recommended)",
                "Save to config file (plaintext)",
            ];
            let selection = Select::new()
                .with_prompt("Where to store the token?")
                .items(choices)
                .default(0)
                .interact()
                .map_err(prompt_err)?;
            let plaintext = if selection == 0 {
                fleetdesk_config::store_token(&profile_name, &token)?;
                eprintln!("   token stored in system keyring");
                None
            } else {
                Some(token)
            };

            let mut cfg = config::load_config_or_default();
            cfg.profiles.insert(
                profile_name.clone(),
                Profile {
                    directory_url,
                    customer,
                    token: plaintext,
                    ..defaults
                },
            );
            if cfg.profiles.len() == 1 || cfg.default_profile.is_none() {
                cfg.default_profile = Some(profile_name.clone());
            }
            config::save_config(&cfg)?;
            eprintln!("\nProfile '{profile_name}' saved. Next: fleetdesk sync devices");
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            output::print_output(format_config_redacted(&cfg).trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load_config_or_default();
            let active = config::active_profile_name(global, &cfg);
            let lines: Vec<String> = cfg
                .profiles
                .keys()
                .map(|name| {
                    let marker = if *name == active { "*" } else { " " };
                    format!("{marker} {name}")
                })
                .collect();
            output::print_output(&lines.join("\n"), global.quiet);
            Ok(())
        }

        ConfigCommand::Use { name } => {
            let mut cfg = config::load_config_or_default();
            if !cfg.profiles.contains_key(&name) {
                return Err(fleetdesk_config::ConfigError::ProfileNotFound { name }.into());
            }
            cfg.default_profile = Some(name.clone());
            config::save_config(&cfg)?;
            eprintln!("Default profile set to '{name}'");
            Ok(())
        }

        ConfigCommand::SetToken => {
            let cfg = config::load_config_or_default();
            let name = config::active_profile_name(global, &cfg);
            let token = prompt_token()?;
            fleetdesk_config::store_token(&name, &token)?;
            eprintln!("Token for '{name}' stored in system keyring");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacted_output_masks_token() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "district".into(),
            Profile {
                token: Some("secret-token".into()),
                ..Profile::default()
            },
        );
        let text = format_config_redacted(&cfg);
        assert!(text.contains("[profiles.district]"));
        assert!(text.contains("token = \"****\""));
        assert!(!text.contains("secret-token"));
    }
}
