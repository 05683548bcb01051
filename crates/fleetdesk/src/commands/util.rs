//! Shared helpers for command handlers.

use std::io::{self, BufRead, IsTerminal};
use std::path::Path;

use dialoguer::Confirm;

use fleetdesk_core::{CachedEntity, EntityFilter, parse_org_path};

use crate::cli::{GlobalOpts, ListArgs};
use crate::error::CliError;

/// Translate list flags into a cache filter.
pub fn list_filter<T: CachedEntity>(args: &ListArgs) -> Result<EntityFilter<T>, CliError> {
    let mut filters = Vec::new();
    if let Some(raw) = &args.org_unit {
        let path = parse_org_path(raw)?;
        filters.push(if args.subtree {
            EntityFilter::WithinOrgUnit(path)
        } else {
            EntityFilter::InOrgUnit(path)
        });
    }
    if let Some(term) = &args.filter {
        filters.push(EntityFilter::matching(term));
    }
    Ok(match filters.len() {
        0 => EntityFilter::All,
        _ => EntityFilter::AllOf(filters),
    })
}

pub fn apply_limit<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    if limit > 0 {
        items.truncate(limit);
    }
    items
}

/// Identifiers from positional args plus an optional file (`-` = stdin).
/// Blank lines and `#` comments are skipped.
pub fn read_identifiers(positional: &[String], file: Option<&Path>) -> Result<Vec<String>, CliError> {
    let mut ids: Vec<String> = positional.to_vec();
    if let Some(path) = file {
        let lines: Vec<String> = if path == Path::new("-") {
            io::stdin().lock().lines().collect::<Result<_, _>>()?
        } else {
            std::fs::read_to_string(path)?
                .lines()
                .map(str::to_owned)
                .collect()
        };
        ids.extend(lines);
    }
    let ids: Vec<String> = ids
        .into_iter()
        .map(|id| id.trim().to_owned())
        .filter(|id| !id.is_empty() && !id.starts_with('#'))
        .collect();
    if ids.is_empty() {
        return Err(CliError::Validation {
            field: "identifiers".into(),
            reason: "no serial numbers or asset tags given".into(),
        });
    }
    Ok(ids)
}

/// Ask before a destructive action. `--yes` skips the prompt; without a
/// terminal the action is refused.
pub fn confirm(action: &str, prompt: &str, global: &GlobalOpts) -> Result<(), CliError> {
    if global.yes {
        return Ok(());
    }
    if !io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(prompt_err)?;
    if confirmed { Ok(()) } else { Err(CliError::Aborted) }
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}
