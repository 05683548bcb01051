//! Command handlers, one module per top-level subcommand.

pub mod batch;
pub mod config_cmd;
pub mod devices;
pub mod search;
pub mod sync;
pub mod tree;
pub mod users;
pub mod util;

use fleetdesk_core::DirectoryFleet;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Route a fleet-backed command to its handler.
pub async fn dispatch(
    cmd: Command,
    fleet: &DirectoryFleet,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Sync(args) => sync::handle(args, fleet, global).await,
        Command::Devices(args) => devices::handle(args, fleet, global),
        Command::Users(args) => users::handle(args, fleet, global).await,
        Command::Search(args) => search::handle(args, fleet, global).await,
        Command::Tree(args) => tree::handle(&args, fleet, global),
        Command::Batch(args) => batch::handle(args, fleet, global).await,
        Command::Config(_) | Command::Completions(_) => Err(CliError::Validation {
            field: "command".into(),
            reason: "does not need a directory connection".into(),
        }),
    }
}
