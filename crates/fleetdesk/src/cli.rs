//! Clap derive structures for the `fleetdesk` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use fleetdesk_core::{DeviceLifecycle, EntityKind};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fleetdesk -- manage a school's loaned Chromebook fleet
#[derive(Debug, Parser)]
#[command(
    name = "fleetdesk",
    version,
    about = "Manage a school's loaned Chromebook fleet from the command line",
    long_about = "Keeps a local cache of devices, users, and org units in step with the\n\
        directory, and runs lending workflows (checkout, check-in, reset,\n\
        migration) across batches of devices.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration profile to use
    #[arg(long, short = 'p', env = "FLEETDESK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Directory base URL (overrides profile)
    #[arg(long, env = "FLEETDESK_DIRECTORY_URL", global = true)]
    pub directory_url: Option<String>,

    /// Directory customer id (overrides profile)
    #[arg(long, env = "FLEETDESK_CUSTOMER", global = true)]
    pub customer: Option<String>,

    /// Directory bearer token
    #[arg(long, env = "FLEETDESK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Local cache directory (overrides profile)
    #[arg(long, env = "FLEETDESK_CACHE_DIR", global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "FLEETDESK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Request timeout in seconds
    #[arg(long, env = "FLEETDESK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one identifier per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pull devices, users, or org units from the directory into the cache
    Sync(SyncArgs),

    /// Browse cached devices and record local lending steps
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Browse and update directory users
    #[command(alias = "u")]
    Users(UsersArgs),

    /// Search the cache, then the directory
    #[command(alias = "s")]
    Search(SearchArgs),

    /// Show the org unit hierarchy
    Tree(TreeArgs),

    /// Run a lending operation across many devices
    Batch(BatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared types ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Devices,
    Users,
    OrgUnits,
}

impl From<KindArg> for EntityKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Devices => EntityKind::Devices,
            KindArg::Users => EntityKind::Users,
            KindArg::OrgUnits => EntityKind::OrgUnits,
        }
    }
}

/// Cache filters shared by the list commands.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only entities in this org unit
    #[arg(long, short = 'u')]
    pub org_unit: Option<String>,

    /// With --org-unit, include every descendant unit
    #[arg(long, requires = "org_unit")]
    pub subtree: bool,

    /// Case-insensitive substring filter
    #[arg(long = "search", short = 's')]
    pub filter: Option<String>,

    /// Max rows to show (0 = all)
    #[arg(long, short = 'l', default_value = "0")]
    pub limit: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SYNC
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// What to sync
    #[arg(value_enum)]
    pub kind: KindArg,

    /// Limit the listing to one org unit and its descendants
    #[arg(long, short = 'u', conflicts_with = "ids")]
    pub org_unit: Option<String>,

    /// Re-fetch only these directory ids
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub ids: Vec<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List cached devices
    #[command(alias = "ls")]
    List(ListArgs),

    /// Show one device by serial number or asset tag
    Get {
        /// Serial number or asset tag
        identifier: String,
    },

    /// Record a lending step that never touches the directory
    Mark {
        /// Serial number or asset tag
        identifier: String,

        #[arg(value_enum)]
        step: LocalStep,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LocalStep {
    /// Waiting for the borrower's signed agreement
    RequestSignature,
    /// The borrower signed the agreement
    Sign,
    /// A wiped device is back in the pool
    ReturnToService,
}

impl From<LocalStep> for DeviceLifecycle {
    fn from(step: LocalStep) -> Self {
        match step {
            LocalStep::RequestSignature => DeviceLifecycle::RequestSignature,
            LocalStep::Sign => DeviceLifecycle::Sign,
            LocalStep::ReturnToService => DeviceLifecycle::ReturnToService,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  USERS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct UsersArgs {
    #[command(subcommand)]
    pub command: UsersCommand,
}

#[derive(Debug, Subcommand)]
pub enum UsersCommand {
    /// List cached users
    #[command(alias = "ls")]
    List(ListArgs),

    /// Suspend a user account
    Suspend {
        /// Email address or directory id
        user: String,

        /// Reason recorded in the directory
        #[arg(long)]
        reason: Option<String>,
    },

    /// Lift a suspension
    Unsuspend {
        /// Email address or directory id
        user: String,
    },

    /// Move a user to another org unit
    Move {
        /// Email address or directory id
        user: String,

        /// Target org unit path (e.g. /Students/Grade 6)
        #[arg(long)]
        to: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SEARCH / TREE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchKind {
    Devices,
    Users,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// What to search
    #[arg(value_enum)]
    pub kind: SearchKind,

    /// Serial, asset tag, email, name, ...
    pub term: String,

    /// Only show cached results; skip the directory lookup
    #[arg(long)]
    pub local: bool,
}

#[derive(Debug, Args)]
pub struct TreeArgs {
    /// Annotate each unit with subtree entity counts
    #[arg(long, value_enum)]
    pub counts: Option<CountKind>,

    /// Only show the subtree rooted at this path
    #[arg(long)]
    pub from: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CountKind {
    Devices,
    Users,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  BATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct BatchArgs {
    #[command(subcommand)]
    pub command: BatchCommand,
}

#[derive(Debug, Subcommand)]
pub enum BatchCommand {
    /// Lend devices to a borrower
    Checkout {
        /// Borrower, usually an email address
        #[arg(long, short = 'a')]
        assignee: String,

        #[command(flatten)]
        targets: BatchTargets,
    },

    /// Take devices back
    Checkin {
        #[command(flatten)]
        targets: BatchTargets,
    },

    /// Wipe all user data from devices (irreversible)
    Reset {
        #[command(flatten)]
        targets: BatchTargets,
    },

    /// Move devices to another org unit
    Migrate {
        /// Target org unit path
        #[arg(long)]
        to: String,

        #[command(flatten)]
        targets: BatchTargets,
    },
}

impl BatchCommand {
    pub fn targets(&self) -> &BatchTargets {
        match self {
            Self::Checkout { targets, .. }
            | Self::Checkin { targets }
            | Self::Reset { targets }
            | Self::Migrate { targets, .. } => targets,
        }
    }
}

#[derive(Debug, Args)]
pub struct BatchTargets {
    /// Serial numbers or asset tags
    pub identifiers: Vec<String>,

    /// Read identifiers from a file, one per line ('-' for stdin)
    #[arg(long, short = 'F')]
    pub from_file: Option<PathBuf>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create a profile with guided setup
    Init,

    /// Display the current configuration (secrets masked)
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a directory token in the system keyring (for --profile)
    SetToken,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
