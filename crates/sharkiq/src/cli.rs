//! Clap derive structures for the `sharkiq` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// sharkiq -- command-line control for SharkIQ robot vacuums
#[derive(Debug, Parser)]
#[command(
    name = "sharkiq",
    version,
    about = "Sign in to SharkIQ and manage your robot vacuums",
    long_about = "Signs in through the SharkNinja identity broker, exchanges the\n\
        identity token with the Ayla device cloud, and lists or controls the\n\
        devices on your account.",
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
    /// Account profile to use
    #[arg(long, short = 'p', env = "SHARKIQ_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Account region (overrides profile): north_america, europe
    #[arg(long, short = 'r', env = "SHARKIQ_REGION", global = true)]
    pub region: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SHARKIQ_OUTPUT",
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

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "SHARKIQ_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
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
    /// Sign in and store the refresh token
    Login(LoginArgs),

    /// List and control devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Sync periodically and print each outcome
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Login ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Sign in on another device with a one-time code instead of a password
    #[arg(long)]
    pub device_code: bool,

    /// Forget the stored refresh token and sign in with the password
    #[arg(long)]
    pub fresh: bool,
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List devices on the account
    #[command(alias = "ls")]
    List,

    /// Show one device and its properties
    Get {
        /// Device serial number (DSN)
        serial: String,
    },

    /// Write a device property
    Set {
        /// Device serial number (DSN)
        serial: String,

        /// Property name, e.g. SET_Operating_Mode
        property: String,

        /// Value; parsed as JSON when possible, else sent as a string
        value: String,
    },
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Seconds between syncs (overrides profile)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,

    /// Stop after this many sync outcomes
    #[arg(long, short = 'n')]
    pub count: Option<u32>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or update a profile interactively
    Init,

    /// Show the current configuration with secrets masked
    Show,

    /// List profile names
    Profiles,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}
