//! Clap derive structures for the `qualisync` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// qualisync -- inspect and refresh the QMS data layer
#[derive(Debug, Parser)]
#[command(
    name = "qualisync",
    version,
    about = "Mirror a quality-management backend from the command line",
    long_about = "Operational CLI for the qualisync data layer.\n\n\
        Loads all mirrored collections in four priority waves, follows the\n\
        realtime change feed, and evaluates dashboard KPI metrics.",
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
    /// Backend profile to use
    #[arg(long, short = 'p', env = "QUALISYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend base URL (overrides profile)
    #[arg(long, short = 'b', env = "QUALISYNC_BACKEND", global = true)]
    pub backend: Option<String>,

    /// Project anon key
    #[arg(long, env = "QUALISYNC_ANON_KEY", global = true, hide_env = true)]
    pub anon_key: Option<String>,

    /// Session access token
    #[arg(long, env = "QUALISYNC_ACCESS_TOKEN", global = true, hide_env = true)]
    pub access_token: Option<String>,

    /// Actor name attached to audit-trail appends
    #[arg(long, env = "QUALISYNC_ACTOR", global = true)]
    pub actor: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "QUALISYNC_OUTPUT",
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

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "QUALISYNC_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "QUALISYNC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
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
    /// Run the staged load and show per-collection status
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Re-fetch a single collection
    Refresh(RefreshArgs),

    /// Follow the change feed, printing events as they arrive
    Watch(WatchArgs),

    /// Evaluate dashboard KPI metrics
    Metric(MetricArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Per-command arguments ────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Only show collections that failed to load
    #[arg(long)]
    pub failed: bool,
}

#[derive(Debug, Args)]
pub struct RefreshArgs {
    /// Collection name (snake_case, e.g. quality_costs)
    pub collection: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Exit after this many events
    #[arg(long, short = 'n')]
    pub count: Option<u64>,
}

#[derive(Debug, Args)]
pub struct MetricArgs {
    /// Metric identifier (snake_case, e.g. quarantine_count)
    #[arg(required_unless_present = "all")]
    pub metric: Option<String>,

    /// Evaluate every metric
    #[arg(long, conflicts_with = "metric")]
    pub all: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create an initial config file with a sample profile
    Init,

    /// Display the resolved configuration
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn metric_requires_an_identifier_or_all() {
        assert!(Cli::try_parse_from(["qualisync", "metric"]).is_err());
        assert!(Cli::try_parse_from(["qualisync", "metric", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["qualisync", "metric", "quarantine_count"]).is_ok());
    }
}
