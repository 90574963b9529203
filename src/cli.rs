use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::retry::BackoffKind;

#[derive(Parser)]
#[command(name = "user-dispatcher")]
#[command(about = "Forward users with matching emails from one HTTP endpoint to another", version)]
#[command(after_help = "EXAMPLES:
    user-dispatcher run --target-url https://webhook.site/abc
    API_B=https://webhook.site/abc user-dispatcher run --json
    user-dispatcher run --target-url http://localhost:8080/hook --max-attempts 5 --backoff exponential
    user-dispatcher init")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Print the run summary as JSON for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Log output format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Show debug logs and the full error chain on failure
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch users, filter them, and forward the matches
    #[command(after_help = "EXAMPLES:
    user-dispatcher run --target-url https://webhook.site/abc
    user-dispatcher run --suffix .org --retry-delay 1
    user-dispatcher run --deadline 60")]
    Run(RunArgs),
    /// Generate shell completions
    #[command(after_help = "EXAMPLES:
    user-dispatcher completions bash > ~/.bash_completion.d/user-dispatcher
    user-dispatcher completions zsh > ~/.zfunc/_user-dispatcher")]
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
    /// Initialize configuration file interactively
    #[command(after_help = "EXAMPLES:
    user-dispatcher init")]
    Init,
}

#[derive(Args, Clone, Default)]
pub struct RunArgs {
    /// URL to fetch the user list from
    #[arg(long, env = "API_A")]
    pub source_url: Option<String>,

    /// URL to POST matching users to
    #[arg(long, env = "API_B")]
    pub target_url: Option<String>,

    /// Total delivery attempts per user (default: 3)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// Seconds to wait between delivery attempts (default: 2)
    #[arg(long)]
    pub retry_delay: Option<u64>,

    /// How the wait grows between attempts (default: fixed)
    #[arg(long, value_enum)]
    pub backoff: Option<BackoffKind>,

    /// Per-request timeout in seconds (default: 10)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Cancel the whole run after this many seconds. Users not yet delivered
    /// are reported as failed and the exit status stays 0
    #[arg(long)]
    pub deadline: Option<u64>,

    /// Email suffix a user must have to be forwarded (default: .biz)
    #[arg(long)]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable multi-line events
    #[default]
    Pretty,
    /// Compact single lines
    Compact,
    /// JSON structured logs
    Json,
}
