//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Event Listener - asynchronous dispatch of monitoring events to handlers
#[derive(Parser, Debug)]
#[command(
    name = "event-listener",
    author,
    version,
    about = "Asynchronous event dispatch for monitoring loops",
    long_about = "Feeds timestamped measurement payloads to the configured handlers.\n\n\
                  Every handler gets its own bounded queue and worker, so a slow or \n\
                  failing consumer never stalls the producer. Failed deliveries are retried."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "EVENT_LISTENER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "EVENT_LISTENER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispatch payloads to the configured handlers
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "listener.toml",
        env = "EVENT_LISTENER_CONFIG"
    )]
    pub config: PathBuf,

    /// Newline-delimited JSON payloads (defaults to stdin)
    #[arg(short, long, env = "EVENT_LISTENER_INPUT")]
    pub input: Option<PathBuf>,

    /// Stop reading input after this many seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "EVENT_LISTENER_TIMEOUT")]
    pub timeout: u64,

    /// Upper bound in seconds for draining and joining the engines on shutdown
    #[arg(long, default_value = "30", env = "EVENT_LISTENER_SHUTDOWN_TIMEOUT")]
    pub shutdown_timeout: u64,

    /// Validate configuration and exit without dispatching
    #[arg(long)]
    pub dry_run: bool,

    /// Channel buffer size between the input reader and the dispatcher
    #[arg(long, default_value = "100", env = "EVENT_LISTENER_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "EVENT_LISTENER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "listener.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "listener.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show handler parameters
    #[arg(long)]
    pub params: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
