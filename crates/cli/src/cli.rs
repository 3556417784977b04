//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use contracts::{FailurePolicy, SessionMode};
use std::path::PathBuf;

/// Depth Sandbox - sensor lifecycle leak-check harness for depth cameras
#[derive(Parser, Debug)]
#[command(
    name = "depth-sandbox",
    author,
    version,
    about = "Depth-camera sensor lifecycle leak-check harness",
    long_about = "Repeatedly opens, starts, captures from, stops and closes the color and \n\
                  depth sensors of every connected camera, pausing between cycles so \n\
                  process memory can be inspected for leaks.\n\n\
                  Without a subcommand the fleet loop runs with built-in defaults."
)]
pub struct Cli {
    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "DEPTH_SANDBOX_VERBOSE")]
    pub verbose: u8,

    /// Suppress all log output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "compact",
        global = true,
        env = "DEPTH_SANDBOX_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the leak-check session
    Run(RunArgs),

    /// List devices, sensors and advertised stream profiles
    Profiles(ProfilesArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); built-in defaults when omitted
    #[arg(short, long, env = "DEPTH_SANDBOX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the number of lifecycle cycles
    #[arg(long, env = "DEPTH_SANDBOX_LOOPS")]
    pub loops: Option<u32>,

    /// Override the number of simulated cameras
    #[arg(long, env = "DEPTH_SANDBOX_DEVICES")]
    pub devices: Option<u32>,

    /// Override how stop/close/capture failures are judged
    #[arg(long, value_enum, env = "DEPTH_SANDBOX_POLICY")]
    pub policy: Option<PolicyArg>,

    /// Override the harness mode
    #[arg(long, value_enum, env = "DEPTH_SANDBOX_MODE")]
    pub mode: Option<ModeArg>,

    /// Capture frames in single-device mode
    #[arg(long)]
    pub capture: bool,

    /// Override the delay after open+start (milliseconds)
    #[arg(long, env = "DEPTH_SANDBOX_SETTLE_MS")]
    pub settle_ms: Option<u64>,

    /// Do not wait for operator input between cycles
    #[arg(long)]
    pub no_pause: bool,

    /// Print session statistics as JSON when done
    #[arg(long)]
    pub stats_json: bool,

    /// Prometheus metrics port (disabled when omitted)
    #[arg(long, env = "DEPTH_SANDBOX_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Arguments for the `profiles` command
#[derive(Args, Debug)]
pub struct ProfilesArgs {
    /// Number of simulated cameras to enumerate
    #[arg(long, default_value = "1", env = "DEPTH_SANDBOX_DEVICES")]
    pub devices: u32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `validate` command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "sandbox.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    #[default]
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

/// `--policy` values
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyArg {
    /// Log out-of-sequence stop/close errors and carry on
    Tolerant,
    /// Treat them, and capture/close failures, as fatal
    Strict,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::Tolerant => Self::Tolerant,
            PolicyArg::Strict => Self::Strict,
        }
    }
}

/// `--mode` values
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    /// Every camera concurrently, with frame capture
    Fleet,
    /// First camera only, sequential lifecycle
    Single,
}

impl From<ModeArg> for SessionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Fleet => Self::Fleet,
            ModeArg::Single => Self::Single,
        }
    }
}
