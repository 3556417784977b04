//! # Depth Sandbox CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载、覆盖与验证
//! - 传感器生命周期泄漏检查会话
//! - 设备与流配置枚举
//! - 优雅关闭处理

mod cli;
mod commands;
mod console;
mod error;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use cli::{Cli, Commands, RunArgs};
use commands::{run_profiles, run_session, run_validate};

/// 退出时等待阻塞任务（如仍在读 stdin 的提示）的上限
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(run());
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    code
}

async fn run() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let metrics_port = match &cli.command {
        Some(Commands::Run(args)) => args.metrics_port,
        _ => None,
    };
    if let Err(e) = observability::init_with_config(observability::ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port,
        default_log_level: log_level(&cli).to_string(),
        force_level: cli.quiet,
    }) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Depth Sandbox CLI starting"
    );

    let result = match &cli.command {
        Some(Commands::Run(args)) => run_session(args).await,
        Some(Commands::Profiles(args)) => run_profiles(args),
        Some(Commands::Validate(args)) => run_validate(args),
        None => run_session(&RunArgs::default()).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Log level derived from -q / -v
fn log_level(cli: &Cli) -> &'static str {
    if cli.quiet {
        return "error";
    }
    match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}
