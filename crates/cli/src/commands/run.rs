//! `run` command implementation.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use config_loader::ConfigLoader;
use contracts::SandboxConfig;
use fleet::{LeakCheckSession, MockContext};

use crate::cli::RunArgs;
use crate::console::StdConsole;
use crate::error::CliError;

/// Execute the `run` command (also the default without subcommand)
pub async fn run_session(args: &RunArgs) -> Result<()> {
    let config = resolve_config(args)?;

    info!(
        mode = ?config.mode,
        loops = config.loop_count,
        devices = config.simulation.device_count,
        policy = ?config.failure_policy,
        color = %config.color,
        depth = %config.depth,
        "Configuration resolved"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, closing devices");
        let _ = shutdown_tx.send(true);
    });

    let context = Arc::new(MockContext::from_simulation(&config.simulation));
    let console = Arc::new(StdConsole::stdio());
    let session = LeakCheckSession::new(context, console, config).with_shutdown(shutdown_rx);

    let stats = session.run_to_exit().await.map_err(CliError::from)?;

    info!(
        cycles = stats.cycles_completed,
        quit_early = stats.quit_early,
        open_failures = stats.open_failures,
        capture_failures = stats.capture_failures,
        close_failures = stats.close_failures,
        tolerated_errors = stats.tolerated_errors,
        "Session completed"
    );

    if args.stats_json {
        let json = serde_json::to_string_pretty(&stats).context("Failed to serialize session stats")?;
        println!("{json}");
    }

    Ok(())
}

/// Load the configuration file (if any), apply CLI overrides, validate
fn resolve_config(args: &RunArgs) -> Result<SandboxConfig, CliError> {
    let mut config = match &args.config {
        Some(path) if !path.exists() => {
            return Err(CliError::config_not_found(path.display().to_string()));
        }
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            ConfigLoader::load_from_path(path)?
        }
        None => SandboxConfig::default(),
    };

    if let Some(loops) = args.loops {
        config.loop_count = loops;
    }
    if let Some(devices) = args.devices {
        config.simulation.device_count = devices;
    }
    if let Some(policy) = args.policy {
        config.failure_policy = policy.into();
    }
    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }
    if let Some(settle_ms) = args.settle_ms {
        config.settle_delay_ms = settle_ms;
    }
    if args.capture {
        config.capture_in_single_mode = true;
    }
    if args.no_pause {
        config.pause_between_cycles = false;
    }

    ConfigLoader::validate(&config)?;
    Ok(config)
}

/// Ctrl+C / SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::cli::{ModeArg, PolicyArg};
    use contracts::{FailurePolicy, SessionMode};

    #[test]
    fn test_defaults_without_config() {
        let config = resolve_config(&RunArgs::default()).unwrap();
        assert_eq!(config, SandboxConfig::default());
    }

    #[test]
    fn test_overrides_apply_on_top_of_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "loop_count = 7\nsettle_delay_ms = 100").unwrap();

        let args = RunArgs {
            config: Some(file.path().to_path_buf()),
            devices: Some(3),
            policy: Some(PolicyArg::Strict),
            mode: Some(ModeArg::Single),
            no_pause: true,
            ..Default::default()
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.loop_count, 7);
        assert_eq!(config.settle_delay_ms, 100);
        assert_eq!(config.simulation.device_count, 3);
        assert_eq!(config.failure_policy, FailurePolicy::Strict);
        assert_eq!(config.mode, SessionMode::Single);
        assert!(!config.pause_between_cycles);
    }

    #[test]
    fn test_missing_config_file() {
        let args = RunArgs {
            config: Some("definitely/not/here.toml".into()),
            ..Default::default()
        };
        assert!(matches!(
            resolve_config(&args),
            Err(CliError::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_overrides_are_validated() {
        let args = RunArgs {
            loops: Some(0),
            ..Default::default()
        };
        assert!(matches!(resolve_config(&args), Err(CliError::Config(_))));
    }
}
