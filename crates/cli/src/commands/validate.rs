//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use config_loader::ConfigLoader;
use contracts::{SandboxConfig, SessionMode};

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    mode: SessionMode,
    loop_count: u32,
    device_count: u32,
    color: String,
    depth: String,
    frame_capture_count: u32,
    frame_timeout_ms: u64,
    failure_policy: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    mode: config.mode,
                    loop_count: config.loop_count,
                    device_count: config.simulation.device_count,
                    color: config.color.to_string(),
                    depth: config.depth.to_string(),
                    frame_capture_count: config.frame_capture_count,
                    frame_timeout_ms: config.frame_timeout_ms,
                    failure_policy: format!("{:?}", config.failure_policy).to_lowercase(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &SandboxConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.settle_delay_ms == 0 && config.mode == SessionMode::Fleet {
        warnings.push(
            "settle_delay_ms is 0 - the first capture may time out while streams warm up"
                .to_string(),
        );
    }

    for request in [&config.color, &config.depth] {
        let frame_interval_ms = 1000 / u64::from(request.frame_rate.max(1));
        if config.frame_timeout_ms < frame_interval_ms {
            warnings.push(format!(
                "frame_timeout_ms ({}) is shorter than one {} frame interval ({}ms)",
                config.frame_timeout_ms, request.stream_kind, frame_interval_ms
            ));
        }
    }

    if config.capture_in_single_mode && config.mode == SessionMode::Fleet {
        warnings.push("capture_in_single_mode has no effect in fleet mode".to_string());
    }

    if !config.pause_between_cycles {
        warnings.push(
            "pause_between_cycles is false - there is no window to inspect process memory"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("Configuration is valid: {}", result.config_path);
    } else {
        println!("Configuration is INVALID: {}", result.config_path);
    }

    if let Some(error) = &result.error {
        println!("  Error: {error}");
    }

    if let Some(summary) = &result.summary {
        println!();
        println!("Summary:");
        println!("  Mode:           {:?}", summary.mode);
        println!("  Loops:          {}", summary.loop_count);
        println!("  Devices:        {}", summary.device_count);
        println!("  Color:          {}", summary.color);
        println!("  Depth:          {}", summary.depth);
        println!(
            "  Capture:        {} frame sets, {}ms timeout",
            summary.frame_capture_count, summary.frame_timeout_ms
        );
        println!("  Failure policy: {}", summary.failure_policy);
    }

    if let Some(warnings) = &result.warnings {
        println!();
        println!("Warnings:");
        for warning in warnings {
            println!("  - {warning}");
        }
    }
}
