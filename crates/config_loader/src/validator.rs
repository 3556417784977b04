//! 配置校验模块
//!
//! 校验规则：
//! - loop_count >= 1
//! - frame_capture_count >= 1
//! - frame_timeout_ms > 0
//! - 流请求的 fps / width / height 非零，stream_kind 与用途一致
//! - simulation.device_count >= 1

use contracts::{ContractError, SandboxConfig, StreamKind, StreamProfileRequest};

/// 校验 SandboxConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &SandboxConfig) -> Result<(), ContractError> {
    validate_counts(config)?;
    validate_stream("color", &config.color, StreamKind::Color)?;
    validate_stream("depth", &config.depth, StreamKind::Depth)?;
    validate_simulation(config)?;
    Ok(())
}

/// 校验循环与采集参数
fn validate_counts(config: &SandboxConfig) -> Result<(), ContractError> {
    if config.loop_count == 0 {
        return Err(ContractError::config_validation(
            "loop_count",
            "loop_count must be >= 1",
        ));
    }
    if config.frame_capture_count == 0 {
        return Err(ContractError::config_validation(
            "frame_capture_count",
            "frame_capture_count must be >= 1",
        ));
    }
    if config.frame_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "frame_timeout_ms",
            "frame_timeout_ms must be > 0",
        ));
    }
    Ok(())
}

/// 校验单个流请求
fn validate_stream(
    field: &str,
    request: &StreamProfileRequest,
    expected: StreamKind,
) -> Result<(), ContractError> {
    if request.stream_kind != expected {
        return Err(ContractError::config_validation(
            format!("{field}.stream_kind"),
            format!("expected {expected}, got {}", request.stream_kind),
        ));
    }
    for (name, value) in [
        ("frame_rate", request.frame_rate),
        ("width", request.width),
        ("height", request.height),
    ] {
        if value == 0 {
            return Err(ContractError::config_validation(
                format!("{field}.{name}"),
                format!("{name} must be > 0"),
            ));
        }
    }
    Ok(())
}

/// 校验模拟 SDK 参数
fn validate_simulation(config: &SandboxConfig) -> Result<(), ContractError> {
    if config.simulation.device_count == 0 {
        return Err(ContractError::config_validation(
            "simulation.device_count",
            "device_count must be >= 1",
        ));
    }
    Ok(())
}
