//! Fleet error types

use contracts::{
    ContractError, DeviceResult, LifecycleStage, SdkError, SensorKind, StreamProfileRequest,
};
use thiserror::Error;

use crate::coordinator::SensorOp;

/// Failure of one device inside a stage
///
/// Never escapes a device task: it is converted into a failed `DeviceResult`
/// at the task boundary.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    /// Device handle no longer refers to a live device
    #[error("device handle invalid")]
    InvalidDevice,

    /// Color and/or depth sensor could not be resolved
    #[error("sensor(s) invalid: missing {}", sensor_list(.missing))]
    MissingSensors { missing: Vec<SensorKind> },

    /// No advertised profile matched the request
    #[error("{sensor} stream profile not found: {request}")]
    ProfileNotFound {
        sensor: SensorKind,
        request: StreamProfileRequest,
    },

    /// Lifecycle call on a sensor failed
    #[error("unable to {operation} {sensor} sensor: {source}")]
    Sensor {
        sensor: SensorKind,
        operation: SensorOp,
        #[source]
        source: SdkError,
    },

    /// Bounded frame wait failed
    #[error("capture #{capture} failed: {source}")]
    Capture {
        capture: u32,
        #[source]
        source: SdkError,
    },

    /// Any other SDK error (e.g. profile enumeration)
    #[error("threw error: {0}")]
    Sdk(#[from] SdkError),

    /// Worker panicked or was cancelled
    #[error("task aborted: {message}")]
    TaskAborted { message: String },
}

impl DeviceError {
    pub fn sensor(sensor: SensorKind, operation: SensorOp, source: SdkError) -> Self {
        Self::Sensor {
            sensor,
            operation,
            source,
        }
    }
}

/// Fleet-level error, aborts the session
#[derive(Debug, Error)]
pub enum FleetError {
    /// Enumeration returned no device
    #[error("no devices found")]
    NoDevices,

    /// Device enumeration itself failed
    #[error("device enumeration failed: {0}")]
    Enumeration(#[source] SdkError),

    /// At least one device failed to open; successful devices were rolled back
    #[error("opening failed for device(s) {failed:?}", failed = failed_indices(.results))]
    OpenFailed { results: Vec<DeviceResult> },

    /// Strict policy: a later stage reported failures
    #[error("{stage} stage failed for device(s) {failed:?}", failed = failed_indices(.results))]
    StageFailed {
        stage: LifecycleStage,
        results: Vec<DeviceResult>,
    },

    /// A single device could not be driven
    #[error("device {index} {source}")]
    Device {
        index: u32,
        #[source]
        source: DeviceError,
    },

    /// Shutdown requested; open streams were closed first
    #[error("interrupted by shutdown request")]
    Interrupted,

    /// Wrapped ContractError
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl FleetError {
    /// Per-device results carried by the error, if any
    pub fn results(&self) -> &[DeviceResult] {
        match self {
            Self::OpenFailed { results } | Self::StageFailed { results, .. } => results,
            _ => &[],
        }
    }
}

fn sensor_list(kinds: &[SensorKind]) -> String {
    kinds
        .iter()
        .map(SensorKind::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn failed_indices(results: &[DeviceResult]) -> Vec<u32> {
    results
        .iter()
        .filter(|r| !r.is_success())
        .map(|r| r.device_index)
        .collect()
}

/// Result alias
pub type Result<T> = std::result::Result<T, FleetError>;
