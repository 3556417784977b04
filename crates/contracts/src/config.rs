//! SandboxConfig - Config Loader output
//!
//! Describes one leak-check session: which streams to request, how many cycles to
//! run, how many frames to capture per cycle and how failures are judged.
//! Every field has a default, so an empty file (or no file at all) yields the
//! built-in harness constants.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::StreamProfileRequest;

/// Number of open/capture/close cycles
pub const DEFAULT_LOOP_COUNT: u32 = 10;

/// Fresh frame sets awaited per device and cycle
pub const DEFAULT_FRAME_CAPTURE_COUNT: u32 = 4;

/// Bound of a single frame wait
pub const DEFAULT_FRAME_TIMEOUT_MS: u64 = 8000;

/// Pause after a device's sensors were started
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 5000;

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Which harness to run
    #[serde(default)]
    pub mode: SessionMode,

    /// Number of lifecycle cycles
    #[serde(default = "default_loop_count")]
    pub loop_count: u32,

    /// Frame sets to wait for per device and cycle
    #[serde(default = "default_frame_capture_count")]
    pub frame_capture_count: u32,

    /// Bound of each frame wait (milliseconds)
    #[serde(default = "default_frame_timeout_ms")]
    pub frame_timeout_ms: u64,

    /// Delay after open+start before the device is reported ready (milliseconds)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Capture frames in single-device mode
    #[serde(default)]
    pub capture_in_single_mode: bool,

    /// Wait for operator input between cycles
    #[serde(default = "default_true")]
    pub pause_between_cycles: bool,

    /// How stop/close/capture failures are judged
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Requested color stream
    #[serde(default = "StreamProfileRequest::default_color")]
    pub color: StreamProfileRequest,

    /// Requested depth stream
    #[serde(default = "StreamProfileRequest::default_depth")]
    pub depth: StreamProfileRequest,

    /// Simulated SDK settings
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl SandboxConfig {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::default(),
            loop_count: DEFAULT_LOOP_COUNT,
            frame_capture_count: DEFAULT_FRAME_CAPTURE_COUNT,
            frame_timeout_ms: DEFAULT_FRAME_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            capture_in_single_mode: false,
            pause_between_cycles: true,
            failure_policy: FailurePolicy::default(),
            color: StreamProfileRequest::default_color(),
            depth: StreamProfileRequest::default_depth(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Harness selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Every device concurrently, with frame capture
    #[default]
    Fleet,
    /// First device only, sequential lifecycle
    Single,
}

/// How non-open failures are judged
///
/// `Tolerant` keeps the historical harness behaviour: an out-of-sequence stop or
/// close is logged and ignored, and capture/close failures never change the exit
/// status. `Strict` counts both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Tolerant,
    Strict,
}

impl FailurePolicy {
    pub fn is_strict(self) -> bool {
        self == Self::Strict
    }
}

/// Simulated SDK settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of simulated cameras
    #[serde(default = "default_device_count")]
    pub device_count: u32,

    /// Interval between simulated frames (milliseconds). 0 = derive from the
    /// opened profile's frame rate.
    #[serde(default)]
    pub frame_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            device_count: default_device_count(),
            frame_interval_ms: 0,
        }
    }
}

fn default_loop_count() -> u32 {
    DEFAULT_LOOP_COUNT
}

fn default_frame_capture_count() -> u32 {
    DEFAULT_FRAME_CAPTURE_COUNT
}

fn default_frame_timeout_ms() -> u64 {
    DEFAULT_FRAME_TIMEOUT_MS
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

fn default_device_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}
