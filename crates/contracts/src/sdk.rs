//! Camera SDK abstraction
//!
//! Object-safe traits for the parts of the vendor SDK the sandbox drives:
//! device enumeration, sensor lifecycle and frame synchronization.
//!
//! All calls are blocking, exactly like the vendor library. Callers that run on an
//! async runtime are expected to move them onto a blocking pool.
//!
//! # Sensor state machine
//!
//! ```text
//! Closed --open--> Opened --start--> Streaming
//!    ^               |  ^                |
//!    +-----close-----+  +------stop------+
//! ```
//!
//! Any other transition fails with [`SdkError::WrongCallSequence`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{SdkResult, StreamKind, StreamProfile};

/// Shared sensor handle
pub type SensorHandle = Arc<dyn Sensor>;

/// Shared device handle
pub type DeviceHandle = Arc<dyn Device>;

/// Shared synchronizer handle
pub type SynchronizerHandle = Arc<dyn FrameSynchronizer>;

/// Sensor capability tag used to resolve a sensor from a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Color,
    Depth,
    Motion,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Color => f.write_str("color"),
            Self::Depth => f.write_str("depth"),
            Self::Motion => f.write_str("motion"),
        }
    }
}

/// One frame delivered by a streaming sensor
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub stream_kind: StreamKind,
    /// Per-stream frame counter
    pub frame_number: u64,
    /// Device timestamp in milliseconds
    pub timestamp_ms: f64,
    /// Payload size in bytes (content is not retained)
    pub byte_len: usize,
}

/// Time-aligned set of frames produced by a synchronizer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSet {
    pub frames: Vec<Frame>,
}

impl FrameSet {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// First frame of the given stream, if present
    pub fn frame(&self, kind: StreamKind) -> Option<&Frame> {
        self.frames.iter().find(|f| f.stream_kind == kind)
    }
}

/// Aggregates frames of one device's sensors into time-aligned sets
pub trait FrameSynchronizer: Send + Sync {
    /// Deliver a frame. Called by streaming sensors from their own threads.
    fn push_frame(&self, frame: Frame);

    /// Non-blocking poll for the next ready frame set
    fn poll_for_frames(&self) -> Option<FrameSet>;

    /// Block until a frame set is ready or `timeout` expires
    ///
    /// # Errors
    /// [`SdkError::Timeout`](crate::SdkError::Timeout) when nothing arrived in time.
    fn wait_for_frames(&self, timeout: Duration) -> SdkResult<FrameSet>;
}

/// A physical sensor of a device
pub trait Sensor: Send + Sync {
    /// Human readable sensor name (e.g. "RGB Camera")
    fn name(&self) -> &str;

    /// Capability tag
    fn kind(&self) -> SensorKind;

    /// Every profile the sensor advertises, in SDK enumeration order
    fn stream_profiles(&self) -> SdkResult<Vec<StreamProfile>>;

    /// Reserve the sensor for the given profile
    fn open(&self, profile: &StreamProfile) -> SdkResult<()>;

    /// Start streaming into `synchronizer`
    fn start(&self, synchronizer: SynchronizerHandle) -> SdkResult<()>;

    /// Stop streaming
    fn stop(&self) -> SdkResult<()>;

    /// Release the sensor
    fn close(&self) -> SdkResult<()>;
}

/// A device discovered by the SDK context
pub trait Device: Send + Sync {
    /// Whether the underlying handle still refers to a live device
    fn is_valid(&self) -> bool;

    fn name(&self) -> &str;

    fn serial_number(&self) -> &str;

    /// All sensors of the device
    fn sensors(&self) -> Vec<SensorHandle>;

    /// First sensor with the given capability
    fn first_sensor(&self, kind: SensorKind) -> Option<SensorHandle> {
        self.sensors().into_iter().find(|s| s.kind() == kind)
    }
}

/// SDK entry point
pub trait DeviceContext: Send + Sync {
    /// Library version string
    fn api_version(&self) -> String;

    /// Enumerate connected devices
    fn query_devices(&self) -> SdkResult<Vec<DeviceHandle>>;

    /// Construct a fresh, empty frame synchronizer
    fn create_synchronizer(&self) -> SynchronizerHandle;
}
