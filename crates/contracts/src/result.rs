//! Per-device stage results
//!
//! Every coordinator stage produces one `DeviceResult` per device. The fleet
//! status is the bitwise-OR of the per-device statuses: a single failure makes
//! the whole stage fail.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Lifecycle stage of one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Open,
    Capture,
    Close,
}

impl LifecycleStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Capture => "capture",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one stage for one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Success,
    Failure,
}

impl DeviceStatus {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    pub fn is_failure(self) -> bool {
        self == Self::Failure
    }
}

impl BitOr for DeviceStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        if self.is_failure() || rhs.is_failure() {
            Self::Failure
        } else {
            Self::Success
        }
    }
}

impl BitOrAssign for DeviceStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

/// Result of a stage for a single device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceResult {
    /// Index of the device in the enumeration of this cycle
    pub device_index: u32,
    pub status: DeviceStatus,
    /// Reasons collected along the way; may be non-empty on success when
    /// tolerated errors were swallowed
    pub errors: Vec<String>,
}

impl DeviceResult {
    pub fn success(device_index: u32) -> Self {
        Self {
            device_index,
            status: DeviceStatus::Success,
            errors: Vec::new(),
        }
    }

    pub fn failure(device_index: u32, error: impl Into<String>) -> Self {
        Self {
            device_index,
            status: DeviceStatus::Failure,
            errors: vec![error.into()],
        }
    }

    /// Record an error without changing the status
    pub fn note(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Record an error and mark the device as failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = DeviceStatus::Failure;
        self.errors.push(error.into());
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// OR together all statuses (empty input is a success)
pub fn aggregate_status<'a>(results: impl IntoIterator<Item = &'a DeviceResult>) -> DeviceStatus {
    results
        .into_iter()
        .fold(DeviceStatus::Success, |acc, r| acc | r.status)
}
