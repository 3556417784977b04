//! # Fleet
//!
//! Depth-camera sensor lifecycle coordination.
//!
//! Responsibilities:
//! - Select stream profiles from what a sensor advertises
//! - Open and start color + depth sensors on every device concurrently,
//!   rolling back the devices that succeeded when any device fails
//! - Drain stale frames and capture fresh synchronized frame sets
//! - Stop then close every sensor, tolerating out-of-sequence calls
//! - Drive the leak-check session loop (fleet and single-device variants)
//! - Provide a simulated SDK for development without hardware

pub mod capture;
pub mod close;
pub mod coordinator;
pub mod error;
pub mod mock;
pub mod open;
pub mod selector;
pub mod session;
pub mod single;

pub use contracts::{
    Console, DeviceContext, DeviceHandle, DeviceResult, DeviceStatus, SandboxConfig,
};
pub use coordinator::{DeviceStreams, FleetConfig, FleetCoordinator, OpenedFleet, SensorOp};
pub use error::{DeviceError, FleetError, Result};
pub use mock::{
    CallPhase, EventLog, LifecycleEvent, MockConfig, MockContext, MockDevice, MockDeviceConfig,
    MockSensor, MockSensorConfig, MockSynchronizer,
};
pub use selector::select_profile;
pub use session::{LeakCheckSession, SessionStats};
pub use single::SingleDeviceSession;
