//! 模拟相机 SDK
//!
//! 无硬件时用于开发、演示和测试。

mod context;
mod device;
mod event_log;
mod sensor;
mod synchronizer;

pub use context::{MockConfig, MockContext, MOCK_API_VERSION};
pub use device::{MockDevice, MockDeviceConfig};
pub use event_log::{CallPhase, EventLog, LifecycleEvent};
pub use sensor::{MockSensor, MockSensorConfig, SensorState};
pub use synchronizer::{MockSynchronizer, DEFAULT_QUEUE_CAPACITY};
