//! 模拟 SDK 上下文
//!
//! 用于开发和测试的 `DeviceContext` 实现，支持注入失败场景，
//! 并记录所有传感器调用。

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use contracts::{
    DeviceContext, DeviceHandle, SdkError, SdkResult, SimulationConfig, SynchronizerHandle,
};
use tracing::{debug, instrument};

use super::device::{MockDevice, MockDeviceConfig};
use super::event_log::EventLog;
use super::synchronizer::MockSynchronizer;

/// 模拟 SDK 版本
pub const MOCK_API_VERSION: &str = "2.54.2 (simulated)";

/// 模拟上下文配置
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// 枚举到的设备（按顺序）
    pub devices: Vec<MockDeviceConfig>,
    /// 设备枚举是否失败
    pub fail_query: bool,
    /// 是否记录传感器调用事件
    pub record_events: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            fail_query: false,
            record_events: true,
        }
    }
}

impl MockConfig {
    /// N 台 D435
    pub fn with_devices(count: u32) -> Self {
        Self {
            devices: (0..count).map(MockDeviceConfig::d435).collect(),
            ..Default::default()
        }
    }

    /// 为所有传感器设置固定出帧间隔
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        for device in &mut self.devices {
            for sensor in [&mut device.color, &mut device.depth].into_iter().flatten() {
                sensor.frame_interval = Some(interval);
            }
        }
        self
    }
}

/// 模拟 SDK 上下文
pub struct MockContext {
    devices: Vec<Arc<MockDevice>>,
    fail_query: bool,
    log: Arc<EventLog>,
    /// 已创建的同步器（弱引用，用于泄漏检查）
    synchronizers: Mutex<Vec<Weak<MockSynchronizer>>>,
}

impl MockContext {
    pub fn new(config: MockConfig) -> Self {
        let log = Arc::new(if config.record_events {
            EventLog::new()
        } else {
            EventLog::disabled()
        });
        let devices = config
            .devices
            .into_iter()
            .zip(0u32..)
            .map(|(device, index)| Arc::new(MockDevice::new(index, device, &log)))
            .collect();

        Self {
            devices,
            fail_query: config.fail_query,
            log,
            synchronizers: Mutex::new(Vec::new()),
        }
    }

    /// 根据运行配置构造
    ///
    /// 不记录调用事件，多轮循环之间模拟后端的内存占用保持不变。
    pub fn from_simulation(config: &SimulationConfig) -> Self {
        let mut mock = MockConfig {
            record_events: false,
            ..MockConfig::with_devices(config.device_count)
        };
        if config.frame_interval_ms > 0 {
            mock = mock.with_frame_interval(Duration::from_millis(config.frame_interval_ms));
        }
        Self::new(mock)
    }

    pub fn mock_devices(&self) -> &[Arc<MockDevice>] {
        &self.devices
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    /// 仍然存活的同步器数量
    pub fn live_synchronizers(&self) -> usize {
        let mut synchronizers = self
            .synchronizers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        synchronizers.retain(|s| s.strong_count() > 0);
        synchronizers.len()
    }

    /// 已跟踪的同步器弱引用数量（含已释放但尚未清理的）
    pub fn tracked_synchronizers(&self) -> usize {
        self.synchronizers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl DeviceContext for MockContext {
    fn api_version(&self) -> String {
        MOCK_API_VERSION.to_string()
    }

    #[instrument(name = "mock_query_devices", skip(self))]
    fn query_devices(&self) -> SdkResult<Vec<DeviceHandle>> {
        if self.fail_query {
            return Err(SdkError::backend("failed to enumerate usb devices"));
        }
        debug!(count = self.devices.len(), "devices enumerated");
        Ok(self
            .devices
            .iter()
            .map(|d| Arc::clone(d) as DeviceHandle)
            .collect())
    }

    fn create_synchronizer(&self) -> SynchronizerHandle {
        let synchronizer = Arc::new(MockSynchronizer::new());
        let mut synchronizers = self
            .synchronizers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        synchronizers.retain(|s| s.strong_count() > 0);
        synchronizers.push(Arc::downgrade(&synchronizer));
        synchronizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Device, SensorKind, StreamProfileRequest};

    use crate::mock::MockSensorConfig;

    #[test]
    fn test_query_devices() {
        let context = MockContext::new(MockConfig::with_devices(3));
        let devices = context.query_devices().unwrap();
        assert_eq!(devices.len(), 3);
        assert!(devices.iter().all(|d| d.is_valid()));
        assert_ne!(devices[0].serial_number(), devices[1].serial_number());
    }

    #[test]
    fn test_query_failure() {
        let context = MockContext::new(MockConfig {
            fail_query: true,
            ..MockConfig::with_devices(1)
        });
        assert!(context.query_devices().is_err());
    }

    #[test]
    fn test_live_synchronizers() {
        let context = MockContext::new(MockConfig::default());
        let a = context.create_synchronizer();
        let b = context.create_synchronizer();
        assert_eq!(context.live_synchronizers(), 2);
        drop(a);
        assert_eq!(context.live_synchronizers(), 1);
        drop(b);
        assert_eq!(context.live_synchronizers(), 0);
    }

    #[test]
    fn test_synchronizer_tracking_does_not_grow() {
        let context = MockContext::new(MockConfig::default());
        for _ in 0..50 {
            let synchronizer = context.create_synchronizer();
            drop(synchronizer);
        }
        assert!(context.tracked_synchronizers() <= 1);
        assert_eq!(context.live_synchronizers(), 0);
    }

    #[test]
    fn test_from_simulation() {
        let context = MockContext::from_simulation(&SimulationConfig {
            device_count: 2,
            frame_interval_ms: 5,
        });
        assert_eq!(context.mock_devices().len(), 2);
        assert_eq!(context.api_version(), MOCK_API_VERSION);
        assert!(!context.event_log().is_enabled());
    }

    #[test]
    fn test_sensor_without_requested_profile() {
        let context = MockContext::new(MockConfig {
            devices: vec![MockDeviceConfig {
                depth: Some(MockSensorConfig::depth().without(&StreamProfileRequest::default_depth())),
                ..MockDeviceConfig::d435(0)
            }],
            ..Default::default()
        });
        let depth = context.mock_devices()[0]
            .first_sensor(SensorKind::Depth)
            .unwrap();
        let found = crate::select_profile(depth.as_ref(), &StreamProfileRequest::default_depth()).unwrap();
        assert!(found.is_none());
    }
}
