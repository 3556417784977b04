//! 模拟设备

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contracts::{Device, SensorHandle, SensorKind};

use super::event_log::EventLog;
use super::sensor::{MockSensor, MockSensorConfig};

/// 模拟设备配置
#[derive(Debug, Clone)]
pub struct MockDeviceConfig {
    pub name: String,
    pub serial_number: String,
    /// false 时设备句柄无效
    pub valid: bool,
    /// None 表示设备缺少该传感器
    pub color: Option<MockSensorConfig>,
    pub depth: Option<MockSensorConfig>,
}

impl MockDeviceConfig {
    /// D435 形态：深度模块 + RGB 相机
    pub fn d435(index: u32) -> Self {
        Self {
            name: "Intel RealSense D435".to_string(),
            serial_number: format!("{}", 841_612_070_000u64 + u64::from(index)),
            valid: true,
            color: Some(MockSensorConfig::color()),
            depth: Some(MockSensorConfig::depth()),
        }
    }
}

/// 模拟设备
pub struct MockDevice {
    name: String,
    serial_number: String,
    valid: AtomicBool,
    color: Option<Arc<MockSensor>>,
    depth: Option<Arc<MockSensor>>,
}

impl MockDevice {
    pub fn new(device_index: u32, config: MockDeviceConfig, log: &Arc<EventLog>) -> Self {
        let sensor = |kind, config: Option<MockSensorConfig>| {
            config.map(|c| Arc::new(MockSensor::new(device_index, kind, c, Arc::clone(log))))
        };
        Self {
            name: config.name,
            serial_number: config.serial_number,
            valid: AtomicBool::new(config.valid),
            color: sensor(SensorKind::Color, config.color),
            depth: sensor(SensorKind::Depth, config.depth),
        }
    }

    pub fn color_sensor(&self) -> Option<Arc<MockSensor>> {
        self.color.clone()
    }

    pub fn depth_sensor(&self) -> Option<Arc<MockSensor>> {
        self.depth.clone()
    }

    /// 模拟拔出 / 重新插入
    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::SeqCst);
    }
}

impl fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDevice")
            .field("name", &self.name)
            .field("serial_number", &self.serial_number)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

impl Device for MockDevice {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// 与 D400 系列枚举顺序一致：深度模块在前
    fn sensors(&self) -> Vec<SensorHandle> {
        [&self.depth, &self.color]
            .into_iter()
            .flatten()
            .map(|s| Arc::clone(s) as SensorHandle)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Sensor;

    #[test]
    fn test_first_sensor_resolves_by_kind() {
        let log = Arc::new(EventLog::new());
        let device = MockDevice::new(3, MockDeviceConfig::d435(3), &log);

        assert_eq!(device.sensors().len(), 2);
        assert_eq!(device.first_sensor(SensorKind::Color).unwrap().name(), "RGB Camera");
        assert_eq!(device.first_sensor(SensorKind::Depth).unwrap().name(), "Stereo Module");
        assert!(device.first_sensor(SensorKind::Motion).is_none());
        assert_eq!(device.serial_number(), "841612070003");
    }

    #[test]
    fn test_missing_sensor_and_invalid_handle() {
        let log = Arc::new(EventLog::new());
        let device = MockDevice::new(
            0,
            MockDeviceConfig {
                depth: None,
                ..MockDeviceConfig::d435(0)
            },
            &log,
        );
        assert!(device.first_sensor(SensorKind::Depth).is_none());
        assert!(device.is_valid());

        device.set_valid(false);
        assert!(!device.is_valid());
    }
}
