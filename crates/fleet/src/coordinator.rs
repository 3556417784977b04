//! FleetCoordinator 核心实现
//!
//! 对所有设备并发执行 open / capture / close 三个阶段。
//! 每个阶段为每台设备启动一个任务，所有任务 join 之后才进入下一阶段。
//!
//! SDK 调用都是阻塞的，统一放到 tokio 的 blocking 线程池执行。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    DeviceContext, DeviceResult, FailurePolicy, SandboxConfig, SensorHandle, SensorKind,
    StreamProfile, StreamProfileRequest, SynchronizerHandle,
};
use tokio::task::JoinHandle;
use tracing::error;

use crate::error::DeviceError;

/// 传感器生命周期调用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorOp {
    Open,
    Start,
    Stop,
    Close,
}

impl fmt::Display for SensorOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
            Self::Close => f.write_str("close"),
        }
    }
}

/// 协调器配置
///
/// 目标流参数由调用方提供，协调器本身不写死。
#[derive(Debug, Clone, PartialEq)]
pub struct FleetConfig {
    /// 彩色流请求
    pub color: StreamProfileRequest,
    /// 深度流请求
    pub depth: StreamProfileRequest,
    /// 每轮等待的新帧组数量
    pub frame_capture_count: u32,
    /// 单次等待上限
    pub frame_timeout: Duration,
    /// open + start 之后的等待时间
    pub settle_delay: Duration,
    /// stop / close 顺序错误的处理策略
    pub failure_policy: FailurePolicy,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self::from(&SandboxConfig::default())
    }
}

impl From<&SandboxConfig> for FleetConfig {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            color: config.color,
            depth: config.depth,
            frame_capture_count: config.frame_capture_count,
            frame_timeout: config.frame_timeout(),
            settle_delay: config.settle_delay(),
            failure_policy: config.failure_policy,
        }
    }
}

/// 单台设备在一个循环内持有的流资源
#[derive(Clone)]
pub struct DeviceStreams {
    pub device_index: u32,
    pub color: SensorHandle,
    pub depth: SensorHandle,
    pub synchronizer: SynchronizerHandle,
}

impl DeviceStreams {
    /// 按类型取传感器
    pub fn sensor(&self, kind: SensorKind) -> Option<&SensorHandle> {
        match kind {
            SensorKind::Color => Some(&self.color),
            SensorKind::Depth => Some(&self.depth),
            SensorKind::Motion => None,
        }
    }
}

impl fmt::Debug for DeviceStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceStreams")
            .field("device_index", &self.device_index)
            .field("color", &self.color.name())
            .field("depth", &self.depth.name())
            .finish_non_exhaustive()
    }
}

/// open 阶段的产物
///
/// # 不变量
/// 设备 -> 流资源的映射只在 open 阶段写入（每台设备一次，持锁写入）。
/// 所有 open 任务 join 之后映射被移出锁，之后的阶段只读，不需要再加锁。
#[derive(Debug, Default)]
pub struct OpenedFleet {
    streams: BTreeMap<u32, DeviceStreams>,
    results: Vec<DeviceResult>,
}

impl OpenedFleet {
    /// 由已打开的流构造
    pub fn from_streams(streams: impl IntoIterator<Item = DeviceStreams>) -> Self {
        let streams: BTreeMap<u32, DeviceStreams> = streams
            .into_iter()
            .map(|s| (s.device_index, s))
            .collect();
        let results = streams.keys().map(|&i| DeviceResult::success(i)).collect();
        Self { streams, results }
    }

    pub(crate) fn new(streams: BTreeMap<u32, DeviceStreams>, results: Vec<DeviceResult>) -> Self {
        Self { streams, results }
    }

    /// open 阶段的每设备结果
    pub fn results(&self) -> &[DeviceResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn device_indices(&self) -> Vec<u32> {
        self.streams.keys().copied().collect()
    }

    pub fn streams(&self, device_index: u32) -> Option<&DeviceStreams> {
        self.streams.get(&device_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceStreams> {
        self.streams.values()
    }
}

/// Fleet 协调器
///
/// 负责 open / capture / close 三个阶段，以及 open 失败时的回滚。
pub struct FleetCoordinator {
    pub(crate) context: Arc<dyn DeviceContext>,
    pub(crate) config: FleetConfig,
}

impl FleetCoordinator {
    /// 创建新的协调器
    pub fn new(context: Arc<dyn DeviceContext>, config: FleetConfig) -> Self {
        Self { context, config }
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<dyn DeviceContext> {
        &self.context
    }
}

/// 在 blocking 线程池执行一次 SDK 调用
///
/// panic 被转换为 `DeviceError::TaskAborted`，不会传播到兄弟任务。
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, DeviceError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DeviceError::TaskAborted {
            message: e.to_string(),
        })
}

/// 按设备顺序 join 所有任务
///
/// 任务本身 panic 时生成失败结果，保证每台设备都有一个结果。
pub(crate) async fn join_device_tasks(
    tasks: Vec<(u32, JoinHandle<DeviceResult>)>,
) -> Vec<DeviceResult> {
    let mut results = Vec::with_capacity(tasks.len());
    for (device_index, task) in tasks {
        match task.await {
            Ok(result) => results.push(result),
            Err(e) => {
                error!(device_index, error = %e, "device task aborted");
                results.push(DeviceResult::failure(
                    device_index,
                    format!("task aborted: {e}"),
                ));
            }
        }
    }
    results
}

/// 已选中的 profile
#[derive(Clone)]
pub(crate) struct ResolvedDevice {
    pub color: SensorHandle,
    pub depth: SensorHandle,
    pub color_profile: StreamProfile,
    pub depth_profile: StreamProfile,
}
