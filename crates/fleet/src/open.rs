//! open 阶段
//!
//! 每台设备一个任务：校验设备、解析传感器、选择 profile、注册流资源、
//! 并发 open + start 彩色和深度传感器。
//!
//! # 原子性保证
//! 任何设备失败时，回滚（stop + close）所有已成功的设备，然后整体失败。
//! 失败的设备保持原样。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

use contracts::{
    aggregate_status, Device, DeviceContext, DeviceHandle, DeviceResult, SensorHandle, SensorKind,
    StreamProfile, StreamProfileRequest, SynchronizerHandle,
};
use tracing::{debug, error, info, instrument, warn};

use crate::coordinator::{
    blocking, join_device_tasks, DeviceStreams, FleetConfig, FleetCoordinator, OpenedFleet,
    ResolvedDevice, SensorOp,
};
use crate::error::{DeviceError, FleetError, Result};
use crate::selector::select_profile;

/// open 阶段共享的设备 -> 流资源映射（仅在 open 阶段持锁写入）
type StreamRegistry = Arc<Mutex<BTreeMap<u32, DeviceStreams>>>;

impl FleetCoordinator {
    /// 并发打开所有设备
    ///
    /// # Returns
    /// 所有设备都成功时返回 `OpenedFleet`。
    ///
    /// # Errors
    /// 任一设备失败时先回滚成功的设备，再返回 `FleetError::OpenFailed`（带每设备结果）。
    #[instrument(
        name = "fleet_open_all",
        skip(self, devices),
        fields(device_count = devices.len())
    )]
    pub async fn open_all(&self, devices: &[DeviceHandle]) -> Result<OpenedFleet> {
        let registry: StreamRegistry = Arc::default();

        let mut tasks = Vec::with_capacity(devices.len());
        for (index, device) in devices.iter().enumerate() {
            let device_index = index as u32;
            let device = Arc::clone(device);
            let context = Arc::clone(&self.context);
            let registry = Arc::clone(&registry);
            let config = self.config.clone();

            let task = tokio::spawn(async move {
                match open_device(device_index, device, context, registry, config).await {
                    Ok(()) => {
                        info!(device_index, "device opened and started");
                        DeviceResult::success(device_index)
                    }
                    Err(e) => {
                        error!(device_index, error = %e, "device open failed");
                        DeviceResult::failure(device_index, e.to_string())
                    }
                }
            });
            tasks.push((device_index, task));
        }

        // 所有写入者都已 join
        let results = join_device_tasks(tasks).await;
        let mut streams = take_registry(registry);

        let succeeded: BTreeSet<u32> = results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.device_index)
            .collect();
        streams.retain(|index, _| succeeded.contains(index));

        if aggregate_status(&results).is_failure() {
            warn!(
                succeeded = succeeded.len(),
                failed = results.len() - succeeded.len(),
                "open failed, rolling back opened devices"
            );
            self.rollback(streams.values()).await;
            return Err(FleetError::OpenFailed { results });
        }

        info!(devices = streams.len(), "open_all completed successfully");
        Ok(OpenedFleet::new(streams, results))
    }

    /// 回滚：stop + close 已成功打开的设备（尽力而为）
    #[instrument(name = "fleet_rollback", skip(self, streams))]
    async fn rollback<'a>(&self, streams: impl Iterator<Item = &'a DeviceStreams>) {
        let results = self.close_streams(streams).await;
        for result in results.iter().filter(|r| !r.errors.is_empty()) {
            warn!(
                device_index = result.device_index,
                errors = ?result.errors,
                "rollback reported errors"
            );
        }
    }
}

/// 单台设备的 open 流程
#[instrument(name = "fleet_open_device", skip(device, context, registry, config))]
async fn open_device(
    device_index: u32,
    device: DeviceHandle,
    context: Arc<dyn DeviceContext>,
    registry: StreamRegistry,
    config: FleetConfig,
) -> std::result::Result<(), DeviceError> {
    let (color_request, depth_request) = (config.color, config.depth);
    let resolved =
        blocking(move || resolve_device(device.as_ref(), &color_request, &depth_request))
            .await??;

    let synchronizer = context.create_synchronizer();

    {
        let mut streams = registry.lock().unwrap_or_else(PoisonError::into_inner);
        streams.insert(
            device_index,
            DeviceStreams {
                device_index,
                color: Arc::clone(&resolved.color),
                depth: Arc::clone(&resolved.depth),
                synchronizer: Arc::clone(&synchronizer),
            },
        );
    }
    debug!(device_index, "device streams registered");

    let color = open_and_start(
        SensorKind::Color,
        resolved.color,
        resolved.color_profile,
        Arc::clone(&synchronizer),
    );
    let depth = open_and_start(
        SensorKind::Depth,
        resolved.depth,
        resolved.depth_profile,
        synchronizer,
    );
    let (color_result, depth_result) = tokio::join!(color, depth);
    color_result?;
    depth_result?;

    if !config.settle_delay.is_zero() {
        tokio::time::sleep(config.settle_delay).await;
    }

    Ok(())
}

/// open + start 单个传感器
async fn open_and_start(
    kind: SensorKind,
    sensor: SensorHandle,
    profile: StreamProfile,
    synchronizer: SynchronizerHandle,
) -> std::result::Result<(), DeviceError> {
    blocking(move || {
        sensor
            .open(&profile)
            .map_err(|e| DeviceError::sensor(kind, SensorOp::Open, e))?;
        sensor
            .start(synchronizer)
            .map_err(|e| DeviceError::sensor(kind, SensorOp::Start, e))
    })
    .await?
}

/// 校验设备并选出彩色 / 深度 profile
pub(crate) fn resolve_device(
    device: &dyn Device,
    color_request: &StreamProfileRequest,
    depth_request: &StreamProfileRequest,
) -> std::result::Result<ResolvedDevice, DeviceError> {
    if !device.is_valid() {
        return Err(DeviceError::InvalidDevice);
    }

    let color = device.first_sensor(SensorKind::Color);
    let depth = device.first_sensor(SensorKind::Depth);
    let (color, depth) = match (color, depth) {
        (Some(color), Some(depth)) => (color, depth),
        (color, depth) => {
            let missing = [(SensorKind::Color, color.is_none()), (SensorKind::Depth, depth.is_none())]
                .into_iter()
                .filter_map(|(kind, absent)| absent.then_some(kind))
                .collect();
            return Err(DeviceError::MissingSensors { missing });
        }
    };

    let color_profile = select_profile(color.as_ref(), color_request)?;
    let depth_profile = select_profile(depth.as_ref(), depth_request)?;

    let color_profile = color_profile.ok_or(DeviceError::ProfileNotFound {
        sensor: SensorKind::Color,
        request: *color_request,
    })?;
    let depth_profile = depth_profile.ok_or(DeviceError::ProfileNotFound {
        sensor: SensorKind::Depth,
        request: *depth_request,
    })?;

    Ok(ResolvedDevice {
        color,
        depth,
        color_profile,
        depth_profile,
    })
}

/// 取出映射（此时所有 open 任务都已 join）
fn take_registry(registry: StreamRegistry) -> BTreeMap<u32, DeviceStreams> {
    match Arc::try_unwrap(registry) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
        Err(shared) => std::mem::take(&mut *shared.lock().unwrap_or_else(PoisonError::into_inner)),
    }
}
