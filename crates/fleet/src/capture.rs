//! capture 阶段
//!
//! 每台设备一个任务：先用非阻塞 poll 丢弃同步器里积压的旧帧组，
//! 再逐个等待 `frame_capture_count` 个新帧组，每次等待都有超时上限。
//! 帧内容直接丢弃。

use std::sync::Arc;
use std::time::Duration;

use contracts::{DeviceResult, FrameSynchronizer};
use tracing::{debug, error, info, instrument};

use crate::coordinator::{blocking, join_device_tasks, FleetCoordinator, OpenedFleet};
use crate::error::DeviceError;

impl FleetCoordinator {
    /// 并发采集所有设备
    ///
    /// 某台设备超时或同步出错只影响它自己的结果，其它设备照常完成。
    #[instrument(name = "fleet_capture_all", skip(self, fleet), fields(device_count = fleet.len()))]
    pub async fn capture_all(&self, fleet: &OpenedFleet) -> Vec<DeviceResult> {
        let count = self.config.frame_capture_count;
        let timeout = self.config.frame_timeout;

        let tasks = fleet
            .iter()
            .map(|streams| {
                let device_index = streams.device_index;
                let synchronizer = Arc::clone(&streams.synchronizer);

                let task = tokio::spawn(async move {
                    let outcome =
                        blocking(move || capture_frames(synchronizer.as_ref(), count, timeout)).await;
                    match outcome.and_then(|captured| captured) {
                        Ok(drained) => {
                            observability::record_frames_drained(device_index, drained);
                            debug!(device_index, drained, captured = count, "capture finished");
                            DeviceResult::success(device_index)
                        }
                        Err(e) => {
                            error!(device_index, error = %e, "capture failed");
                            DeviceResult::failure(device_index, e.to_string())
                        }
                    }
                });
                (device_index, task)
            })
            .collect();

        let results = join_device_tasks(tasks).await;
        info!(
            failed = results.iter().filter(|r| !r.is_success()).count(),
            "capture_all completed"
        );
        results
    }
}

/// 丢弃积压帧组，然后等待 `count` 个新帧组
///
/// # Returns
/// 丢弃的旧帧组数量。
///
/// # Errors
/// 第 k 次等待失败时返回 `DeviceError::Capture { capture: k }`（从 1 开始计数）。
pub(crate) fn capture_frames(
    synchronizer: &dyn FrameSynchronizer,
    count: u32,
    timeout: Duration,
) -> Result<usize, DeviceError> {
    let mut drained = 0;
    while synchronizer.poll_for_frames().is_some() {
        drained += 1;
    }

    for capture in 1..=count {
        synchronizer
            .wait_for_frames(timeout)
            .map_err(|source| DeviceError::Capture { capture, source })?;
    }

    Ok(drained)
}
