//! close 阶段
//!
//! 每台设备一个任务：并发 stop 深度和彩色传感器并 join，再并发 close 两者并 join。
//! stop 一定在 close 之前完成。
//!
//! SDK 的 "wrong call sequence" 错误（传感器已经停止 / 已关闭）在传感器边界被捕获，
//! 按 `FailurePolicy` 决定是否计入设备结果。

use std::sync::Arc;

use contracts::{DeviceResult, FailurePolicy, SdkResult, SensorHandle, SensorKind};
use tracing::{error, info, instrument, warn};

use crate::coordinator::{blocking, join_device_tasks, DeviceStreams, FleetCoordinator, OpenedFleet, SensorOp};
use crate::error::DeviceError;

impl FleetCoordinator {
    /// 并发关闭所有设备
    #[instrument(name = "fleet_close_all", skip(self, fleet), fields(device_count = fleet.len()))]
    pub async fn close_all(&self, fleet: &OpenedFleet) -> Vec<DeviceResult> {
        let results = self.close_streams(fleet.iter()).await;
        info!(
            failed = results.iter().filter(|r| !r.is_success()).count(),
            "close_all completed"
        );
        results
    }

    /// 关闭一组设备的流（close 阶段与 open 回滚共用）
    pub(crate) async fn close_streams<'a>(
        &self,
        streams: impl Iterator<Item = &'a DeviceStreams>,
    ) -> Vec<DeviceResult> {
        let policy = self.config.failure_policy;

        let tasks = streams
            .map(|s| {
                let device_index = s.device_index;
                let color = Arc::clone(&s.color);
                let depth = Arc::clone(&s.depth);
                let task = tokio::spawn(close_device(device_index, color, depth, policy));
                (device_index, task)
            })
            .collect();

        join_device_tasks(tasks).await
    }
}

/// 单台设备：stop (depth || color) -> join -> close (depth || color) -> join
#[instrument(name = "fleet_close_device", skip(color, depth, policy))]
async fn close_device(
    device_index: u32,
    color: SensorHandle,
    depth: SensorHandle,
    policy: FailurePolicy,
) -> DeviceResult {
    let mut result = DeviceResult::success(device_index);

    let (depth_stop, color_stop) = tokio::join!(
        sensor_call(Arc::clone(&depth), |s| s.stop()),
        sensor_call(Arc::clone(&color), |s| s.stop()),
    );
    judge(&mut result, SensorKind::Depth, SensorOp::Stop, depth_stop, policy);
    judge(&mut result, SensorKind::Color, SensorOp::Stop, color_stop, policy);

    let (depth_close, color_close) = tokio::join!(
        sensor_call(depth, |s| s.close()),
        sensor_call(color, |s| s.close()),
    );
    judge(&mut result, SensorKind::Depth, SensorOp::Close, depth_close, policy);
    judge(&mut result, SensorKind::Color, SensorOp::Close, color_close, policy);

    result
}

/// 在 blocking 线程池执行一次传感器调用
async fn sensor_call<F>(sensor: SensorHandle, call: F) -> Result<SdkResult<()>, DeviceError>
where
    F: FnOnce(&SensorHandle) -> SdkResult<()> + Send + 'static,
{
    blocking(move || call(&sensor)).await
}

/// 根据策略把单个传感器调用的结果并入设备结果
fn judge(
    result: &mut DeviceResult,
    kind: SensorKind,
    op: SensorOp,
    outcome: Result<SdkResult<()>, DeviceError>,
    policy: FailurePolicy,
) {
    let device_index = result.device_index;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_wrong_call_sequence() => {
            let err = DeviceError::sensor(kind, op, e);
            warn!(device_index, sensor = %kind, operation = %op, error = %err, "out-of-sequence call");
            match policy {
                FailurePolicy::Tolerant => result.note(err.to_string()),
                FailurePolicy::Strict => result.fail(err.to_string()),
            }
        }
        Ok(Err(e)) => {
            let err = DeviceError::sensor(kind, op, e);
            error!(device_index, sensor = %kind, operation = %op, error = %err, "sensor call failed");
            result.fail(err.to_string());
        }
        Err(e) => {
            error!(device_index, sensor = %kind, operation = %op, error = %e, "sensor call aborted");
            result.fail(e.to_string());
        }
    }
}
