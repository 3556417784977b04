//! Single-device session
//!
//! Sequential variant of the lifecycle experiment on one camera. Sensors and
//! profiles are resolved once; every cycle builds a fresh synchronizer and walks
//! open -> start -> (capture) -> stop -> close on the calling thread.

use std::sync::Arc;

use contracts::{
    DeviceContext, DeviceHandle, SdkResult, SensorHandle, SensorKind, StreamProfile,
};
use tracing::{debug, instrument, warn};

use crate::capture::capture_frames;
use crate::coordinator::{FleetConfig, SensorOp};
use crate::error::DeviceError;
use crate::open::resolve_device;

/// One camera driven through repeated lifecycle cycles
pub struct SingleDeviceSession {
    context: Arc<dyn DeviceContext>,
    config: FleetConfig,
    color: SensorHandle,
    depth: SensorHandle,
    color_profile: StreamProfile,
    depth_profile: StreamProfile,
}

impl SingleDeviceSession {
    /// Validate the device and resolve both sensors and profiles
    ///
    /// # Errors
    /// Invalid handle, missing sensor, profile not found or SDK enumeration error.
    pub fn prepare(
        context: Arc<dyn DeviceContext>,
        device: &DeviceHandle,
        config: FleetConfig,
    ) -> Result<Self, DeviceError> {
        let resolved = resolve_device(device.as_ref(), &config.color, &config.depth)?;
        debug!(
            color = %resolved.color_profile,
            depth = %resolved.depth_profile,
            "single device prepared"
        );

        Ok(Self {
            context,
            config,
            color: resolved.color,
            depth: resolved.depth,
            color_profile: resolved.color_profile,
            depth_profile: resolved.depth_profile,
        })
    }

    pub fn color_profile(&self) -> &StreamProfile {
        &self.color_profile
    }

    pub fn depth_profile(&self) -> &StreamProfile {
        &self.depth_profile
    }

    /// Run one open/start/(capture)/stop/close cycle
    ///
    /// Blocking. The synchronizer is dropped when the cycle returns.
    ///
    /// # Errors
    /// First failing SDK call. Sensors already opened stay as they are.
    #[instrument(name = "single_cycle", skip(self))]
    pub fn cycle(&self, capture: bool) -> Result<(), DeviceError> {
        let synchronizer = self.context.create_synchronizer();

        call(SensorKind::Color, SensorOp::Open, || self.color.open(&self.color_profile))?;
        call(SensorKind::Depth, SensorOp::Open, || self.depth.open(&self.depth_profile))?;
        call(SensorKind::Color, SensorOp::Start, || {
            self.color.start(Arc::clone(&synchronizer))
        })?;
        call(SensorKind::Depth, SensorOp::Start, || {
            self.depth.start(Arc::clone(&synchronizer))
        })?;

        if capture {
            let drained = capture_frames(
                synchronizer.as_ref(),
                self.config.frame_capture_count,
                self.config.frame_timeout,
            )?;
            debug!(drained, "single capture finished");
        }

        call(SensorKind::Color, SensorOp::Stop, || self.color.stop())?;
        call(SensorKind::Depth, SensorOp::Stop, || self.depth.stop())?;
        call(SensorKind::Color, SensorOp::Close, || self.color.close())?;
        call(SensorKind::Depth, SensorOp::Close, || self.depth.close())?;

        Ok(())
    }

    /// Best-effort stop and close of both sensors
    ///
    /// Out-of-sequence errors are expected here (sensors already closed) and
    /// ignored; anything else is logged.
    #[instrument(name = "single_release", skip(self))]
    pub fn release(&self) {
        for (kind, sensor) in [(SensorKind::Color, &self.color), (SensorKind::Depth, &self.depth)] {
            for op in [SensorOp::Stop, SensorOp::Close] {
                let outcome = match op {
                    SensorOp::Stop => sensor.stop(),
                    _ => sensor.close(),
                };
                match outcome {
                    Err(e) if !e.is_wrong_call_sequence() => {
                        warn!(sensor = %kind, operation = %op, error = %e, "release failed");
                    }
                    _ => {}
                }
            }
        }
    }
}

fn call(kind: SensorKind, op: SensorOp, f: impl FnOnce() -> SdkResult<()>) -> Result<(), DeviceError> {
    f().map_err(|e| DeviceError::sensor(kind, op, e))
}
