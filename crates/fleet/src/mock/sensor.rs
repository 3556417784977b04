//! 模拟传感器
//!
//! 实现 `Sensor` trait，带完整的 Closed -> Opened -> Streaming 状态机。
//! 流式状态下由后台线程按帧率向同步器推送帧，与真实 SDK 的回调线程行为一致。
//! 非法的状态迁移返回 `SdkError::WrongCallSequence`。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use contracts::{
    Frame, PixelFormat, SdkError, SdkResult, Sensor, SensorKind, StreamKind, StreamProfile,
    StreamProfileRequest, SynchronizerHandle, VideoStreamProfile,
};
use tracing::{debug, trace};

use super::event_log::{CallPhase, EventLog};
use crate::coordinator::SensorOp;

/// 传感器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorState {
    Closed,
    Opened,
    Streaming,
}

impl fmt::Display for SensorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed"),
            Self::Opened => f.write_str("opened"),
            Self::Streaming => f.write_str("streaming"),
        }
    }
}

/// 模拟传感器配置（可注入失败场景）
#[derive(Debug, Clone)]
pub struct MockSensorConfig {
    pub name: String,
    /// 枚举顺序即公布顺序
    pub profiles: Vec<StreamProfile>,
    pub fail_open: bool,
    pub fail_start: bool,
    pub fail_close: bool,
    /// 推送 N 帧之后不再出帧（模拟卡住的流）
    pub stall_after_frames: Option<u64>,
    /// 出帧间隔；None 时按打开的 profile 帧率计算
    pub frame_interval: Option<Duration>,
}

impl MockSensorConfig {
    /// RGB 相机
    pub fn color() -> Self {
        Self::with_profiles("RGB Camera", color_catalogue())
    }

    /// 立体深度模块
    pub fn depth() -> Self {
        Self::with_profiles("Stereo Module", depth_catalogue())
    }

    pub fn with_profiles(name: impl Into<String>, profiles: Vec<StreamProfile>) -> Self {
        Self {
            name: name.into(),
            profiles,
            fail_open: false,
            fail_start: false,
            fail_close: false,
            stall_after_frames: None,
            frame_interval: None,
        }
    }

    /// 去掉与请求完全匹配的 profile
    pub fn without(mut self, request: &StreamProfileRequest) -> Self {
        self.profiles
            .retain(|p| !p.as_video().is_some_and(|v| request.matches(v)));
        self
    }
}

/// 彩色相机 profile 目录
fn color_catalogue() -> Vec<StreamProfile> {
    const FORMATS: [PixelFormat; 5] = [
        PixelFormat::Rgb8,
        PixelFormat::Bgr8,
        PixelFormat::Rgba8,
        PixelFormat::Bgra8,
        PixelFormat::Yuyv,
    ];
    const RESOLUTIONS: [(u32, u32); 3] = [(640, 480), (1280, 720), (1920, 1080)];
    video_catalogue(100, StreamKind::Color, 0, &FORMATS, &RESOLUTIONS)
}

/// 深度模块 profile 目录（深度 + 左红外）
fn depth_catalogue() -> Vec<StreamProfile> {
    const RESOLUTIONS: [(u32, u32); 4] = [(480, 270), (640, 480), (848, 480), (1280, 720)];
    let mut profiles = video_catalogue(200, StreamKind::Depth, 0, &[PixelFormat::Z16], &RESOLUTIONS);
    profiles.extend(video_catalogue(
        300,
        StreamKind::Infrared,
        1,
        &[PixelFormat::Y8],
        &RESOLUTIONS,
    ));
    profiles
}

fn video_catalogue(
    first_id: u32,
    stream_kind: StreamKind,
    stream_index: u32,
    formats: &[PixelFormat],
    resolutions: &[(u32, u32)],
) -> Vec<StreamProfile> {
    const FRAME_RATES: [u32; 3] = [30, 15, 6];

    let mut unique_id = first_id;
    let mut profiles = Vec::new();
    for &(width, height) in resolutions {
        for &format in formats {
            for frame_rate in FRAME_RATES {
                profiles.push(StreamProfile::Video(VideoStreamProfile {
                    unique_id,
                    stream_kind,
                    stream_index,
                    format,
                    frame_rate,
                    width,
                    height,
                }));
                unique_id += 1;
            }
        }
    }
    profiles
}

/// 出帧线程
struct Streamer {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Streamer {
    fn spawn(
        sensor: String,
        profile: StreamProfile,
        synchronizer: SynchronizerHandle,
        interval: Duration,
        stall_after: Option<u64>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let byte_len = profile.as_video().map_or(32, VideoStreamProfile::frame_bytes);

        let handle = thread::spawn(move || {
            let started = Instant::now();
            let mut frame_number: u64 = 0;
            debug!(sensor = %sensor, profile = %profile, "mock stream started");

            while flag.load(Ordering::Acquire) {
                thread::park_timeout(interval);
                if !flag.load(Ordering::Acquire) {
                    break;
                }
                if stall_after.is_some_and(|limit| frame_number >= limit) {
                    continue;
                }

                frame_number += 1;
                synchronizer.push_frame(Frame {
                    stream_kind: profile.stream_kind(),
                    frame_number,
                    timestamp_ms: started.elapsed().as_secs_f64() * 1000.0,
                    byte_len,
                });
                trace!(sensor = %sensor, frame_number, "mock frame pushed");
            }

            debug!(sensor = %sensor, frames = frame_number, "mock stream stopped");
        });

        Self { running, handle }
    }

    fn shutdown(self) {
        self.running.store(false, Ordering::Release);
        self.handle.thread().unpark();
        let _ = self.handle.join();
    }
}

struct SensorInner {
    state: SensorState,
    profile: Option<StreamProfile>,
    streamer: Option<Streamer>,
}

/// 模拟传感器
pub struct MockSensor {
    device_index: u32,
    kind: SensorKind,
    config: MockSensorConfig,
    log: Arc<EventLog>,
    inner: Mutex<SensorInner>,
}

impl MockSensor {
    pub fn new(device_index: u32, kind: SensorKind, config: MockSensorConfig, log: Arc<EventLog>) -> Self {
        Self {
            device_index,
            kind,
            config,
            log,
            inner: Mutex::new(SensorInner {
                state: SensorState::Closed,
                profile: None,
                streamer: None,
            }),
        }
    }

    pub fn state(&self) -> SensorState {
        self.lock().state
    }

    /// 当前打开的 profile
    pub fn active_profile(&self) -> Option<StreamProfile> {
        self.lock().profile
    }

    /// 绕过状态机直接释放（模拟外部拆除），不记录事件
    pub fn force_release(&self) {
        let mut inner = self.lock();
        if let Some(streamer) = inner.streamer.take() {
            streamer.shutdown();
        }
        inner.state = SensorState::Closed;
        inner.profile = None;
    }

    fn lock(&self) -> MutexGuard<'_, SensorInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 记录 Enter / Exit 事件并执行调用
    fn traced<T>(&self, op: SensorOp, call: impl FnOnce() -> SdkResult<T>) -> SdkResult<T> {
        self.log
            .record(self.device_index, self.kind, op, CallPhase::Enter, true);
        let result = call();
        self.log
            .record(self.device_index, self.kind, op, CallPhase::Exit, result.is_ok());
        result
    }

    fn wrong_state(&self, op: SensorOp, state: SensorState) -> SdkError {
        SdkError::wrong_call_sequence(&self.config.name, op.to_string(), state.to_string())
    }

    fn frame_interval(&self, profile: &StreamProfile) -> Duration {
        self.config.frame_interval.unwrap_or_else(|| {
            Duration::from_secs_f64(1.0 / f64::from(profile.frame_rate().max(1)))
        })
    }
}

impl fmt::Debug for MockSensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockSensor")
            .field("device_index", &self.device_index)
            .field("name", &self.config.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Sensor for MockSensor {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn stream_profiles(&self) -> SdkResult<Vec<StreamProfile>> {
        Ok(self.config.profiles.clone())
    }

    fn open(&self, profile: &StreamProfile) -> SdkResult<()> {
        self.traced(SensorOp::Open, || {
            let mut inner = self.lock();
            if inner.state != SensorState::Closed {
                return Err(self.wrong_state(SensorOp::Open, inner.state));
            }
            if !self.config.profiles.contains(profile) {
                return Err(SdkError::InvalidValue {
                    message: format!("profile {profile} not supported by '{}'", self.config.name),
                });
            }
            if self.config.fail_open {
                return Err(SdkError::backend("failed to set power state"));
            }

            inner.state = SensorState::Opened;
            inner.profile = Some(*profile);
            Ok(())
        })
    }

    fn start(&self, synchronizer: SynchronizerHandle) -> SdkResult<()> {
        self.traced(SensorOp::Start, || {
            let mut inner = self.lock();
            let profile = match (inner.state, inner.profile) {
                (SensorState::Opened, Some(profile)) => profile,
                (state, _) => return Err(self.wrong_state(SensorOp::Start, state)),
            };
            if self.config.fail_start {
                return Err(SdkError::backend("failed to start streaming"));
            }

            inner.streamer = Some(Streamer::spawn(
                self.config.name.clone(),
                profile,
                synchronizer,
                self.frame_interval(&profile),
                self.config.stall_after_frames,
            ));
            inner.state = SensorState::Streaming;
            Ok(())
        })
    }

    fn stop(&self) -> SdkResult<()> {
        self.traced(SensorOp::Stop, || {
            let mut inner = self.lock();
            if inner.state != SensorState::Streaming {
                return Err(self.wrong_state(SensorOp::Stop, inner.state));
            }

            if let Some(streamer) = inner.streamer.take() {
                streamer.shutdown();
            }
            inner.state = SensorState::Opened;
            Ok(())
        })
    }

    fn close(&self) -> SdkResult<()> {
        self.traced(SensorOp::Close, || {
            let mut inner = self.lock();
            if inner.state != SensorState::Opened {
                return Err(self.wrong_state(SensorOp::Close, inner.state));
            }
            if self.config.fail_close {
                return Err(SdkError::backend("failed to release sensor"));
            }

            inner.state = SensorState::Closed;
            inner.profile = None;
            Ok(())
        })
    }
}

impl Drop for MockSensor {
    fn drop(&mut self) {
        if let Some(streamer) = self.lock().streamer.take() {
            streamer.shutdown();
        }
    }
}
