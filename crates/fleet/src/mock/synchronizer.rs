//! 模拟帧同步器
//!
//! 按预期的流集合组帧：每个流只保留最新一帧，所有预期流都有待组帧时
//! 组成一个 FrameSet 放入就绪环形队列，待组帧随之清空。不在预期集合中的
//! 流被忽略。就绪队列有上限，满了覆盖最旧的帧组。

use std::fmt;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use contracts::{Frame, FrameSet, FrameSynchronizer, SdkError, SdkResult, StreamKind};
use ringbuf::{traits::*, HeapRb};
use tracing::trace;

/// 就绪队列默认容量
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

struct SyncState {
    /// 每个预期流待组的最新帧（与 `MockSynchronizer::streams` 同序）
    pending: Vec<Option<Frame>>,
    ready: HeapRb<FrameSet>,
    dropped: u64,
}

/// 模拟同步器
pub struct MockSynchronizer {
    streams: Vec<StreamKind>,
    state: Mutex<SyncState>,
    ready: Condvar,
}

impl MockSynchronizer {
    /// 彩色 + 深度配对（harness 打开的两个流）
    pub fn new() -> Self {
        Self::for_streams([StreamKind::Color, StreamKind::Depth])
    }

    /// 只对给定的流组帧
    pub fn for_streams(streams: impl IntoIterator<Item = StreamKind>) -> Self {
        let mut kinds: Vec<StreamKind> = Vec::new();
        for kind in streams {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Self {
            state: Mutex::new(SyncState {
                pending: vec![None; kinds.len()],
                ready: HeapRb::new(DEFAULT_QUEUE_CAPACITY),
                dropped: 0,
            }),
            streams: kinds,
            ready: Condvar::new(),
        }
    }

    /// 修改就绪队列容量（丢弃已就绪的帧组）
    pub fn with_capacity(self, capacity: usize) -> Self {
        {
            let mut state = self.lock();
            state.ready = HeapRb::new(capacity.max(1));
        }
        self
    }

    pub fn streams(&self) -> &[StreamKind] {
        &self.streams
    }

    /// 就绪队列中的帧组数量
    pub fn ready_len(&self) -> usize {
        self.lock().ready.occupied_len()
    }

    /// 因队列满被覆盖的帧组数量
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockSynchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MockSynchronizer")
            .field("streams", &self.streams)
            .field("ready", &state.ready.occupied_len())
            .field("capacity", &state.ready.capacity())
            .field("dropped", &state.dropped)
            .finish()
    }
}

impl FrameSynchronizer for MockSynchronizer {
    fn push_frame(&self, frame: Frame) {
        let Some(slot) = self.streams.iter().position(|k| *k == frame.stream_kind) else {
            trace!(stream = %frame.stream_kind, "frame of unexpected stream ignored");
            return;
        };

        let mut state = self.lock();
        state.pending[slot] = Some(frame);
        if state.pending.iter().any(Option::is_none) {
            return;
        }

        let frames: Vec<Frame> = state.pending.iter_mut().filter_map(Option::take).collect();
        trace!(frames = frames.len(), "frame set ready");
        if state.ready.push_overwrite(FrameSet { frames }).is_some() {
            state.dropped += 1;
        }
        drop(state);

        self.ready.notify_all();
    }

    fn poll_for_frames(&self) -> Option<FrameSet> {
        self.lock().ready.try_pop()
    }

    fn wait_for_frames(&self, timeout: Duration) -> SdkResult<FrameSet> {
        let state = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.ready.is_empty())
            .unwrap_or_else(PoisonError::into_inner);

        state.ready.try_pop().ok_or(SdkError::Timeout {
            waited_ms: timeout.as_millis() as u64,
        })
    }
}
