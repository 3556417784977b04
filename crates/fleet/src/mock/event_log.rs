//! 生命周期调用记录
//!
//! 每个传感器调用在进入和返回时各记录一条事件，序号全局单调递增，
//! 测试用它来断言调用顺序（例如 stop 全部返回之后才开始 close）。
//!
//! 日志只增不减，因此长时间运行的泄漏检查会话使用 `EventLog::disabled()`，
//! 不记录任何事件。

use std::sync::{Mutex, PoisonError};

use contracts::SensorKind;

use crate::coordinator::SensorOp;

/// 调用阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Enter,
    Exit,
}

/// 一条调用事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// 全局序号
    pub seq: u64,
    pub device_index: u32,
    pub sensor: SensorKind,
    pub call: SensorOp,
    pub phase: CallPhase,
    /// Exit 时调用是否成功（Enter 恒为 true）
    pub ok: bool,
}

/// 线程安全的事件日志
#[derive(Debug)]
pub struct EventLog {
    events: Mutex<Vec<LifecycleEvent>>,
    enabled: bool,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    /// 记录所有事件
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            enabled: true,
        }
    }

    /// 丢弃所有事件
    pub fn disabled() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 追加一条事件，返回其序号（日志关闭时返回 `None`）
    pub fn record(
        &self,
        device_index: u32,
        sensor: SensorKind,
        call: SensorOp,
        phase: CallPhase,
        ok: bool,
    ) -> Option<u64> {
        if !self.enabled {
            return None;
        }
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = events.len() as u64;
        events.push(LifecycleEvent {
            seq,
            device_index,
            sensor,
            call,
            phase,
            ok,
        });
        Some(seq)
    }

    /// 全部事件的快照
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_for(&self, device_index: u32) -> Vec<LifecycleEvent> {
        self.filtered(|e| e.device_index == device_index)
    }

    pub fn count(&self, device_index: u32, sensor: SensorKind, call: SensorOp, phase: CallPhase) -> usize {
        self.filtered(|e| {
            e.device_index == device_index && e.sensor == sensor && e.call == call && e.phase == phase
        })
        .len()
    }

    /// 第一条匹配事件
    pub fn find(
        &self,
        device_index: u32,
        sensor: SensorKind,
        call: SensorOp,
        phase: CallPhase,
    ) -> Option<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| {
                e.device_index == device_index
                    && e.sensor == sensor
                    && e.call == call
                    && e.phase == phase
            })
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn filtered(&self, predicate: impl Fn(&LifecycleEvent) -> bool) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }
}
