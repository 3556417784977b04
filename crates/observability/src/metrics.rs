//! 生命周期指标收集模块
//!
//! 基于每个阶段的 `DeviceResult` 收集和统计 open / capture / close 的运行指标。

use std::collections::HashMap;
use std::time::Duration;

use contracts::{DeviceResult, LifecycleStage};
use metrics::{counter, gauge, histogram};

/// 记录一个阶段的指标
///
/// 每个阶段（所有设备任务 join 之后）调用一次。
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_stage_metrics;
///
/// let results = coordinator.capture_all(&fleet).await;
/// record_stage_metrics(LifecycleStage::Capture, started.elapsed(), &results);
/// ```
pub fn record_stage_metrics(stage: LifecycleStage, elapsed: Duration, results: &[DeviceResult]) {
    let stage_label = stage.as_str();

    // 阶段耗时
    histogram!("depth_sandbox_stage_duration_ms", "stage" => stage_label)
        .record(elapsed.as_secs_f64() * 1000.0);

    // 参与设备数
    gauge!("depth_sandbox_stage_devices", "stage" => stage_label).set(results.len() as f64);

    // 失败设备
    let failures = results.iter().filter(|r| !r.is_success()).count();
    if failures > 0 {
        counter!("depth_sandbox_device_failures_total", "stage" => stage_label)
            .increment(failures as u64);
        for result in results.iter().filter(|r| !r.is_success()) {
            counter!(
                "depth_sandbox_device_failure_total",
                "stage" => stage_label,
                "device" => result.device_index.to_string()
            )
            .increment(1);
        }
    }

    // 被容忍的错误（例如 close 顺序错误）
    let tolerated: usize = results
        .iter()
        .filter(|r| r.is_success())
        .map(|r| r.errors.len())
        .sum();
    if tolerated > 0 {
        counter!("depth_sandbox_tolerated_errors_total", "stage" => stage_label)
            .increment(tolerated as u64);
    }
}

/// 记录完成的循环
pub fn record_cycle_completed(loop_index: u32) {
    counter!("depth_sandbox_cycles_total").increment(1);
    gauge!("depth_sandbox_last_cycle").set(loop_index as f64);
}

/// 记录丢弃的旧帧数量
pub fn record_frames_drained(device_index: u32, drained: usize) {
    histogram!(
        "depth_sandbox_frames_drained",
        "device" => device_index.to_string()
    )
    .record(drained as f64);
}

/// 生命周期指标聚合器
///
/// 在内存中聚合指标，便于会话结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct LifecycleMetricsAggregator {
    /// 完成的循环数
    pub cycles: u64,

    /// 各阶段耗时统计 (ms)
    pub stage_durations: HashMap<LifecycleStage, RunningStats>,

    /// 各阶段失败设备数
    pub stage_failures: HashMap<LifecycleStage, u64>,

    /// 各阶段被容忍的错误数
    pub tolerated_errors: HashMap<LifecycleStage, u64>,
}

impl LifecycleMetricsAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新阶段统计
    pub fn update(&mut self, stage: LifecycleStage, elapsed: Duration, results: &[DeviceResult]) {
        self.stage_durations
            .entry(stage)
            .or_default()
            .push(elapsed.as_secs_f64() * 1000.0);

        let failures = results.iter().filter(|r| !r.is_success()).count() as u64;
        *self.stage_failures.entry(stage).or_insert(0) += failures;

        let tolerated: u64 = results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.errors.len() as u64)
            .sum();
        *self.tolerated_errors.entry(stage).or_insert(0) += tolerated;
    }

    /// 记录完成一个循环
    pub fn cycle_completed(&mut self) {
        self.cycles += 1;
    }

    /// 某阶段的失败设备数
    pub fn failures(&self, stage: LifecycleStage) -> u64 {
        self.stage_failures.get(&stage).copied().unwrap_or(0)
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let stage = |s: LifecycleStage| StageSummary {
            duration_ms: self
                .stage_durations
                .get(&s)
                .map(StatsSummary::from)
                .unwrap_or_default(),
            failures: self.failures(s),
            tolerated_errors: self.tolerated_errors.get(&s).copied().unwrap_or(0),
        };

        MetricsSummary {
            cycles: self.cycles,
            open: stage(LifecycleStage::Open),
            capture: stage(LifecycleStage::Capture),
            close: stage(LifecycleStage::Close),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 单阶段摘要
#[derive(Debug, Clone, Default)]
pub struct StageSummary {
    pub duration_ms: StatsSummary,
    pub failures: u64,
    pub tolerated_errors: u64,
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub cycles: u64,
    pub open: StageSummary,
    pub capture: StageSummary,
    pub close: StageSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Lifecycle Metrics Summary ===")?;
        writeln!(f, "Cycles completed: {}", self.cycles)?;
        for (name, stage) in [
            ("Open", &self.open),
            ("Capture", &self.capture),
            ("Close", &self.close),
        ] {
            writeln!(
                f,
                "{name}: failures={}, tolerated={}, duration (ms): {}",
                stage.failures, stage.tolerated_errors, stage.duration_ms
            )?;
        }
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.1}, max={:.1}, mean={:.1}, std={:.1} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
