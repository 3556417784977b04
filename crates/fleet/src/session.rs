//! Leak-check session driver
//!
//! Runs the lifecycle experiment `loop_count` times, reporting progress through
//! the [`Console`] and pausing between cycles so the operator can take a memory
//! snapshot. All SDK resources of a cycle are dropped before the pause.
//!
//! A shutdown request (see [`LeakCheckSession::with_shutdown`]) interrupts the
//! session at the next safe point: streams that are open get stopped and closed
//! before [`FleetError::Interrupted`] is returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{
    Console, DeviceContext, DeviceHandle, DeviceResult, LifecycleStage, SandboxConfig, SessionMode,
};
use observability::{LifecycleMetricsAggregator, MetricsSummary};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::coordinator::{FleetConfig, FleetCoordinator, OpenedFleet};
use crate::error::{FleetError, Result};
use crate::single::SingleDeviceSession;

/// Outcome of a session
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionStats {
    pub mode: SessionMode,
    pub cycles_completed: u32,
    /// Operator quit before `loop_count` cycles ran
    pub quit_early: bool,
    pub open_failures: u64,
    pub capture_failures: u64,
    pub close_failures: u64,
    /// Errors swallowed under the tolerant policy
    pub tolerated_errors: u64,
    /// Wall time of every completed cycle
    pub cycle_durations_ms: Vec<u64>,
    #[serde(skip)]
    pub metrics: MetricsSummary,
}

/// Session driver
pub struct LeakCheckSession {
    context: Arc<dyn DeviceContext>,
    console: Arc<dyn Console>,
    config: SandboxConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

/// Per-run bookkeeping
#[derive(Default)]
struct Tally {
    aggregator: LifecycleMetricsAggregator,
    stats: SessionStats,
}

impl Tally {
    fn stage(&mut self, stage: LifecycleStage, elapsed: Duration, results: &[DeviceResult]) {
        observability::record_stage_metrics(stage, elapsed, results);
        self.aggregator.update(stage, elapsed, results);
    }

    fn cycle(&mut self, loop_index: u32, elapsed: Duration) {
        observability::record_cycle_completed(loop_index);
        self.aggregator.cycle_completed();
        self.stats.cycles_completed += 1;
        self.stats.cycle_durations_ms.push(millis(elapsed));
    }

    fn finish(mut self) -> SessionStats {
        let summary = self.aggregator.summary();
        info!("\n{summary}");
        self.stats.open_failures = summary.open.failures;
        self.stats.capture_failures = summary.capture.failures;
        self.stats.close_failures = summary.close.failures;
        self.stats.tolerated_errors = summary.open.tolerated_errors
            + summary.capture.tolerated_errors
            + summary.close.tolerated_errors;
        self.stats.metrics = summary;
        self.stats
    }
}

impl LeakCheckSession {
    pub fn new(
        context: Arc<dyn DeviceContext>,
        console: Arc<dyn Console>,
        config: SandboxConfig,
    ) -> Self {
        Self {
            context,
            console,
            config,
            shutdown: None,
        }
    }

    /// 收到 `true` 即中断会话
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run the session, release the SDK context, then offer a last snapshot
    ///
    /// The final prompt is only shown once the context and every handle of
    /// the session were dropped, so the snapshot shows what the SDK keeps
    /// after teardown.
    ///
    /// # Errors
    /// Same as [`LeakCheckSession::run`].
    pub async fn run_to_exit(self) -> Result<SessionStats> {
        let stats = self.run().await?;

        let Self {
            context,
            console,
            config,
            shutdown,
        } = self;
        drop(context);

        console.info("Take a snapshot of memory here");
        if config.pause_between_cycles {
            console.info("Input Something & press Enter to quit...");
            if wait_for_operator(&console, shutdown.as_ref()).await.is_err() {
                info!("shutdown requested at the final prompt");
            }
        }

        Ok(stats)
    }

    /// Run the configured session
    ///
    /// # Errors
    /// Fleet-level failures: enumeration error, no devices, open failure (after
    /// rollback), a single-mode cycle failure, and under the strict policy any
    /// capture or close failure.
    #[instrument(name = "leak_check_session", skip(self), fields(mode = ?self.config.mode, loops = self.config.loop_count))]
    pub async fn run(&self) -> Result<SessionStats> {
        self.console.info("Starting Depth Sandbox Program.");
        self.console
            .info(&format!("SDK Library Version: {}", self.context.api_version()));

        let mut tally = Tally::default();
        tally.stats.mode = self.config.mode;

        let outcome = match self.config.mode {
            SessionMode::Fleet => self.run_fleet(&mut tally).await,
            SessionMode::Single => self.run_single(&mut tally).await,
        };

        self.console.info("Closing Depth Sandbox Program.");
        let stats = tally.finish();
        outcome.map(|()| stats)
    }

    async fn run_fleet(&self, tally: &mut Tally) -> Result<()> {
        let coordinator = FleetCoordinator::new(
            Arc::clone(&self.context),
            FleetConfig::from(&self.config),
        );
        let strict = self.config.failure_policy.is_strict();

        for loop_index in 0..self.config.loop_count {
            if self.is_interrupted() {
                return Err(FleetError::Interrupted);
            }
            let cycle_started = Instant::now();
            self.console.info(&format!("LOOP {loop_index}"));

            let devices = self.enumerate().await?;
            self.console
                .info(&format!("{} DEVICES FOUND!", devices.len()));

            self.console.info("DEVICES OPENING");
            let started = Instant::now();
            let fleet = match coordinator.open_all(&devices).await {
                Ok(fleet) => {
                    tally.stage(LifecycleStage::Open, started.elapsed(), fleet.results());
                    fleet
                }
                Err(e) => {
                    tally.stage(LifecycleStage::Open, started.elapsed(), e.results());
                    self.report_failures(e.results());
                    self.console.error("DEVICES OPENING FAILED. EXITING.");
                    return Err(e);
                }
            };
            self.console.info(&format!(
                "DEVICES OPENING COMPLETE. TOOK {}ms",
                millis(started.elapsed())
            ));
            if self.is_interrupted() {
                self.abandon(&coordinator, &fleet, tally).await;
                return Err(FleetError::Interrupted);
            }

            self.console.info("DEVICES CAPTURING");
            let started = Instant::now();
            let captured = tokio::select! {
                captured = coordinator.capture_all(&fleet) => captured,
                () = shutdown_requested(self.shutdown.as_ref()) => {
                    self.abandon(&coordinator, &fleet, tally).await;
                    return Err(FleetError::Interrupted);
                }
            };
            tally.stage(LifecycleStage::Capture, started.elapsed(), &captured);
            self.report_failures(&captured);
            self.console.info(&format!(
                "DEVICES CAPTURING COMPLETE. TOOK {}ms",
                millis(started.elapsed())
            ));

            self.console.info("DEVICES CLOSING");
            let started = Instant::now();
            let closed = coordinator.close_all(&fleet).await;
            tally.stage(LifecycleStage::Close, started.elapsed(), &closed);
            self.report_failures(&closed);
            self.console.info(&format!(
                "DEVICES CLOSING COMPLETE. TOOK {}ms",
                millis(started.elapsed())
            ));

            drop(fleet);
            drop(devices);
            self.console.info("Synchronizers should be destroyed");
            tally.cycle(loop_index, cycle_started.elapsed());

            if strict {
                for (stage, results) in [(LifecycleStage::Capture, captured), (LifecycleStage::Close, closed)] {
                    if contracts::aggregate_status(&results).is_failure() {
                        self.console
                            .error(&format!("DEVICES {} FAILED. EXITING.", stage.as_str().to_uppercase()));
                        return Err(FleetError::StageFailed { stage, results });
                    }
                }
            }

            if self.pause().await? {
                tally.stats.quit_early = loop_index + 1 < self.config.loop_count;
                break;
            }
        }

        Ok(())
    }

    /// 中断时关闭已打开的流
    async fn abandon(&self, coordinator: &FleetCoordinator, fleet: &OpenedFleet, tally: &mut Tally) {
        warn!("shutdown requested, closing open devices");
        self.console.error("INTERRUPTED. DEVICES CLOSING");
        let started = Instant::now();
        let closed = coordinator.close_all(fleet).await;
        tally.stage(LifecycleStage::Close, started.elapsed(), &closed);
        self.report_failures(&closed);
        self.console.info(&format!(
            "DEVICES CLOSING COMPLETE. TOOK {}ms",
            millis(started.elapsed())
        ));
    }

    async fn run_single(&self, tally: &mut Tally) -> Result<()> {
        let devices = self.enumerate().await?;
        self.console
            .info(&format!("{} DEVICES FOUND!", devices.len()));

        let context = Arc::clone(&self.context);
        let device = Arc::clone(&devices[0]);
        let config = FleetConfig::from(&self.config);
        let session = tokio::task::spawn_blocking(move || {
            SingleDeviceSession::prepare(context, &device, config)
        })
        .await
        .map_err(|e| aborted(0, e))?
        .map_err(|source| {
            self.console.error(&format!("DEVICE 0: {source}"));
            FleetError::Device { index: 0, source }
        })?;
        let session = Arc::new(session);
        drop(devices);

        let capture = self.config.capture_in_single_mode;
        for loop_index in 0..self.config.loop_count {
            if self.is_interrupted() {
                release(&session).await;
                return Err(FleetError::Interrupted);
            }
            self.console.info(&format!("LOOP {loop_index}"));
            self.console.info("Opening / Starting Sensors");

            let started = Instant::now();
            let worker = Arc::clone(&session);
            let cycle = tokio::task::spawn_blocking(move || worker.cycle(capture))
                .await
                .map_err(|e| aborted(0, e))?;
            if let Err(source) = cycle {
                self.console.error(&format!("DEVICE 0: {source}"));
                release(&session).await;
                return Err(FleetError::Device { index: 0, source });
            }

            self.console.info("Stopping / Closing Sensors Complete");
            self.console.info("Synchronizer should be destroyed");
            tally.cycle(loop_index, started.elapsed());

            let quit = match self.pause().await {
                Ok(quit) => quit,
                Err(e) => {
                    release(&session).await;
                    return Err(e);
                }
            };
            if quit {
                tally.stats.quit_early = loop_index + 1 < self.config.loop_count;
                release(&session).await;
                break;
            }
        }

        Ok(())
    }

    /// Enumerate devices; an empty list is fatal
    async fn enumerate(&self) -> Result<Vec<DeviceHandle>> {
        let context = Arc::clone(&self.context);
        let devices = tokio::task::spawn_blocking(move || context.query_devices())
            .await
            .map_err(|e| aborted(0, e))?;

        match devices {
            Ok(devices) if devices.is_empty() => {
                self.console.error("NO DEVICES FOUND!");
                Err(FleetError::NoDevices)
            }
            Ok(devices) => Ok(devices),
            Err(e) => {
                self.console
                    .error(&format!("DEVICE ENUMERATION FAILED: {e}"));
                Err(FleetError::Enumeration(e))
            }
        }
    }

    /// Every reason recorded for a device, failed or tolerated
    fn report_failures(&self, results: &[DeviceResult]) {
        for result in results {
            for error in &result.errors {
                self.console
                    .error(&format!("DEVICE {}: {error}", result.device_index));
            }
        }
    }

    /// Memory-snapshot prompt; returns `true` when the operator quit
    async fn pause(&self) -> Result<bool> {
        self.console.info("Take a snapshot of memory here");
        if !self.config.pause_between_cycles {
            return Ok(false);
        }
        self.console
            .info("Input Something & press Enter to continue...");
        self.console.info("Input \"q\" & press Enter to quit");

        wait_for_operator(&self.console, self.shutdown.as_ref()).await
    }

    fn is_interrupted(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// 阻塞读取操作员输入，与关闭信号竞争
///
/// # Errors
/// 等待期间收到关闭请求时返回 `FleetError::Interrupted`。
async fn wait_for_operator(
    console: &Arc<dyn Console>,
    shutdown: Option<&watch::Receiver<bool>>,
) -> Result<bool> {
    let console = Arc::clone(console);
    let answer = tokio::task::spawn_blocking(move || console.wait_for_user_continue());

    tokio::select! {
        answer = answer => match answer {
            Ok(quit) => Ok(quit),
            Err(e) => {
                warn!(error = %e, "console wait aborted, quitting");
                Ok(true)
            }
        },
        () = shutdown_requested(shutdown) => Err(FleetError::Interrupted),
    }
}

/// Resolves once shutdown was requested; pending forever without a receiver
async fn shutdown_requested(shutdown: Option<&watch::Receiver<bool>>) {
    if let Some(rx) = shutdown {
        let mut rx = rx.clone();
        let closed = rx.wait_for(|requested| *requested).await.is_err();
        if !closed {
            return;
        }
    }
    std::future::pending::<()>().await;
}

async fn release(session: &Arc<SingleDeviceSession>) {
    let worker = Arc::clone(session);
    if let Err(e) = tokio::task::spawn_blocking(move || worker.release()).await {
        warn!(error = %e, "release aborted");
    }
}

fn aborted(index: u32, e: tokio::task::JoinError) -> FleetError {
    FleetError::Device {
        index,
        source: crate::error::DeviceError::TaskAborted {
            message: e.to_string(),
        },
    }
}

fn millis(elapsed: Duration) -> u64 {
    elapsed.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Mutex, Weak};

    use super::*;
    use contracts::{FailurePolicy, ReportLevel, SimulationConfig};

    use crate::mock::{MockConfig, MockContext, MockDeviceConfig, MockSensorConfig, SensorState};

    /// 记录所有输出，按脚本回答是否退出
    #[derive(Default)]
    struct RecordingConsole {
        lines: Mutex<Vec<(ReportLevel, String)>>,
        answers: Mutex<VecDeque<bool>>,
        waits: Mutex<u32>,
        /// 每次等待时被观察的 context 是否仍然存活
        watched: Mutex<Option<Weak<MockContext>>>,
        alive_at_wait: Mutex<Vec<bool>>,
    }

    impl RecordingConsole {
        fn answering(answers: impl IntoIterator<Item = bool>) -> Self {
            Self {
                answers: Mutex::new(answers.into_iter().collect()),
                ..Default::default()
            }
        }

        fn lines(&self, level: ReportLevel) -> Vec<String> {
            self.lines
                .lock()
                .unwrap()
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, line)| line.clone())
                .collect()
        }

        fn contains(&self, text: &str) -> bool {
            self.lines.lock().unwrap().iter().any(|(_, l)| l.contains(text))
        }

        fn last_lines(&self, n: usize) -> Vec<String> {
            let lines = self.lines.lock().unwrap();
            lines[lines.len().saturating_sub(n)..]
                .iter()
                .map(|(_, line)| line.clone())
                .collect()
        }

        fn watch(&self, context: &Arc<MockContext>) {
            *self.watched.lock().unwrap() = Some(Arc::downgrade(context));
        }
    }

    impl Console for RecordingConsole {
        fn report(&self, level: ReportLevel, line: &str) {
            self.lines.lock().unwrap().push((level, line.to_string()));
        }

        fn wait_for_user_continue(&self) -> bool {
            *self.waits.lock().unwrap() += 1;
            if let Some(watched) = self.watched.lock().unwrap().as_ref() {
                self.alive_at_wait
                    .lock()
                    .unwrap()
                    .push(watched.upgrade().is_some());
            }
            self.answers.lock().unwrap().pop_front().unwrap_or(false)
        }
    }

    /// 等待输入时发出关闭请求，然后像没人应答一样阻塞一会儿
    struct SignallingConsole {
        inner: RecordingConsole,
        shutdown: watch::Sender<bool>,
        hold: Duration,
    }

    impl Console for SignallingConsole {
        fn report(&self, level: ReportLevel, line: &str) {
            self.inner.report(level, line);
        }

        fn wait_for_user_continue(&self) -> bool {
            *self.inner.waits.lock().unwrap() += 1;
            self.shutdown.send_replace(true);
            std::thread::sleep(self.hold);
            false
        }
    }

    fn assert_all_closed(context: &MockContext) {
        for device in context.mock_devices() {
            assert_eq!(device.color_sensor().unwrap().state(), SensorState::Closed);
            assert_eq!(device.depth_sensor().unwrap().state(), SensorState::Closed);
        }
    }

    fn config(loops: u32) -> SandboxConfig {
        SandboxConfig {
            loop_count: loops,
            frame_capture_count: 2,
            frame_timeout_ms: 2000,
            settle_delay_ms: 0,
            simulation: SimulationConfig {
                device_count: 2,
                frame_interval_ms: 5,
            },
            ..Default::default()
        }
    }

    fn session(
        mock: MockConfig,
        console: &Arc<RecordingConsole>,
        config: SandboxConfig,
    ) -> (Arc<MockContext>, LeakCheckSession) {
        let context = Arc::new(MockContext::new(mock.with_frame_interval(Duration::from_millis(5))));
        let session = LeakCheckSession::new(context.clone(), console.clone(), config);
        (context, session)
    }

    #[tokio::test]
    async fn test_fleet_session_runs_all_cycles() {
        let console = Arc::new(RecordingConsole::default());
        let (context, session) = session(MockConfig::with_devices(2), &console, config(3));

        let stats = session.run().await.unwrap();

        assert_eq!(stats.cycles_completed, 3);
        assert!(!stats.quit_early);
        assert_eq!(stats.open_failures + stats.capture_failures + stats.close_failures, 0);
        assert_eq!(stats.cycle_durations_ms.len(), 3);
        assert_eq!(*console.waits.lock().unwrap(), 3);
        assert!(console.contains("LOOP 2"));
        assert!(console.contains("2 DEVICES FOUND!"));
        assert!(console.contains("DEVICES CLOSING COMPLETE. TOOK"));
        assert!(console.lines(ReportLevel::Error).is_empty());
        assert_eq!(context.live_synchronizers(), 0);
    }

    #[tokio::test]
    async fn test_operator_quit_stops_loop() {
        let console = Arc::new(RecordingConsole::answering([false, true]));
        let (_context, session) = session(MockConfig::with_devices(1), &console, config(5));

        let stats = session.run().await.unwrap();

        assert_eq!(stats.cycles_completed, 2);
        assert!(stats.quit_early);
        assert!(!console.contains("LOOP 2"));
    }

    #[tokio::test]
    async fn test_no_pause_never_waits() {
        let console = Arc::new(RecordingConsole::answering([true]));
        let config = SandboxConfig {
            pause_between_cycles: false,
            ..config(2)
        };
        let (_context, session) = session(MockConfig::with_devices(1), &console, config);

        let stats = session.run().await.unwrap();
        assert_eq!(stats.cycles_completed, 2);
        assert_eq!(*console.waits.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_no_devices_is_fatal() {
        let console = Arc::new(RecordingConsole::default());
        let (_context, session) = session(MockConfig::with_devices(0), &console, config(1));

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, FleetError::NoDevices));
        assert_eq!(console.lines(ReportLevel::Error), vec!["NO DEVICES FOUND!"]);
    }

    #[tokio::test]
    async fn test_open_failure_is_fatal() {
        let console = Arc::new(RecordingConsole::default());
        let mock = MockConfig {
            devices: vec![
                MockDeviceConfig::d435(0),
                MockDeviceConfig {
                    depth: Some(MockSensorConfig::depth().without(&contracts::StreamProfileRequest::default_depth())),
                    ..MockDeviceConfig::d435(1)
                },
            ],
            ..Default::default()
        };
        let (_context, session) = session(mock, &console, config(3));

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, FleetError::OpenFailed { .. }));
        assert!(console.contains("DEVICE 1: depth stream profile not found"));
        assert!(console.contains("DEVICES OPENING FAILED. EXITING."));
        assert!(!console.contains("LOOP 1"));
    }

    #[tokio::test]
    async fn test_close_errors_tolerated_then_fatal_when_strict() {
        let mock = || MockConfig {
            devices: vec![MockDeviceConfig {
                color: Some(MockSensorConfig {
                    fail_close: true,
                    ..MockSensorConfig::color()
                }),
                ..MockDeviceConfig::d435(0)
            }],
            ..Default::default()
        };

        // tolerant: a failed close is reported but the loop goes on
        let console = Arc::new(RecordingConsole::default());
        let (_context, tolerant) = session(mock(), &console, config(1));
        let stats = tolerant.run().await.unwrap();
        assert_eq!(stats.close_failures, 1);
        assert!(console.contains("DEVICE 0: unable to close color sensor"));

        let console = Arc::new(RecordingConsole::default());
        let strict_config = SandboxConfig {
            failure_policy: FailurePolicy::Strict,
            ..config(3)
        };
        let (_context, strict) = session(mock(), &console, strict_config);
        let err = strict.run().await.unwrap_err();
        assert!(matches!(
            err,
            FleetError::StageFailed {
                stage: LifecycleStage::Close,
                ..
            }
        ));
        assert!(!console.contains("LOOP 1"));
    }

    #[tokio::test]
    async fn test_single_mode_session() {
        let console = Arc::new(RecordingConsole::answering([false, false, true]));
        let config = SandboxConfig {
            mode: SessionMode::Single,
            capture_in_single_mode: true,
            ..config(10)
        };
        let (context, session) = session(MockConfig::with_devices(2), &console, config);

        let stats = session.run().await.unwrap();

        assert_eq!(stats.mode, SessionMode::Single);
        assert_eq!(stats.cycles_completed, 3);
        assert!(stats.quit_early);
        // second camera never touched
        assert!(context.event_log().events_for(1).is_empty());
        assert_eq!(context.live_synchronizers(), 0);
    }

    #[tokio::test]
    async fn test_single_mode_invalid_device() {
        let console = Arc::new(RecordingConsole::default());
        let mock = MockConfig {
            devices: vec![MockDeviceConfig {
                valid: false,
                ..MockDeviceConfig::d435(0)
            }],
            ..Default::default()
        };
        let config = SandboxConfig {
            mode: SessionMode::Single,
            ..config(1)
        };
        let (_context, session) = session(mock, &console, config);

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, FleetError::Device { index: 0, .. }));
        assert!(console.contains("DEVICE 0: device handle invalid"));
    }

    #[tokio::test]
    async fn test_final_prompt_after_context_released() {
        let console = Arc::new(RecordingConsole::default());
        let (context, session) = session(MockConfig::with_devices(2), &console, config(2));
        console.watch(&context);
        drop(context);

        let stats = session.run_to_exit().await.unwrap();

        assert_eq!(stats.cycles_completed, 2);
        // two cycle pauses and the final prompt
        assert_eq!(*console.waits.lock().unwrap(), 3);
        assert_eq!(*console.alive_at_wait.lock().unwrap(), vec![true, true, false]);
        assert_eq!(
            console.last_lines(3),
            vec![
                "Closing Depth Sandbox Program.",
                "Take a snapshot of memory here",
                "Input Something & press Enter to quit...",
            ]
        );
    }

    #[tokio::test]
    async fn test_final_prompt_skipped_without_pause() {
        let console = Arc::new(RecordingConsole::default());
        let config = SandboxConfig {
            pause_between_cycles: false,
            ..config(1)
        };
        let (_context, session) = session(MockConfig::with_devices(1), &console, config);

        session.run_to_exit().await.unwrap();

        assert_eq!(*console.waits.lock().unwrap(), 0);
        assert_eq!(console.last_lines(1), vec!["Take a snapshot of memory here"]);
    }

    #[tokio::test]
    async fn test_shutdown_at_pause_interrupts_session() {
        let (tx, rx) = watch::channel(false);
        let console = Arc::new(SignallingConsole {
            inner: RecordingConsole::default(),
            shutdown: tx,
            hold: Duration::from_millis(300),
        });
        let context = Arc::new(MockContext::new(
            MockConfig::with_devices(2).with_frame_interval(Duration::from_millis(5)),
        ));
        let session = LeakCheckSession::new(context.clone(), console.clone(), config(5)).with_shutdown(rx);

        let err = session.run().await.unwrap_err();

        assert!(matches!(err, FleetError::Interrupted));
        assert_eq!(*console.inner.waits.lock().unwrap(), 1);
        assert!(console.inner.contains("LOOP 0"));
        assert!(!console.inner.contains("LOOP 1"));
        assert_all_closed(&context);
        assert_eq!(context.live_synchronizers(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_during_capture_closes_open_streams() {
        let stalled = |sensor: MockSensorConfig| MockSensorConfig {
            stall_after_frames: Some(0),
            ..sensor
        };
        let mock = MockConfig {
            devices: vec![
                MockDeviceConfig {
                    color: Some(stalled(MockSensorConfig::color())),
                    depth: Some(stalled(MockSensorConfig::depth())),
                    ..MockDeviceConfig::d435(0)
                },
                MockDeviceConfig::d435(1),
            ],
            ..Default::default()
        };
        let console = Arc::new(RecordingConsole::default());
        let config = SandboxConfig {
            frame_timeout_ms: 1500,
            ..config(3)
        };
        let (context, session) = session(mock, &console, config);
        let (tx, rx) = watch::channel(false);
        let session = session.with_shutdown(rx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send_replace(true);
        });
        let started = Instant::now();
        let err = session.run().await.unwrap_err();

        assert!(matches!(err, FleetError::Interrupted));
        assert!(started.elapsed() < Duration::from_millis(1400));
        assert!(console.contains("INTERRUPTED. DEVICES CLOSING"));
        assert!(!console.contains("DEVICES CAPTURING COMPLETE"));
        assert_eq!(*console.waits.lock().unwrap(), 0);
        assert_all_closed(&context);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_touches_nothing() {
        let console = Arc::new(RecordingConsole::default());
        let (context, session) = session(MockConfig::with_devices(2), &console, config(3));
        let (_tx, rx) = watch::channel(true);

        let err = session.with_shutdown(rx).run().await.unwrap_err();

        assert!(matches!(err, FleetError::Interrupted));
        assert!(!console.contains("LOOP 0"));
        assert!(context.event_log().is_empty());
    }

    #[tokio::test]
    async fn test_single_mode_shutdown_at_pause_releases_sensors() {
        let (tx, rx) = watch::channel(false);
        let console = Arc::new(SignallingConsole {
            inner: RecordingConsole::default(),
            shutdown: tx,
            hold: Duration::from_millis(300),
        });
        let context = Arc::new(MockContext::new(
            MockConfig::with_devices(1).with_frame_interval(Duration::from_millis(5)),
        ));
        let config = SandboxConfig {
            mode: SessionMode::Single,
            capture_in_single_mode: true,
            ..config(4)
        };
        let session = LeakCheckSession::new(context.clone(), console.clone(), config).with_shutdown(rx);

        let err = session.run().await.unwrap_err();

        assert!(matches!(err, FleetError::Interrupted));
        assert_eq!(*console.inner.waits.lock().unwrap(), 1);
        assert_all_closed(&context);
        assert_eq!(context.live_synchronizers(), 0);
    }

    #[test]
    fn test_session_stats_serialize() {
        let stats = SessionStats {
            cycles_completed: 2,
            cycle_durations_ms: vec![10, 12],
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["cycles_completed"], 2);
        assert_eq!(json["mode"], "fleet");
        assert!(json.get("metrics").is_none());
    }
}
