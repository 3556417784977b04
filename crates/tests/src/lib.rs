//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 模拟 e2e 测试（无需相机硬件）
//! - 资源泄漏回归

#[cfg(test)]
mod contract_tests {
    use contracts::{
        aggregate_status, DeviceResult, DeviceStatus, PixelFormat, SandboxConfig, StreamKind,
        StreamProfileRequest,
    };

    #[test]
    fn test_default_requests() {
        let color = StreamProfileRequest::default_color();
        assert_eq!(color.stream_kind, StreamKind::Color);
        assert_eq!(color.format, PixelFormat::Bgr8);

        let depth = StreamProfileRequest::default_depth();
        assert_eq!(depth.stream_kind, StreamKind::Depth);
        assert_eq!(depth.format, PixelFormat::Z16);
        assert_eq!(depth.stream_index, 0);
    }

    #[test]
    fn test_default_config_round_trips_through_loader() {
        let toml = config_loader::ConfigLoader::to_toml(&SandboxConfig::default()).unwrap();
        let parsed = config_loader::ConfigLoader::load_from_str(&toml, config_loader::ConfigFormat::Toml)
            .unwrap();
        assert_eq!(parsed, SandboxConfig::default());
    }

    #[test]
    fn test_aggregate_is_or_of_statuses() {
        let results = [
            DeviceResult::success(0),
            DeviceResult::failure(1, "boom"),
            DeviceResult::success(2),
        ];
        assert_eq!(aggregate_status(&results), DeviceStatus::Failure);
        assert_eq!(aggregate_status(&results[..1]), DeviceStatus::Success);
        assert_eq!(aggregate_status(std::iter::empty()), DeviceStatus::Success);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use contracts::{
        Console, DeviceContext, DeviceStatus, FailurePolicy, Frame, FrameSet, FrameSynchronizer,
        ReportLevel, SandboxConfig, SdkError, SdkResult, SensorKind, SimulationConfig,
        StreamProfileRequest, SynchronizerHandle,
    };
    use fleet::{
        CallPhase, DeviceStreams, FleetConfig, FleetCoordinator, FleetError, LeakCheckSession,
        MockConfig, MockContext, MockDeviceConfig, MockSensorConfig, OpenedFleet, SensorOp,
    };

    /// 记录输出，按脚本回答暂停提示
    #[derive(Default)]
    struct ScriptedConsole {
        lines: Mutex<Vec<String>>,
        answers: Mutex<VecDeque<bool>>,
    }

    impl ScriptedConsole {
        fn quitting_after(continues: usize) -> Self {
            let mut answers: VecDeque<bool> = std::iter::repeat(false).take(continues).collect();
            answers.push_back(true);
            Self {
                answers: Mutex::new(answers),
                ..Default::default()
            }
        }

        fn has_line(&self, text: &str) -> bool {
            self.lines.lock().unwrap().iter().any(|l| l.contains(text))
        }
    }

    impl Console for ScriptedConsole {
        fn report(&self, _level: ReportLevel, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }

        fn wait_for_user_continue(&self) -> bool {
            self.answers.lock().unwrap().pop_front().unwrap_or(false)
        }
    }

    fn fast_fleet_config() -> FleetConfig {
        FleetConfig {
            settle_delay: Duration::ZERO,
            frame_timeout: Duration::from_secs(2),
            frame_capture_count: 2,
            ..Default::default()
        }
    }

    fn without_depth_profile(index: u32) -> MockDeviceConfig {
        MockDeviceConfig {
            depth: Some(MockSensorConfig::depth().without(&StreamProfileRequest::default_depth())),
            ..MockDeviceConfig::d435(index)
        }
    }

    /// 设备 1 缺少深度 profile：设备 0 被回滚，设备 1 从未被打开
    #[tokio::test]
    async fn test_open_failure_rolls_back_healthy_device() {
        let context = Arc::new(MockContext::new(
            MockConfig {
                devices: vec![MockDeviceConfig::d435(0), without_depth_profile(1)],
                ..Default::default()
            }
            .with_frame_interval(Duration::from_millis(5)),
        ));
        let coordinator = FleetCoordinator::new(context.clone(), fast_fleet_config());
        let devices = context.query_devices().unwrap();

        let err = coordinator.open_all(&devices).await.unwrap_err();
        let FleetError::OpenFailed { results } = err else {
            panic!("expected OpenFailed, got {err:?}");
        };
        assert_eq!(results[0].status, DeviceStatus::Success);
        assert_eq!(results[1].status, DeviceStatus::Failure);
        assert!(results[1].errors[0].contains("depth"));

        let log = context.event_log();
        // device 0: opened, started, then stopped and closed by the rollback
        for op in [SensorOp::Open, SensorOp::Start, SensorOp::Stop, SensorOp::Close] {
            for kind in [SensorKind::Color, SensorKind::Depth] {
                assert_eq!(log.count(0, kind, op, CallPhase::Exit), 1, "device 0 {kind} {op}");
            }
        }
        // device 1: never touched
        assert!(log.events_for(1).is_empty());
        assert_eq!(context.live_synchronizers(), 0);
    }

    #[tokio::test]
    async fn test_many_devices_some_failing() {
        let total = 6u32;
        let failing = [1u32, 4];
        let devices = (0..total)
            .map(|i| {
                if failing.contains(&i) {
                    without_depth_profile(i)
                } else {
                    MockDeviceConfig::d435(i)
                }
            })
            .collect();
        let context = Arc::new(MockContext::new(
            MockConfig {
                devices,
                ..Default::default()
            }
            .with_frame_interval(Duration::from_millis(5)),
        ));
        let coordinator = FleetCoordinator::new(context.clone(), fast_fleet_config());
        let handles = context.query_devices().unwrap();

        let Err(FleetError::OpenFailed { results }) = coordinator.open_all(&handles).await else {
            panic!("expected OpenFailed");
        };
        assert_eq!(results.len(), total as usize);
        let failed: Vec<u32> = results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.device_index)
            .collect();
        assert_eq!(failed, failing);

        for device in context.mock_devices() {
            for kind in [SensorKind::Color, SensorKind::Depth] {
                let sensor = match kind {
                    SensorKind::Color => device.color_sensor(),
                    _ => device.depth_sensor(),
                }
                .unwrap();
                assert_eq!(sensor.state().to_string(), "closed");
            }
        }
    }

    /// 流在两帧后卡住：等待在超时上限处放弃，其它设备不受影响
    #[tokio::test]
    async fn test_stalled_device_times_out_without_blocking_siblings() {
        let stall = |sensor: MockSensorConfig| {
            Some(MockSensorConfig {
                stall_after_frames: Some(2),
                ..sensor
            })
        };
        let context = Arc::new(MockContext::new(
            MockConfig {
                devices: vec![
                    MockDeviceConfig {
                        color: stall(MockSensorConfig::color()),
                        depth: stall(MockSensorConfig::depth()),
                        ..MockDeviceConfig::d435(0)
                    },
                    MockDeviceConfig::d435(1),
                ],
                ..Default::default()
            }
            .with_frame_interval(Duration::from_millis(5)),
        ));
        let coordinator = FleetCoordinator::new(
            context.clone(),
            FleetConfig {
                frame_timeout: Duration::from_millis(200),
                frame_capture_count: 4,
                ..fast_fleet_config()
            },
        );
        let fleet = coordinator
            .open_all(&context.query_devices().unwrap())
            .await
            .unwrap();

        let results = coordinator.capture_all(&fleet).await;
        assert_eq!(results[0].status, DeviceStatus::Failure);
        assert!(
            results[0].errors[0].contains("frame didn't arrive within 200ms"),
            "{:?}",
            results[0].errors
        );
        assert_eq!(results[1].status, DeviceStatus::Success);

        let closed = coordinator.close_all(&fleet).await;
        assert!(closed.iter().all(|r| r.is_success()));
        drop(fleet);
        assert_eq!(context.live_synchronizers(), 0);
    }

    /// 只交付前两个帧组，之后每次等待都以超时返回（不真正阻塞）
    struct TwoSetsThenSilence {
        delivered: Mutex<u32>,
    }

    impl FrameSynchronizer for TwoSetsThenSilence {
        fn push_frame(&self, _frame: Frame) {}

        fn poll_for_frames(&self) -> Option<FrameSet> {
            None
        }

        fn wait_for_frames(&self, timeout: Duration) -> SdkResult<FrameSet> {
            let mut delivered = self.delivered.lock().unwrap();
            if *delivered == 2 {
                return Err(SdkError::Timeout {
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            *delivered += 1;
            Ok(FrameSet::default())
        }
    }

    #[tokio::test]
    async fn test_third_capture_never_delivered() {
        let context = Arc::new(MockContext::new(MockConfig::with_devices(1)));
        let device = &context.mock_devices()[0];
        let synchronizer: SynchronizerHandle = Arc::new(TwoSetsThenSilence {
            delivered: Mutex::new(0),
        });
        let fleet = OpenedFleet::from_streams([DeviceStreams {
            device_index: 0,
            color: device.color_sensor().unwrap(),
            depth: device.depth_sensor().unwrap(),
            synchronizer,
        }]);
        let coordinator = FleetCoordinator::new(
            context.clone(),
            FleetConfig {
                frame_capture_count: 4,
                frame_timeout: Duration::from_millis(8000),
                ..fast_fleet_config()
            },
        );

        let results = tokio::time::timeout(Duration::from_secs(5), coordinator.capture_all(&fleet))
            .await
            .expect("capture stage must complete");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, DeviceStatus::Failure);
        assert_eq!(
            results[0].errors,
            vec!["capture #3 failed: frame didn't arrive within 8000ms".to_string()]
        );
    }

    #[tokio::test]
    async fn test_full_session_releases_everything() {
        let context = Arc::new(MockContext::from_simulation(&SimulationConfig {
            device_count: 3,
            frame_interval_ms: 5,
        }));
        let console = Arc::new(ScriptedConsole::default());
        let session = LeakCheckSession::new(
            context.clone(),
            console.clone(),
            SandboxConfig {
                loop_count: 3,
                frame_capture_count: 2,
                frame_timeout_ms: 2000,
                settle_delay_ms: 0,
                ..Default::default()
            },
        );

        let stats = session.run().await.unwrap();
        assert_eq!(stats.cycles_completed, 3);
        assert!(!stats.quit_early);
        assert_eq!(stats.open_failures + stats.capture_failures + stats.close_failures, 0);
        assert!(console.has_line("3 DEVICES FOUND!"));
        assert!(console.has_line("LOOP 2"));

        // bookkeeping of the simulated backend stays flat across cycles
        assert!(context.event_log().is_empty());
        assert!(context.tracked_synchronizers() <= 3);
        assert_eq!(context.live_synchronizers(), 0);
        for device in context.mock_devices() {
            assert_eq!(device.color_sensor().unwrap().state().to_string(), "closed");
            assert_eq!(device.depth_sensor().unwrap().state().to_string(), "closed");
        }
    }

    #[tokio::test]
    async fn test_operator_quits_between_cycles() {
        let context = Arc::new(MockContext::from_simulation(&SimulationConfig {
            device_count: 1,
            frame_interval_ms: 5,
        }));
        let console = Arc::new(ScriptedConsole::quitting_after(1));
        let session = LeakCheckSession::new(
            context.clone(),
            console.clone(),
            SandboxConfig {
                loop_count: 10,
                frame_capture_count: 1,
                settle_delay_ms: 0,
                ..Default::default()
            },
        );

        let stats = session.run().await.unwrap();
        assert!(stats.quit_early);
        assert!(stats.cycles_completed < 10);
        assert_eq!(context.live_synchronizers(), 0);
    }

    #[tokio::test]
    async fn test_strict_session_stops_on_capture_failure() {
        let context = Arc::new(MockContext::new(
            MockConfig {
                devices: vec![MockDeviceConfig {
                    depth: Some(MockSensorConfig {
                        stall_after_frames: Some(0),
                        ..MockSensorConfig::depth()
                    }),
                    color: Some(MockSensorConfig {
                        stall_after_frames: Some(0),
                        ..MockSensorConfig::color()
                    }),
                    ..MockDeviceConfig::d435(0)
                }],
                ..Default::default()
            }
            .with_frame_interval(Duration::from_millis(5)),
        ));
        let console = Arc::new(ScriptedConsole::default());
        let session = LeakCheckSession::new(
            context.clone(),
            console.clone(),
            SandboxConfig {
                loop_count: 3,
                frame_capture_count: 1,
                frame_timeout_ms: 50,
                settle_delay_ms: 0,
                failure_policy: FailurePolicy::Strict,
                pause_between_cycles: false,
                ..Default::default()
            },
        );

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, FleetError::StageFailed { .. }), "{err:?}");
        assert!(console.has_line("DEVICE 0: capture #1 failed"));
    }

    #[tokio::test]
    async fn test_session_from_config_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
mode = "single"
loop_count = 2
settle_delay_ms = 0
capture_in_single_mode = true
frame_capture_count = 1
pause_between_cycles = false

[simulation]
device_count = 2
frame_interval_ms = 5
"#
        )
        .unwrap();

        let config = config_loader::ConfigLoader::load_from_path(file.path()).unwrap();
        let context = Arc::new(MockContext::new(
            MockConfig::with_devices(config.simulation.device_count)
                .with_frame_interval(Duration::from_millis(config.simulation.frame_interval_ms)),
        ));
        let console = Arc::new(ScriptedConsole::default());
        let session = LeakCheckSession::new(context.clone(), console, config);

        let stats = session.run().await.unwrap();
        assert_eq!(stats.cycles_completed, 2);

        // single mode only ever drives the first camera
        let log = context.event_log();
        assert!(log.events_for(1).is_empty());
        for kind in [SensorKind::Color, SensorKind::Depth] {
            assert_eq!(log.count(0, kind, SensorOp::Close, CallPhase::Enter), 2);
        }
        assert_eq!(context.live_synchronizers(), 0);
    }
}
