//! 会话生命周期集成测试（Mock 控制器）
//!
//! 覆盖 FIFO 与序列号、重置原子性、握手重试、畸形帧恢复、关闭活性与输入校验。

use fs100_driver::{
    DriverBuilder, DriverConfig, DriverError, DriverEvent, Fs100Driver, MotionCtrlCommand,
    MotionReplyResult, RetryPolicy, SessionState, TrajectoryPoint,
};
use fs100_net::MockController;
use fs100_net::mock::reply_with;
use fs100_protocol::{Body, Frame};
use serial_test::serial;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn fast_policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::until_acknowledged()
        .with_max_attempts(attempts)
        .with_interval(Duration::from_millis(1))
        .with_reply_timeout(Duration::from_millis(200))
}

fn mock_driver(controller: &MockController) -> Fs100Driver {
    DriverBuilder::new()
        .config(DriverConfig::with_host("mock"))
        .connector(controller.connector())
        .build()
        .unwrap()
}

fn point(marker: f32, time: f32) -> TrajectoryPoint {
    TrajectoryPoint::new([marker, 0.0, 0.0, 0.0, 0.0, 0.0], [0.0; 6], time)
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// 所有已发送帧的序列号（指令与轨迹点）
fn sent_sequences(controller: &MockController) -> Vec<i32> {
    controller
        .sent_frames()
        .iter()
        .filter_map(|f| f.sequence())
        .collect()
}

#[test]
#[serial]
fn test_points_streamed_in_fifo_order() {
    let controller = MockController::default();
    controller.acknowledge_all();
    let mut driver = mock_driver(&controller);

    driver.connect().unwrap();
    driver.start(fast_policy(1)).unwrap();
    assert_eq!(driver.state(), SessionState::Ready);

    for i in 0..20 {
        driver.enqueue_point(point(i as f32, 0.1)).unwrap();
    }
    assert!(controller.wait_for_sent(21, WAIT));
    assert!(wait_until(|| driver.state() == SessionState::Streaming));

    let points = controller.sent_points();
    assert_eq!(points.len(), 20);
    for (i, (seq, time, positions)) in points.iter().enumerate() {
        // START_TRAJ_MODE 使用序列号 0
        assert_eq!(*seq, i as i32 + 1);
        assert_eq!(positions[0], i as f32);
        assert!((time - 0.1 * (i as f32 + 1.0)).abs() < 1e-4);
    }

    assert!(wait_until(|| driver.metrics().points_sent == 20));
    assert_eq!(driver.metrics().control_sent, 1);
    driver.close();
}

#[test]
#[serial]
fn test_points_wait_for_trajectory_mode() {
    let controller = MockController::default();
    controller.acknowledge_all();
    let mut driver = mock_driver(&controller);

    // 未连接时也可入队，点在队列中等待
    driver.enqueue(&[0.0; 6], &[0.0; 6], 0.2).unwrap();
    driver.connect().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert!(controller.sent_points().is_empty());
    assert_eq!(driver.queue_len(), 1);

    driver.start(fast_policy(1)).unwrap();
    assert!(controller.wait_for_sent(2, WAIT));
    assert!(driver.wait_until_drained(WAIT));

    let frames = controller.sent_frames();
    assert!(matches!(frames[0].body, Body::MotionCtrl(_)));
    assert!(matches!(frames[1].body, Body::JointTrajPtFull(_)));
}

#[test]
#[serial]
fn test_reset_discards_pending_points() {
    let controller = MockController::default();
    controller.set_responder(|frame| {
        if matches!(frame.body, Body::JointTrajPtFull(_)) {
            std::thread::sleep(Duration::from_millis(1));
        }
        reply_with(frame, MotionReplyResult::Success)
            .into_iter()
            .collect()
    });
    let mut driver = mock_driver(&controller);
    driver.connect().unwrap();
    driver.start(fast_policy(3)).unwrap();

    for _ in 0..200 {
        driver.enqueue_point(point(1.0, 0.01)).unwrap();
    }
    assert!(controller.wait_for_sent(10, WAIT));

    driver.reset_trajectory(fast_policy(3)).unwrap();
    assert_eq!(driver.state(), SessionState::Ready);

    for _ in 0..3 {
        driver.enqueue_point(point(100.0, 0.5)).unwrap();
    }
    assert!(wait_until(|| {
        controller
            .sent_points()
            .iter()
            .filter(|(_, _, p)| p[0] == 100.0)
            .count()
            == 3
    }));

    let frames = controller.sent_frames();
    let stop_index = frames
        .iter()
        .position(|f| {
            matches!(f.body, Body::MotionCtrl(c) if c.command() == Some(MotionCtrlCommand::StopTrajMode))
        })
        .unwrap();

    // STOP 之后不再出现旧轨迹的点
    let mut new_times = Vec::new();
    for frame in &frames[stop_index..] {
        if let Body::JointTrajPtFull(pt) = frame.body {
            assert_eq!(pt.positions[0], 100.0);
            new_times.push(pt.time);
        }
    }
    // 新轨迹的时间从 0 重新累计
    assert_eq!(new_times.len(), 3);
    assert!((new_times[0] - 0.5).abs() < 1e-5);
    assert!((new_times[2] - 1.5).abs() < 1e-5);

    // 每个旧点要么已发送，要么被计入丢弃
    let old_sent = frames[..stop_index]
        .iter()
        .filter(|f| matches!(f.body, Body::JointTrajPtFull(_)))
        .count() as u64;
    assert_eq!(old_sent + driver.metrics().points_dropped, 200);

    // 序列号在整个会话中严格递增
    let seqs = sent_sequences(&controller);
    assert!(seqs.windows(2).all(|w| w[1] > w[0]));
    driver.close();
}

#[test]
#[serial]
fn test_start_succeeds_on_third_attempt() {
    let controller = MockController::default();
    controller.script_control_results(vec![MotionReplyResult::Failure, MotionReplyResult::Busy]);
    let mut driver = mock_driver(&controller);
    driver.connect().unwrap();

    driver.start(fast_policy(5)).unwrap();
    assert_eq!(driver.state(), SessionState::Ready);

    let commands = controller.sent_commands();
    assert_eq!(
        commands,
        vec![
            (0, Some(MotionCtrlCommand::StartTrajMode)),
            (1, Some(MotionCtrlCommand::StartTrajMode)),
            (2, Some(MotionCtrlCommand::StartTrajMode)),
        ]
    );
    assert_eq!(driver.metrics().control_retries, 2);
    assert_eq!(driver.metrics().replies_rejected, 2);
}

#[test]
#[serial]
fn test_start_exhausts_retries() {
    let controller = MockController::default();
    controller.script_control_results(vec![MotionReplyResult::NotReady; 10]);
    let mut driver = mock_driver(&controller);
    driver.connect().unwrap();

    let err = driver.start(fast_policy(2)).unwrap_err();
    assert!(matches!(
        err,
        DriverError::RetriesExhausted {
            command: 200121,
            attempts: 2
        }
    ));
    assert_eq!(driver.state(), SessionState::Connected);

    // 单次尝试直接报告控制器结果
    let err = driver.start(RetryPolicy::single_shot()).unwrap_err();
    assert!(matches!(
        err,
        DriverError::Rejected {
            result: MotionReplyResult::NotReady,
            ..
        }
    ));
}

#[test]
#[serial]
fn test_malformed_frame_does_not_break_session() {
    let controller = MockController::default();
    controller.acknowledge_all();
    let mut driver = mock_driver(&controller);
    driver.connect().unwrap();

    // 未知消息类型 99
    controller.push_raw(vec![0u8, 0, 0, 12, 0, 0, 0, 99, 0, 0, 0, 3, 0, 0, 0, 1]);
    driver.start(RetryPolicy::single_shot()).unwrap();
    assert_eq!(driver.metrics().decode_errors, 1);

    driver.enqueue_point(point(0.5, 0.1)).unwrap();
    assert!(controller.wait_for_sent(2, WAIT));
    assert!(wait_until(|| driver.state() == SessionState::Streaming));
    assert!(driver.last_error().is_none());
}

#[test]
#[serial]
fn test_close_wakes_idle_stream_thread() {
    let controller = MockController::default();
    controller.acknowledge_all();
    let mut driver = mock_driver(&controller);
    driver.connect().unwrap();
    driver.start(fast_policy(1)).unwrap();

    let start = Instant::now();
    driver.close();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(driver.state(), SessionState::Closed);
    assert!(!driver.is_connected());

    // 幂等
    driver.close();
    assert!(matches!(
        driver.enqueue_point(point(0.0, 0.1)),
        Err(DriverError::InvalidState {
            state: SessionState::Closed,
            ..
        })
    ));
}

#[test]
fn test_validation_leaves_queue_untouched() {
    let controller = MockController::default();
    let mut driver = mock_driver(&controller);
    driver.connect().unwrap();

    driver.enqueue(&[0.0; 6], &[0.0; 6], 0.1).unwrap();
    driver.enqueue(&[0.1; 6], &[0.0; 6], 0.1).unwrap();

    assert!(matches!(
        driver.enqueue(&[0.0; 5], &[0.0; 6], 0.1),
        Err(DriverError::Validation {
            field: "positions",
            expected: 6,
            actual: 5
        })
    ));
    assert!(matches!(
        driver.enqueue(&[0.0; 6], &[0.0; 7], 0.1),
        Err(DriverError::Validation {
            field: "velocities",
            ..
        })
    ));
    assert!(matches!(
        driver.enqueue(&[f32::NAN; 6], &[0.0; 6], 0.1),
        Err(DriverError::InvalidInput(_))
    ));
    assert_eq!(driver.queue_len(), 2);
}

#[test]
#[serial]
fn test_stream_failure_stops_session() {
    let controller = MockController::default();
    controller.acknowledge_all();
    let mut driver = mock_driver(&controller);
    let events = driver.subscribe();

    driver.connect().unwrap();
    driver.start(fast_policy(1)).unwrap();
    controller.fail_after_sends(0);

    driver.enqueue_point(point(0.0, 0.1)).unwrap();
    assert!(wait_until(|| driver.state() == SessionState::Stopped));

    let err = driver.last_error().unwrap();
    assert!(matches!(*err, DriverError::Stream(_)));
    assert!(!driver.is_connected());

    let mut received = Vec::new();
    while let Ok(event) = events.recv_timeout(Duration::from_millis(100)) {
        received.push(event);
    }
    assert!(
        received
            .iter()
            .any(|e| matches!(e, DriverEvent::StreamFailed(_)))
    );
    assert!(received.contains(&DriverEvent::StateChanged {
        from: SessionState::Ready,
        to: SessionState::Stopped,
    }));

    // 重新连接后序列号从 0 开始
    controller.fail_after_sends(usize::MAX);
    driver.connect().unwrap();
    driver.start(fast_policy(1)).unwrap();
    driver.enqueue_point(point(2.0, 0.1)).unwrap();
    assert!(wait_until(|| controller.sent_points().iter().any(|(_, _, p)| p[0] == 2.0)));

    assert_eq!(controller.connect_count(), 2);
    let restarted = controller.sent_commands();
    assert_eq!(restarted.last(), Some(&(0, Some(MotionCtrlCommand::StartTrajMode))));
    driver.close();
}

#[test]
#[serial]
fn test_lifecycle_events() {
    let controller = MockController::default();
    controller.acknowledge_all();
    let mut driver = mock_driver(&controller);
    let events = driver.subscribe();

    driver.connect().unwrap();
    driver.start(fast_policy(1)).unwrap();
    driver.stop_trajectory(fast_policy(1)).unwrap();
    assert_eq!(driver.state(), SessionState::Stopped);

    let transitions: Vec<(SessionState, SessionState)> = events
        .try_iter()
        .filter_map(|e| match e {
            DriverEvent::StateChanged { from, to } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (SessionState::Disconnected, SessionState::Connected),
            (SessionState::Connected, SessionState::Ready),
            (SessionState::Ready, SessionState::Stopped),
        ]
    );

    // Stopped 之后可以重新进入轨迹模式
    driver.start(fast_policy(1)).unwrap();
    assert_eq!(driver.state(), SessionState::Ready);
    driver.close();
}

#[test]
#[serial]
fn test_check_motion_ready() {
    let controller = MockController::default();
    controller.script_control_results(vec![MotionReplyResult::NotReady]);
    let mut driver = mock_driver(&controller);
    driver.connect().unwrap();

    assert!(matches!(
        driver.check_motion_ready(RetryPolicy::single_shot()),
        Err(DriverError::Rejected {
            command: 200101,
            result: MotionReplyResult::NotReady,
            ..
        })
    ));
    driver.check_motion_ready(RetryPolicy::single_shot()).unwrap();
    assert!(driver.last_reply().unwrap().is_success());
}

#[test]
#[serial]
fn test_push_point_acked_retries_busy() {
    let controller = MockController::default();
    let busy_left = Arc::new(AtomicUsize::new(1));
    let counter = busy_left.clone();
    controller.set_responder(move |frame: &Frame| {
        let result = match frame.body {
            Body::JointTrajPtFull(_) if counter.load(Ordering::SeqCst) > 0 => {
                counter.fetch_sub(1, Ordering::SeqCst);
                MotionReplyResult::Busy
            },
            _ => MotionReplyResult::Success,
        };
        reply_with(frame, result).into_iter().collect()
    });

    let mut driver = mock_driver(&controller);
    driver.connect().unwrap();
    driver.start(fast_policy(1)).unwrap();

    let reply = driver
        .push_point_acked(point(0.3, 0.25), fast_policy(3))
        .unwrap();
    assert!(reply.is_success());
    assert_eq!(driver.state(), SessionState::Streaming);

    // 两次发送：Busy 后重发，序列号递增、时间不变
    let points = controller.sent_points();
    assert_eq!(points.len(), 2);
    assert_eq!((points[0].0, points[1].0), (1, 2));
    assert_eq!(points[0].1, 0.25);
    assert_eq!(points[1].1, 0.25);
    assert_eq!(reply.sequence, 2);

    // 确认后累计时间推进
    driver.enqueue_point(point(0.4, 0.25)).unwrap();
    assert!(controller.wait_for_sent(4, WAIT));
    assert_eq!(controller.sent_points()[2].1, 0.5);
    driver.close();
}

#[test]
#[serial]
fn test_push_point_acked_rejects_non_busy() {
    let controller = MockController::default();
    controller.set_responder(|frame: &Frame| {
        let result = match frame.body {
            Body::JointTrajPtFull(_) => MotionReplyResult::Invalid,
            _ => MotionReplyResult::Success,
        };
        reply_with(frame, result).into_iter().collect()
    });

    let mut driver = mock_driver(&controller);
    driver.connect().unwrap();
    driver.start(fast_policy(1)).unwrap();

    let err = driver
        .push_point_acked(point(0.3, 0.25), fast_policy(5))
        .unwrap_err();
    assert!(matches!(
        err,
        DriverError::Rejected {
            command: 14,
            result: MotionReplyResult::Invalid,
            ..
        }
    ));
    assert_eq!(controller.sent_points().len(), 1);
}

#[test]
fn test_connect_failure_keeps_state() {
    let controller = MockController::default();
    controller.fail_next_connects(1);
    let mut driver = mock_driver(&controller);

    let err = driver.connect().unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(driver.state(), SessionState::Disconnected);

    driver.connect().unwrap();
    assert_eq!(driver.state(), SessionState::Connected);
}
