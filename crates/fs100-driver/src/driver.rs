//! 驱动对外 API
//!
//! [`Fs100Driver`] 组合连接、命令队列、流式发送线程和会话状态机。

use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::event::DriverEvent;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{
    Exchange, Link, PipelineConfig, SessionContext, retry_busy, run_exchange, send_command,
    send_start, stream_loop,
};
use crate::retry::RetryPolicy;
use crate::state::SessionState;
use crossbeam_channel::Receiver;
use fs100_net::{Connector, TcpConnector};
use fs100_protocol::{
    Codec, MotionCtrlCommand, MotionReply, MsgType, NUMBER_OF_JOINTS, TrajectoryPoint,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{error, info, warn};

/// 关闭时等待流式线程退出的最长时间
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 带超时的 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use crossbeam_channel::RecvTimeoutError;

        let (tx, rx) = crossbeam_channel::bounded(1);

        // 由看门狗线程 join，超时后看门狗继续等待
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::other(
                "Thread panicked during join",
            ))),
        }
    }
}

/// FS100 轨迹流式驱动
///
/// # 生命周期
///
/// ```text
/// new → connect → start → enqueue ... → reset_trajectory → enqueue ... → close
/// ```
///
/// # Example
///
/// ```no_run
/// use fs100_driver::{DriverConfig, Fs100Driver, RetryPolicy};
///
/// let mut driver = Fs100Driver::new(DriverConfig::with_host("192.168.255.1"));
/// driver.connect()?;
/// driver.start(RetryPolicy::until_acknowledged())?;
///
/// driver.enqueue(&[0.0; 6], &[0.0; 6], 0.0)?;
/// driver.enqueue(&[0.1, 0.0, 0.0, 0.0, 0.0, 0.0], &[0.0; 6], 1.0)?;
///
/// driver.close();
/// # Ok::<(), fs100_driver::DriverError>(())
/// ```
pub struct Fs100Driver {
    config: DriverConfig,
    codec: Codec,
    connector: Box<dyn Connector>,
    ctx: Arc<SessionContext>,
    stream_thread: Option<JoinHandle<()>>,
}

impl Fs100Driver {
    /// 创建驱动（不建立连接）
    pub fn new(config: DriverConfig) -> Self {
        let connector = TcpConnector::new(config.motion_addr(), config.connect_timeout())
            .with_byte_order(config.byte_order);
        Self::with_connector(config, Box::new(connector))
    }

    /// 使用自定义连接工厂创建驱动
    pub fn with_connector(config: DriverConfig, connector: Box<dyn Connector>) -> Self {
        let ctx = Arc::new(SessionContext::new(config.queue_capacity));
        Self {
            codec: Codec::new(config.byte_order),
            config,
            connector,
            ctx,
            stream_thread: None,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 检查当前状态是否允许操作
    fn require(
        &self,
        allowed: &[SessionState],
        operation: &'static str,
    ) -> Result<SessionState, DriverError> {
        let state = self.ctx.state();
        if allowed.contains(&state) {
            Ok(state)
        } else {
            Err(DriverError::InvalidState { state, operation })
        }
    }

    // ============================================================
    // 生命周期
    // ============================================================

    /// 建立连接（`Disconnected`/`Stopped` → `Connected`）
    ///
    /// 从 `Stopped` 调用时替换原有连接，序列号重新从 0 开始。
    pub fn connect(&mut self) -> Result<(), DriverError> {
        self.require(
            &[SessionState::Disconnected, SessionState::Stopped],
            "connect",
        )?;

        let target = self.connector.target();
        info!("Connecting to FS100 motion server at {}", target);

        self.ctx.queue.gate();
        let conn = self.connector.connect()?;
        {
            let mut link = self.ctx.link.lock();
            if let Some(mut old) = link.take() {
                old.close();
            }
            *link = Some(Link::new(conn, self.codec));
        }

        self.ensure_stream_thread()?;
        self.ctx.set_state(SessionState::Connected);
        info!("Connected to {}", target);
        Ok(())
    }

    /// 确保流式线程在运行（发送失败退出后重新启动）
    fn ensure_stream_thread(&mut self) -> Result<(), DriverError> {
        if let Some(handle) = self.stream_thread.take() {
            if self.ctx.stream_running.load(Ordering::Acquire) {
                self.stream_thread = Some(handle);
                return Ok(());
            }
            // 已标记退出，join 很快返回
            if handle.join().is_err() {
                error!("Previous streaming thread panicked");
            }
        }

        let ctx = self.ctx.clone();
        let config: PipelineConfig = self.config.pipeline_config();
        self.ctx.stream_running.store(true, Ordering::Release);
        let handle = std::thread::Builder::new()
            .name("fs100-stream".into())
            .spawn(move || stream_loop(ctx, config))
            .map_err(|e| {
                self.ctx.stream_running.store(false, Ordering::Release);
                DriverError::Stream(format!("failed to spawn streaming thread: {}", e))
            })?;
        self.stream_thread = Some(handle);
        Ok(())
    }

    /// 进入轨迹模式（`Connected`/`Stopped` → `Ready`）
    ///
    /// 发送 `START_TRAJ_MODE`，按 `policy` 重试直到收到序列号匹配的成功应答。
    pub fn start(&mut self, policy: RetryPolicy) -> Result<(), DriverError> {
        self.require(&[SessionState::Connected, SessionState::Stopped], "start")?;
        self.ctx.queue.gate();
        self.handshake_start(&policy)
    }

    fn handshake_start(&mut self, policy: &RetryPolicy) -> Result<(), DriverError> {
        info!("Starting trajectory mode");
        send_start(&self.ctx, policy)?;
        self.ctx.set_state(SessionState::Ready);
        self.ctx.queue.open();
        info!("Trajectory mode started, streaming enabled");
        Ok(())
    }

    /// 重置轨迹（`Ready`/`Streaming` → `Ready`）
    ///
    /// 关闭门控并清空队列，然后依次完成 `STOP_TRAJ_MODE` 与 `START_TRAJ_MODE` 握手。
    /// 清空之前入队、尚未发送的点不会在握手之后发出。任一握手失败时会话进入 `Stopped`。
    pub fn reset_trajectory(&mut self, policy: RetryPolicy) -> Result<(), DriverError> {
        self.require(
            &[SessionState::Ready, SessionState::Streaming],
            "reset trajectory",
        )?;
        info!("Resetting trajectory");

        self.gate_and_clear();

        if let Err(e) = send_command(&self.ctx, MotionCtrlCommand::StopTrajMode, &policy) {
            self.ctx.set_state(SessionState::Stopped);
            return Err(e);
        }
        if let Err(e) = self.handshake_start(&policy) {
            self.ctx.set_state(SessionState::Stopped);
            return Err(e);
        }
        Ok(())
    }

    /// 退出轨迹模式（`Ready`/`Streaming` → `Stopped`）
    pub fn stop_trajectory(&mut self, policy: RetryPolicy) -> Result<(), DriverError> {
        self.require(
            &[SessionState::Ready, SessionState::Streaming],
            "stop trajectory",
        )?;
        info!("Stopping trajectory mode");

        self.gate_and_clear();
        let result = send_command(&self.ctx, MotionCtrlCommand::StopTrajMode, &policy);
        self.ctx.set_state(SessionState::Stopped);
        result.map(|_| ())
    }

    fn gate_and_clear(&self) {
        self.ctx.queue.gate();
        let dropped = self.ctx.queue.clear();
        if dropped > 0 {
            self.ctx
                .metrics
                .points_dropped
                .fetch_add(dropped as u64, Ordering::Relaxed);
            warn!("Discarded {} queued point(s)", dropped);
        }
    }

    /// 关闭驱动（幂等）
    ///
    /// 关闭队列唤醒流式线程，等待其退出后关闭连接。
    pub fn close(&mut self) {
        if self.ctx.state() == SessionState::Closed && self.stream_thread.is_none() {
            return;
        }
        info!("Closing FS100 driver");

        self.ctx.set_state(SessionState::Closed);
        self.ctx.queue.shutdown();

        if let Some(handle) = self.stream_thread.take()
            && let Err(_e) = handle.join_timeout(JOIN_TIMEOUT)
        {
            error!(
                "Streaming thread panicked or failed to shut down within {:?}",
                JOIN_TIMEOUT
            );
        }

        if let Some(mut link) = self.ctx.link.lock().take() {
            link.close();
        }
    }

    // ============================================================
    // 轨迹点
    // ============================================================

    /// 入队一个轨迹点
    ///
    /// 任何非 `Closed` 状态都可以入队；未进入轨迹模式时轨迹点在队列中等待。
    pub fn enqueue_point(&self, point: TrajectoryPoint) -> Result<(), DriverError> {
        if !point.is_finite() {
            return Err(DriverError::InvalidInput(
                "trajectory point contains non-finite values".into(),
            ));
        }
        if point.time < 0.0 {
            return Err(DriverError::InvalidInput(format!(
                "negative time delta: {}",
                point.time
            )));
        }

        let state = self.ctx.state();
        if state == SessionState::Closed || !self.ctx.queue.push(point) {
            return Err(DriverError::InvalidState {
                state,
                operation: "enqueue",
            });
        }
        Ok(())
    }

    /// 从切片入队（长度必须等于关节数）
    pub fn enqueue(
        &self,
        positions: &[f32],
        velocities: &[f32],
        time: f32,
    ) -> Result<(), DriverError> {
        validate_len("positions", positions)?;
        validate_len("velocities", velocities)?;
        let point = TrajectoryPoint::from_slices(positions, velocities, time).ok_or(
            DriverError::Validation {
                field: "positions",
                expected: NUMBER_OF_JOINTS,
                actual: positions.len(),
            },
        )?;
        self.enqueue_point(point)
    }

    /// 发送单个轨迹点并等待确认
    ///
    /// 只在队列为空时可用（不与流式线程交错）。控制器返回 `Busy` 时按策略重发。
    pub fn push_point_acked(
        &self,
        point: TrajectoryPoint,
        policy: RetryPolicy,
    ) -> Result<MotionReply, DriverError> {
        self.require(
            &[SessionState::Ready, SessionState::Streaming],
            "push point",
        )?;
        if !self.ctx.queue.is_empty() {
            return Err(DriverError::InvalidInput(
                "queue must be empty for an acknowledged push".into(),
            ));
        }
        if !point.is_finite() {
            return Err(DriverError::InvalidInput(
                "trajectory point contains non-finite values".into(),
            ));
        }

        let mut build = |link: &mut Link| link.point_frame(&point);
        let mut on_ack = |link: &mut Link| link.advance(&point);
        let reply = run_exchange(
            &self.ctx,
            Exchange {
                command: MsgType::JointTrajPtFull.into(),
                build: &mut build,
                retry_on: retry_busy,
                on_ack: &mut on_ack,
            },
            &policy,
        )?;

        if self
            .ctx
            .state
            .compare_exchange(
                SessionState::Ready,
                SessionState::Streaming,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.ctx.events.publish(DriverEvent::StateChanged {
                from: SessionState::Ready,
                to: SessionState::Streaming,
            });
        }
        Ok(reply)
    }

    /// 查询控制器是否可接收运动指令
    pub fn check_motion_ready(&self, policy: RetryPolicy) -> Result<(), DriverError> {
        self.require(
            &[
                SessionState::Connected,
                SessionState::Ready,
                SessionState::Streaming,
                SessionState::Stopped,
            ],
            "check motion ready",
        )?;
        send_command(&self.ctx, MotionCtrlCommand::CheckMotionReady, &policy).map(|_| ())
    }

    // ============================================================
    // 状态查询
    // ============================================================

    pub fn state(&self) -> SessionState {
        self.ctx.state()
    }

    /// 最近一次流式发送错误
    pub fn last_error(&self) -> Option<Arc<DriverError>> {
        self.ctx.last_error.load_full()
    }

    /// 最近收到的运动应答
    pub fn last_reply(&self) -> Option<MotionReply> {
        self.ctx.last_reply.load_full().map(|r| *r)
    }

    /// 尚未发送的轨迹点数
    pub fn queue_len(&self) -> usize {
        self.ctx.queue.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// 订阅驱动事件
    pub fn subscribe(&self) -> Receiver<DriverEvent> {
        self.ctx.events.subscribe()
    }

    /// 连接是否可用
    pub fn is_connected(&self) -> bool {
        self.ctx
            .link
            .lock()
            .as_ref()
            .is_some_and(|link| link.is_open())
    }

    /// 等待队列中的点全部被流式线程取走
    ///
    /// 队列清空返回 `true`；超时或会话不再可发送（门控关闭）时返回 `false`。
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        self.ctx.queue.wait_until_empty(timeout)
    }
}

fn validate_len(field: &'static str, values: &[f32]) -> Result<(), DriverError> {
    if values.len() != NUMBER_OF_JOINTS {
        return Err(DriverError::Validation {
            field,
            expected: NUMBER_OF_JOINTS,
            actual: values.len(),
        });
    }
    Ok(())
}

impl Drop for Fs100Driver {
    fn drop(&mut self) {
        self.close();
    }
}
