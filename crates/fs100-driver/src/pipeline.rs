//! Pipeline IO 逻辑
//!
//! 包含流式发送线程主循环 [`stream_loop`] 以及调用方线程使用的控制指令交换
//! （发送指令、按序列号等待应答、按策略重试）。
//!
//! 连接只在持有 [`SessionContext::link`] 锁时使用：流式线程发送轨迹点、
//! 调用方线程进行控制交换，二者不会交错写入同一帧。

use crate::error::DriverError;
use crate::event::{DriverEvent, EventBus};
use crate::metrics::DriverMetrics;
use crate::queue::{CommandQueue, Popped};
use crate::retry::RetryPolicy;
use crate::state::{AtomicSessionState, SessionState};
use arc_swap::ArcSwapOption;
use fs100_net::{Connection, NetError};
use fs100_protocol::{
    Body, Codec, Frame, JointTrajPtFull, MotionCtrl, MotionCtrlCommand, MotionReply,
    MotionReplyResult, TrajectoryPoint,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Pipeline 配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// 每次发送轨迹点后读取应答的等待时间（毫秒）
    ///
    /// 0 表示只取走已到达的应答，不等待。
    pub drain_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 0,
        }
    }
}

// ============================================================================
// Link：连接 + 会话级计数器
// ============================================================================

/// 一条活动连接及其会话计数器
///
/// 序列号与轨迹累计时间随连接保存，所有写入都在同一把锁下完成，
/// 因此线上的序列号严格递增且与发送顺序一致。
pub struct Link {
    conn: Box<dyn Connection>,
    codec: Codec,
    next_sequence: i32,
    /// 当前轨迹的累计时间（秒），每次进入轨迹模式时清零
    trajectory_time: f32,
}

impl Link {
    pub fn new(conn: Box<dyn Connection>, codec: Codec) -> Self {
        Self {
            conn,
            codec,
            next_sequence: 0,
            trajectory_time: 0.0,
        }
    }

    /// 分配下一个序列号
    pub fn next_sequence(&mut self) -> i32 {
        let seq = self.next_sequence;
        self.next_sequence = seq.wrapping_add(1);
        seq
    }

    pub fn trajectory_time(&self) -> f32 {
        self.trajectory_time
    }

    pub fn reset_trajectory_time(&mut self) {
        self.trajectory_time = 0.0;
    }

    /// 为轨迹点构造帧（不推进累计时间）
    pub fn point_frame(&mut self, point: &TrajectoryPoint) -> Frame {
        let seq = self.next_sequence();
        let time = self.trajectory_time + point.time;
        Frame::request(Body::JointTrajPtFull(JointTrajPtFull::from_point(
            seq, point, time,
        )))
    }

    /// 轨迹点已交给连接后推进累计时间
    pub fn advance(&mut self, point: &TrajectoryPoint) {
        self.trajectory_time += point.time;
    }

    /// 为控制指令构造帧
    pub fn control_frame(&mut self, command: MotionCtrlCommand) -> Frame {
        let seq = self.next_sequence();
        Frame::request(Body::MotionCtrl(MotionCtrl::new(seq, command)))
    }

    pub fn send(&mut self, frame: &Frame) -> Result<(), NetError> {
        let bytes = self.codec.encode(frame);
        self.conn.send_frame(&bytes)
    }

    /// 接收并解码一帧
    ///
    /// 超时返回 `Connection(NetError::Timeout)`，解码失败返回 `Protocol`（该帧已被消费）。
    pub fn recv(&mut self, timeout: Duration) -> Result<Frame, DriverError> {
        let bytes = self.conn.recv_frame(timeout)?;
        Ok(self.codec.decode(&bytes)?)
    }

    pub fn close(&mut self) {
        self.conn.close();
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_open()
    }
}

// ============================================================================
// SessionContext：调用方线程与流式线程共享的状态
// ============================================================================

/// 会话共享上下文
pub struct SessionContext {
    pub queue: CommandQueue,
    pub state: AtomicSessionState,
    /// 当前连接（未连接时为 `None`）
    pub link: Mutex<Option<Link>>,
    pub metrics: DriverMetrics,
    pub events: EventBus,
    pub last_reply: ArcSwapOption<MotionReply>,
    pub last_error: ArcSwapOption<DriverError>,
    /// 流式线程是否在运行（线程退出前置为 `false`）
    pub stream_running: AtomicBool,
}

impl SessionContext {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue: CommandQueue::with_capacity(queue_capacity),
            state: AtomicSessionState::default(),
            link: Mutex::new(None),
            metrics: DriverMetrics::new(),
            events: EventBus::new(),
            last_reply: ArcSwapOption::empty(),
            last_error: ArcSwapOption::empty(),
            stream_running: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get(Ordering::Acquire)
    }

    /// 切换状态并发布事件（已关闭的会话不再切换）
    pub fn set_state(&self, to: SessionState) {
        let from = self.state.transition_unless_closed(to);
        if from != to && from != SessionState::Closed {
            debug!("Session state {:?} -> {:?}", from, to);
            self.events.publish(DriverEvent::StateChanged { from, to });
        }
    }

    /// 记录一个运动应答
    pub fn record_reply(&self, reply: MotionReply) {
        self.metrics.replies_received.fetch_add(1, Ordering::Relaxed);
        if reply.is_success() {
            trace!("Reply: {}", reply.describe());
        } else {
            self.metrics.replies_rejected.fetch_add(1, Ordering::Relaxed);
            warn!("Controller rejected: {}", reply.describe());
        }
        self.last_reply.store(Some(Arc::new(reply)));
        self.events.publish(DriverEvent::Reply(reply));
    }

    pub fn record_error(&self, err: DriverError) {
        self.last_error.store(Some(Arc::new(err)));
    }

    /// 处理连接上收到的非应答帧或应答帧
    fn handle_frame(&self, frame: Frame) {
        match frame.body {
            Body::MotionReply(reply) => self.record_reply(reply),
            other => trace!("Ignoring {:?} frame on motion port", other.msg_type()),
        }
    }

    /// 连接失效：关闭连接，会话进入 `Stopped`
    pub fn on_connection_lost(&self, link: &mut Option<Link>, err: &DriverError) {
        error!("Connection lost: {}", err);
        self.queue.gate();
        if let Some(mut l) = link.take() {
            l.close();
        }
        self.set_state(SessionState::Stopped);
    }
}

// ============================================================================
// 流式发送线程
// ============================================================================

/// 流式发送线程主循环
///
/// 阻塞出队 → 持锁检查纪元 → 分配序列号并发送 → 取走已到达的应答。
/// 队列关闭时退出；发送失败时记录错误、会话进入 `Stopped` 后退出。
pub fn stream_loop(ctx: Arc<SessionContext>, config: PipelineConfig) {
    let drain_timeout = Duration::from_millis(config.drain_timeout_ms);
    ctx.stream_running.store(true, Ordering::Release);
    info!("Streaming loop started");

    loop {
        let (point, epoch) = match ctx.queue.pop_blocking() {
            Popped::Point(point, epoch) => (point, epoch),
            Popped::Closed => {
                trace!("Streaming loop: queue closed, exiting");
                break;
            },
        };

        let mut guard = ctx.link.lock();

        // 出队后、取得连接前发生了 clear()：该点属于已重置的轨迹
        if !ctx.queue.is_current(epoch) {
            ctx.metrics.points_dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Dropping point from a cleared trajectory");
            continue;
        }

        let Some(link) = guard.as_mut() else {
            ctx.metrics.points_dropped.fetch_add(1, Ordering::Relaxed);
            warn!("Streaming loop: no connection, dropping point");
            continue;
        };

        let frame = link.point_frame(&point);
        if let Err(e) = link.send(&frame) {
            ctx.metrics.send_errors.fetch_add(1, Ordering::Relaxed);
            let err = DriverError::Connection(e);
            fail_stream(&ctx, &mut guard, err);
            break;
        }
        link.advance(&point);
        ctx.metrics.points_sent.fetch_add(1, Ordering::Relaxed);
        trace!(
            "Sent point seq={:?} t={:.3}",
            frame.sequence(),
            link.trajectory_time()
        );

        if ctx
            .state
            .compare_exchange(
                SessionState::Ready,
                SessionState::Streaming,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            ctx.events.publish(DriverEvent::StateChanged {
                from: SessionState::Ready,
                to: SessionState::Streaming,
            });
        }

        if let Err(err) = drain_replies(&ctx, link, drain_timeout) {
            fail_stream(&ctx, &mut guard, err);
            break;
        }
    }

    ctx.stream_running.store(false, Ordering::Release);
    info!("Streaming loop exited");
}

/// 取走连接上已到达的帧
fn drain_replies(
    ctx: &SessionContext,
    link: &mut Link,
    timeout: Duration,
) -> Result<(), DriverError> {
    loop {
        match link.recv(timeout) {
            Ok(frame) => ctx.handle_frame(frame),
            Err(DriverError::Connection(NetError::Timeout)) => return Ok(()),
            Err(DriverError::Protocol(e)) => {
                ctx.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Discarding malformed frame: {}", e);
            },
            Err(e) => return Err(e),
        }
    }
}

/// 发送失败：先记录错误，再把会话切换到 `Stopped`
///
/// 观察到 `Stopped` 的调用方一定能读到 `last_error`，并且可以立即重新连接。
fn fail_stream(ctx: &SessionContext, link: &mut Option<Link>, err: DriverError) {
    let message = err.to_string();
    ctx.stream_running.store(false, Ordering::Release);
    ctx.record_error(DriverError::Stream(message.clone()));
    ctx.events.publish(DriverEvent::StreamFailed(message));
    ctx.on_connection_lost(link, &err);
}

// ============================================================================
// 控制交换（调用方线程）
// ============================================================================

/// 单次尝试的结果
#[derive(Debug, Clone, Copy, PartialEq)]
enum Attempt {
    Acked(MotionReply),
    Rejected(MotionReply),
    NoReply,
}

/// 一次请求 / 应答交换的描述
pub(crate) struct Exchange<'a> {
    /// 日志与错误中使用的指令码
    pub command: i32,
    /// 每次尝试构造新帧（使用新的序列号）
    pub build: &'a mut dyn FnMut(&mut Link) -> Frame,
    /// 非成功结果是否值得重试
    pub retry_on: fn(MotionReplyResult) -> bool,
    /// 确认后在同一把锁下执行
    pub on_ack: &'a mut dyn FnMut(&mut Link),
}

/// 控制指令：任何非成功结果都重试
pub(crate) fn retry_any(_: MotionReplyResult) -> bool {
    true
}

/// 轨迹点：只有控制器繁忙时重试
pub(crate) fn retry_busy(result: MotionReplyResult) -> bool {
    result == MotionReplyResult::Busy
}

/// 发送控制指令并按策略等待确认
pub(crate) fn send_command(
    ctx: &SessionContext,
    command: MotionCtrlCommand,
    policy: &RetryPolicy,
) -> Result<MotionReply, DriverError> {
    let mut build = |link: &mut Link| link.control_frame(command);
    let mut on_ack = |_: &mut Link| {};
    run_exchange(
        ctx,
        Exchange {
            command: command.into(),
            build: &mut build,
            retry_on: retry_any,
            on_ack: &mut on_ack,
        },
        policy,
    )
}

/// 发送 `START_TRAJ_MODE`，确认后在同一把锁下把轨迹累计时间清零
pub(crate) fn send_start(
    ctx: &SessionContext,
    policy: &RetryPolicy,
) -> Result<MotionReply, DriverError> {
    let command = MotionCtrlCommand::StartTrajMode;
    let mut build = |link: &mut Link| link.control_frame(command);
    let mut on_ack = |link: &mut Link| link.reset_trajectory_time();
    run_exchange(
        ctx,
        Exchange {
            command: command.into(),
            build: &mut build,
            retry_on: retry_any,
            on_ack: &mut on_ack,
        },
        policy,
    )
}

/// 执行交换：发送、等待匹配序列号的应答、按策略重试
///
/// 传输层错误立即返回，不再重试。
pub(crate) fn run_exchange(
    ctx: &SessionContext,
    exchange: Exchange<'_>,
    policy: &RetryPolicy,
) -> Result<MotionReply, DriverError> {
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        if attempts > 1 {
            ctx.metrics.control_retries.fetch_add(1, Ordering::Relaxed);
        }

        let outcome = {
            let mut guard = ctx.link.lock();
            let Some(link) = guard.as_mut() else {
                return Err(DriverError::Connection(NetError::Closed));
            };

            let frame = (exchange.build)(link);
            match attempt(ctx, link, &frame, policy.reply_timeout) {
                Ok(Attempt::Acked(reply)) => {
                    (exchange.on_ack)(link);
                    Attempt::Acked(reply)
                },
                Ok(other) => other,
                Err(e) => {
                    if e.is_connection_error() {
                        ctx.on_connection_lost(&mut guard, &e);
                    }
                    return Err(e);
                },
            }
        };

        let last = match outcome {
            Attempt::Acked(reply) => {
                debug!(
                    "Command {} acknowledged after {} attempt(s)",
                    exchange.command, attempts
                );
                return Ok(reply);
            },
            Attempt::Rejected(reply) => {
                if !(exchange.retry_on)(reply.result()) {
                    return Err(rejected(exchange.command, &reply));
                }
                Some(reply)
            },
            Attempt::NoReply => {
                ctx.metrics.reply_timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "No reply to command {} within {:?} (attempt {})",
                    exchange.command, policy.reply_timeout, attempts
                );
                None
            },
        };

        if !policy.allows(attempts) {
            if attempts == 1 {
                return Err(match last {
                    Some(reply) => rejected(exchange.command, &reply),
                    None => DriverError::Timeout,
                });
            }
            return Err(DriverError::RetriesExhausted {
                command: exchange.command,
                attempts,
            });
        }

        spin_sleep::sleep(policy.interval);
    }
}

fn rejected(command: i32, reply: &MotionReply) -> DriverError {
    DriverError::Rejected {
        command,
        result: reply.result(),
        subcode: reply.subcode_code,
    }
}

/// 单次尝试：发送一帧，在 `timeout` 内等待序列号匹配的应答
///
/// 序列号不匹配的应答（例如此前轨迹点的应答）被记录后跳过；
/// 解码失败的帧被丢弃。
fn attempt(
    ctx: &SessionContext,
    link: &mut Link,
    frame: &Frame,
    timeout: Duration,
) -> Result<Attempt, DriverError> {
    let Some(seq) = frame.sequence() else {
        return Err(DriverError::InvalidInput(format!(
            "{:?} frames carry no sequence number",
            frame.msg_type()
        )));
    };

    link.send(frame)?;
    match frame.body {
        Body::MotionCtrl(_) => ctx.metrics.control_sent.fetch_add(1, Ordering::Relaxed),
        _ => ctx.metrics.points_sent.fetch_add(1, Ordering::Relaxed),
    };

    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(Attempt::NoReply);
        }

        match link.recv(remaining) {
            Ok(reply_frame) => {
                let Some(reply) = reply_frame.as_motion_reply().copied() else {
                    ctx.handle_frame(reply_frame);
                    continue;
                };
                ctx.record_reply(reply);
                if reply.sequence != seq {
                    trace!(
                        "Skipping reply seq={} while awaiting seq={}",
                        reply.sequence, seq
                    );
                    continue;
                }
                return Ok(if reply.is_success() {
                    Attempt::Acked(reply)
                } else {
                    Attempt::Rejected(reply)
                });
            },
            Err(DriverError::Connection(NetError::Timeout)) => return Ok(Attempt::NoReply),
            Err(DriverError::Protocol(e)) => {
                ctx.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Discarding malformed frame: {}", e);
            },
            Err(e) => return Err(e),
        }
    }
}
