//! 状态端口读取（50241）
//!
//! 控制器在状态端口上持续推送 `JOINT_FEEDBACK` 和 `ROBOT_STATUS`（Topic）。
//! [`StateReader`] 在独立线程中读取并解码，最新值通过 `ArcSwap` 无锁发布。

use crate::config::DriverConfig;
use crate::error::DriverError;
use arc_swap::ArcSwapOption;
use fs100_net::{Connection, Connector, NetError, TcpConnector};
use fs100_protocol::{Body, Codec, JointFeedback, NUMBER_OF_JOINTS, RobotStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 读取线程检查停止标志的间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct Shared {
    feedback: ArcSwapOption<JointFeedback>,
    status: ArcSwapOption<RobotStatus>,
    frames: AtomicU64,
    decode_errors: AtomicU64,
    running: AtomicBool,
}

/// 状态端口读取器
///
/// # Example
///
/// ```no_run
/// use fs100_driver::{DriverConfig, StateReader};
///
/// let reader = StateReader::connect(&DriverConfig::with_host("192.168.255.1"))?;
/// if let Some(positions) = reader.joint_positions() {
///     println!("{:?}", positions);
/// }
/// # Ok::<(), fs100_driver::DriverError>(())
/// ```
pub struct StateReader {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl StateReader {
    /// 连接配置中的状态端口并启动读取线程
    pub fn connect(config: &DriverConfig) -> Result<Self, DriverError> {
        let connector = TcpConnector::new(config.state_addr(), config.connect_timeout())
            .with_byte_order(config.byte_order);
        Self::spawn(Box::new(connector), Codec::new(config.byte_order), DEFAULT_POLL_INTERVAL)
    }

    /// 使用给定连接工厂连接并启动读取线程
    pub fn spawn(
        mut connector: Box<dyn Connector>,
        codec: Codec,
        poll: Duration,
    ) -> Result<Self, DriverError> {
        info!("Connecting to FS100 state server at {}", connector.target());
        let conn = connector.connect()?;

        let shared = Arc::new(Shared::default());
        shared.running.store(true, Ordering::Release);

        let thread_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name("fs100-state".into())
            .spawn(move || read_loop(conn, codec, poll, thread_shared))
            .map_err(|e| DriverError::Stream(format!("failed to spawn state thread: {}", e)))?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// 最近一次关节反馈
    pub fn latest_feedback(&self) -> Option<JointFeedback> {
        self.shared.feedback.load_full().map(|f| *f)
    }

    /// 最近一次机器人状态
    pub fn latest_status(&self) -> Option<RobotStatus> {
        self.shared.status.load_full().map(|s| *s)
    }

    /// 最近一次反馈中的关节位置（位置字段无效时为 `None`）
    pub fn joint_positions(&self) -> Option<[f32; NUMBER_OF_JOINTS]> {
        self.latest_feedback()
            .filter(|f| f.has_positions())
            .map(|f| f.joint_positions())
    }

    /// 已解码的帧数
    pub fn frames_received(&self) -> u64 {
        self.shared.frames.load(Ordering::Relaxed)
    }

    pub fn decode_errors(&self) -> u64 {
        self.shared.decode_errors.load(Ordering::Relaxed)
    }

    /// 读取线程是否仍在运行（连接断开后为 `false`）
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// 停止读取线程并关闭连接（幂等）
    pub fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            error!("State reader thread panicked");
        }
    }
}

impl Drop for StateReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_loop(mut conn: Box<dyn Connection>, codec: Codec, poll: Duration, shared: Arc<Shared>) {
    debug!("State reader started");

    while shared.running.load(Ordering::Acquire) {
        let bytes = match conn.recv_frame(poll) {
            Ok(bytes) => bytes,
            Err(NetError::Timeout) => continue,
            Err(e) => {
                warn!("State connection lost: {}", e);
                break;
            },
        };

        let frame = match codec.decode(&bytes) {
            Ok(frame) => frame,
            Err(e) => {
                shared.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Discarding malformed state frame: {}", e);
                continue;
            },
        };

        shared.frames.fetch_add(1, Ordering::Relaxed);
        match frame.body {
            Body::JointFeedback(feedback) => {
                trace!("Feedback t={:.3}", feedback.time);
                shared.feedback.store(Some(Arc::new(feedback)));
            },
            Body::RobotStatus(status) => {
                trace!("Robot status: {:?}", status);
                shared.status.store(Some(Arc::new(status)));
            },
            other => trace!("Ignoring {:?} frame on state port", other.msg_type()),
        }
    }

    conn.close();
    shared.running.store(false, Ordering::Release);
    debug!("State reader exited");
}
