//! 驱动运行指标
//!
//! 原子计数器，可在任意线程读取，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 驱动实时指标
///
/// # 使用示例
///
/// ```rust
/// use fs100_driver::DriverMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = DriverMetrics::default();
/// metrics.points_sent.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.points_sent, 1);
/// ```
#[derive(Debug, Default)]
pub struct DriverMetrics {
    /// 已发送的轨迹点数
    pub points_sent: AtomicU64,

    /// 因队列清空而丢弃的轨迹点数（包括已出队但纪元过期的点）
    pub points_dropped: AtomicU64,

    /// 已发送的运动控制指令数（包括重试）
    pub control_sent: AtomicU64,

    /// 控制指令重试次数（不含首次尝试）
    pub control_retries: AtomicU64,

    /// 收到的运动应答数
    pub replies_received: AtomicU64,

    /// 非成功应答数
    pub replies_rejected: AtomicU64,

    /// 等待应答超时次数
    pub reply_timeouts: AtomicU64,

    /// 解码失败而丢弃的帧数
    pub decode_errors: AtomicU64,

    /// 传输层发送错误次数
    pub send_errors: AtomicU64,
}

impl DriverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            points_sent: self.points_sent.load(Ordering::Relaxed),
            points_dropped: self.points_dropped.load(Ordering::Relaxed),
            control_sent: self.control_sent.load(Ordering::Relaxed),
            control_retries: self.control_retries.load(Ordering::Relaxed),
            replies_received: self.replies_received.load(Ordering::Relaxed),
            replies_rejected: self.replies_rejected.load(Ordering::Relaxed),
            reply_timeouts: self.reply_timeouts.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.points_sent.store(0, Ordering::Relaxed);
        self.points_dropped.store(0, Ordering::Relaxed);
        self.control_sent.store(0, Ordering::Relaxed);
        self.control_retries.store(0, Ordering::Relaxed);
        self.replies_received.store(0, Ordering::Relaxed);
        self.replies_rejected.store(0, Ordering::Relaxed);
        self.reply_timeouts.store(0, Ordering::Relaxed);
        self.decode_errors.store(0, Ordering::Relaxed);
        self.send_errors.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub points_sent: u64,
    pub points_dropped: u64,
    pub control_sent: u64,
    pub control_retries: u64,
    pub replies_received: u64,
    pub replies_rejected: u64,
    pub reply_timeouts: u64,
    pub decode_errors: u64,
    pub send_errors: u64,
}

impl MetricsSnapshot {
    /// 非成功应答占比（百分比），没有应答时为 0
    pub fn rejection_rate(&self) -> f64 {
        if self.replies_received == 0 {
            return 0.0;
        }
        (self.replies_rejected as f64 / self.replies_received as f64) * 100.0
    }
}
