//! 轨迹点命令队列
//!
//! 调用方线程（生产者）与流式发送线程（消费者）共享的 FIFO。
//!
//! # 门控与纪元
//!
//! - **门控（gate）**：握手进行中或会话未就绪时关闭，消费者在 `pop_blocking` 中挂起，
//!   生产者仍可入队。
//! - **纪元（epoch）**：每次 `clear()` 加一。消费者取出轨迹点时一并取得纪元，
//!   发送前用 [`CommandQueue::is_current`] 检查，丢弃在清空前取出但尚未发送的点。
//!
//! 所有操作在同一把锁下完成，`clear()` 与任一 `pop` 严格先后有序。

use fs100_protocol::TrajectoryPoint;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// `pop_blocking` 的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Popped {
    /// 取出的轨迹点及其所属纪元
    Point(TrajectoryPoint, u64),
    /// 队列已关闭，消费者应退出
    Closed,
}

#[derive(Debug)]
struct Inner {
    items: VecDeque<TrajectoryPoint>,
    /// 门控是否打开
    open: bool,
    shutdown: bool,
    epoch: u64,
}

/// 轨迹点队列（无界，入队从不阻塞）
#[derive(Debug)]
pub struct CommandQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    /// 队列变空、门控关闭或队列关闭时通知
    drained: Condvar,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预分配容量（仅影响初始分配，队列仍可增长）
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                open: false,
                shutdown: false,
                epoch: 0,
            }),
            available: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    /// 入队
    ///
    /// 队列已关闭时返回 `false`，轨迹点被丢弃。
    pub fn push(&self, point: TrajectoryPoint) -> bool {
        let mut inner = self.inner.lock();
        if inner.shutdown {
            return false;
        }
        inner.items.push_back(point);
        let ready = inner.open;
        drop(inner);

        if ready {
            self.available.notify_one();
        }
        true
    }

    /// 阻塞出队
    ///
    /// 队列为空或门控关闭时挂起，直到有可消费的点或 `shutdown()` 被调用。
    pub fn pop_blocking(&self) -> Popped {
        let mut inner = self.inner.lock();
        loop {
            if inner.shutdown {
                return Popped::Closed;
            }
            if inner.open
                && let Some(point) = inner.items.pop_front()
            {
                if inner.items.is_empty() {
                    self.drained.notify_all();
                }
                return Popped::Point(point, inner.epoch);
            }
            self.available.wait(&mut inner);
        }
    }

    /// 清空队列并推进纪元，返回被丢弃的点数
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.items.len();
        inner.items.clear();
        inner.epoch = inner.epoch.wrapping_add(1);
        drop(inner);
        self.drained.notify_all();
        dropped
    }

    /// 关闭门控（消费者暂停）
    pub fn gate(&self) {
        self.inner.lock().open = false;
        self.drained.notify_all();
    }

    /// 打开门控（唤醒消费者）
    pub fn open(&self) {
        self.inner.lock().open = true;
        self.available.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    /// 关闭队列，唤醒所有等待者
    ///
    /// 关闭后 `pop_blocking` 立即返回 `Closed`，`push` 返回 `false`。
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        inner.items.clear();
        drop(inner);
        self.available.notify_all();
        self.drained.notify_all();
    }

    /// 等待消费者取走全部轨迹点
    ///
    /// 队列为空时返回 `true`；门控关闭（不会再被消费）或超时返回 `false`。
    pub fn wait_until_empty(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.items.is_empty() {
                return true;
            }
            if !inner.open || inner.shutdown {
                return false;
            }
            if self.drained.wait_until(&mut inner, deadline).timed_out() {
                return inner.items.is_empty();
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }

    /// `epoch` 是否仍是当前纪元（期间没有发生 `clear()`）
    pub fn is_current(&self, epoch: u64) -> bool {
        self.inner.lock().epoch == epoch
    }

    pub fn epoch(&self) -> u64 {
        self.inner.lock().epoch
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn point(i: usize) -> TrajectoryPoint {
        TrajectoryPoint::new([i as f32; 6], [0.0; 6], 0.1)
    }

    #[test]
    fn test_fifo_order() {
        let queue = CommandQueue::new();
        queue.open();
        for i in 0..5 {
            assert!(queue.push(point(i)));
        }
        assert_eq!(queue.len(), 5);

        for i in 0..5 {
            match queue.pop_blocking() {
                Popped::Point(p, epoch) => {
                    assert_eq!(p.positions[0], i as f32);
                    assert_eq!(epoch, 0);
                },
                Popped::Closed => panic!("queue closed unexpectedly"),
            }
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_bumps_epoch() {
        let queue = CommandQueue::new();
        queue.push(point(0));
        queue.push(point(1));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert!(!queue.is_current(0));
        assert!(queue.is_current(1));
        assert_eq!(queue.epoch(), 1);
    }

    #[test]
    fn test_gate_blocks_consumer() {
        let queue = Arc::new(CommandQueue::new());
        queue.push(point(7));

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop_blocking())
        };

        // 门控关闭时消费者不应取到点
        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.len(), 1);
        assert!(!consumer.is_finished());

        queue.open();
        match consumer.join().unwrap() {
            Popped::Point(p, _) => assert_eq!(p.positions[0], 7.0),
            Popped::Closed => panic!("expected a point"),
        }
    }

    #[test]
    fn test_shutdown_wakes_blocked_consumer() {
        let queue = Arc::new(CommandQueue::new());
        queue.open();

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop_blocking())
        };

        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        queue.shutdown();
        assert_eq!(consumer.join().unwrap(), Popped::Closed);
        assert!(start.elapsed() < Duration::from_secs(1));

        assert!(!queue.push(point(0)));
        assert!(queue.is_shutdown());
    }

    #[test]
    fn test_push_wakes_consumer() {
        let queue = Arc::new(CommandQueue::new());
        queue.open();

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop_blocking())
        };

        thread::sleep(Duration::from_millis(20));
        queue.push(point(3));
        assert!(matches!(consumer.join().unwrap(), Popped::Point(p, 0) if p.positions[0] == 3.0));
    }

    #[test]
    fn test_wait_until_empty_wakes_when_consumed() {
        let queue = Arc::new(CommandQueue::new());
        queue.open();
        for i in 0..3 {
            queue.push(point(i));
        }

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for _ in 0..3 {
                    thread::sleep(Duration::from_millis(10));
                    queue.pop_blocking();
                }
            })
        };

        assert!(queue.wait_until_empty(Duration::from_secs(2)));
        assert!(queue.is_empty());
        consumer.join().unwrap();
    }

    #[test]
    fn test_wait_until_empty_gated_or_timed_out() {
        let queue = CommandQueue::new();
        assert!(queue.wait_until_empty(Duration::ZERO));

        // 门控关闭：不会被消费，立即返回
        queue.push(point(0));
        let start = Instant::now();
        assert!(!queue.wait_until_empty(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));

        // 门控打开但没有消费者：超时
        queue.open();
        assert!(!queue.wait_until_empty(Duration::from_millis(20)));
    }

    #[test]
    fn test_gate_wakes_drain_waiter() {
        let queue = Arc::new(CommandQueue::new());
        queue.open();
        queue.push(point(0));

        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || queue.wait_until_empty(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        queue.gate();
        assert!(!waiter.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
