//! 驱动事件分发
//!
//! 订阅者通过 `crossbeam_channel` 接收运动应答与状态变化。
//! 发布端只使用 `try_send`，订阅者处理慢时事件被丢弃，不会阻塞流式线程。

use crate::state::SessionState;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use fs100_protocol::MotionReply;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// 每个订阅者的缓冲容量
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 驱动事件
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// 收到运动应答（控制指令或轨迹点）
    Reply(MotionReply),
    /// 会话状态变化
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// 流式发送线程因错误退出
    StreamFailed(String),
}

/// 事件总线
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<DriverEvent>>>,
    /// 因订阅者缓冲区满而丢弃的事件数
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增订阅者
    pub fn subscribe(&self) -> Receiver<DriverEvent> {
        let (tx, rx) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);
        self.subscribers.lock().push(tx);
        rx
    }

    /// 发布事件（非阻塞），已断开的订阅者被移除
    pub fn publish(&self, event: DriverEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            },
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
