//! 会话状态定义
//!
//! 会话生命周期：
//!
//! ```text
//! Disconnected ──connect──▶ Connected ──start──▶ Ready ──首个轨迹点──▶ Streaming
//!       ▲                                          ▲  │                   │
//!       │                                          └──┴──reset_trajectory─┘
//!       │                      Stopped ◀── stop_trajectory / 发送失败 ──┘
//!       │                         │
//!       └───── connect ◀──────────┘            * ──close──▶ Closed
//! ```
//!
//! 状态由调用方线程和流式发送线程共享，使用原子变量保存。

use std::sync::atomic::{AtomicU8, Ordering};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum SessionState {
    /// 未连接（初始状态）
    #[default]
    Disconnected = 0,
    /// 已建立 TCP 连接，尚未进入轨迹模式
    Connected = 1,
    /// 轨迹模式握手成功，可以发送轨迹点
    Ready = 2,
    /// 已发送至少一个轨迹点
    Streaming = 3,
    /// 轨迹模式已退出或流式发送失败
    Stopped = 4,
    /// 已关闭（终态）
    Closed = 5,
}

impl SessionState {
    /// 从 u8 转换
    ///
    /// 无效值视为 `Closed`。
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connected,
            2 => Self::Ready,
            3 => Self::Streaming,
            4 => Self::Stopped,
            _ => Self::Closed,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 是否允许发送轨迹点
    pub fn can_stream(self) -> bool {
        matches!(self, Self::Ready | Self::Streaming)
    }

    /// 是否持有可用连接
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::Ready | Self::Streaming | Self::Stopped
        )
    }
}

/// 会话状态（原子版本，用于线程间共享）
#[derive(Debug)]
pub struct AtomicSessionState {
    inner: AtomicU8,
}

impl Default for AtomicSessionState {
    fn default() -> Self {
        Self::new(SessionState::Disconnected)
    }
}

impl AtomicSessionState {
    pub fn new(state: SessionState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> SessionState {
        SessionState::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, state: SessionState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }

    /// 比较并交换
    ///
    /// 仅当当前状态等于 `current` 时切换到 `new`，返回切换前的状态。
    pub fn compare_exchange(
        &self,
        current: SessionState,
        new: SessionState,
        success: Ordering,
        failure: Ordering,
    ) -> Result<SessionState, SessionState> {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), success, failure)
            .map(SessionState::from_u8)
            .map_err(SessionState::from_u8)
    }

    /// 切换到 `new`，除非已处于 `Closed`
    ///
    /// 返回切换前的状态。流式线程用它报告失败，避免覆盖已关闭的会话。
    pub fn transition_unless_closed(&self, new: SessionState) -> SessionState {
        let mut current = self.inner.load(Ordering::Acquire);
        loop {
            if SessionState::from_u8(current) == SessionState::Closed {
                return SessionState::Closed;
            }
            match self.inner.compare_exchange_weak(
                current,
                new.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(prev) => return SessionState::from_u8(prev),
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_roundtrip_u8() {
        for state in [
            SessionState::Disconnected,
            SessionState::Connected,
            SessionState::Ready,
            SessionState::Streaming,
            SessionState::Stopped,
            SessionState::Closed,
        ] {
            assert_eq!(SessionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(SessionState::from_u8(200), SessionState::Closed);
    }

    #[test]
    fn test_state_predicates() {
        assert!(SessionState::Ready.can_stream());
        assert!(SessionState::Streaming.can_stream());
        assert!(!SessionState::Connected.can_stream());
        assert!(!SessionState::Stopped.can_stream());

        assert!(SessionState::Stopped.is_connected());
        assert!(!SessionState::Disconnected.is_connected());
        assert!(!SessionState::Closed.is_connected());
    }

    #[test]
    fn test_atomic_compare_exchange() {
        let state = AtomicSessionState::new(SessionState::Ready);
        assert_eq!(
            state.compare_exchange(
                SessionState::Ready,
                SessionState::Streaming,
                Ordering::AcqRel,
                Ordering::Acquire
            ),
            Ok(SessionState::Ready)
        );
        assert_eq!(
            state.compare_exchange(
                SessionState::Ready,
                SessionState::Streaming,
                Ordering::AcqRel,
                Ordering::Acquire
            ),
            Err(SessionState::Streaming)
        );
    }

    #[test]
    fn test_transition_unless_closed() {
        let state = AtomicSessionState::new(SessionState::Streaming);
        assert_eq!(
            state.transition_unless_closed(SessionState::Stopped),
            SessionState::Streaming
        );
        assert_eq!(state.get(Ordering::Acquire), SessionState::Stopped);

        state.set(SessionState::Closed, Ordering::Release);
        assert_eq!(
            state.transition_unless_closed(SessionState::Stopped),
            SessionState::Closed
        );
        assert_eq!(state.get(Ordering::Acquire), SessionState::Closed);
    }
}
