//! 驱动层错误类型定义

use crate::state::SessionState;
use fs100_net::NetError;
use fs100_protocol::{MotionReplyResult, MotionReplySubcode, ProtocolError};
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误（对当前会话致命，不自动重连）
    #[error("Connection error: {0}")]
    Connection(#[from] NetError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 控制器返回非成功应答
    #[error(
        "Controller rejected command {command}: {result:?} (subcode {subcode}: {})",
        subcode_text(.subcode)
    )]
    Rejected {
        command: i32,
        result: MotionReplyResult,
        subcode: i32,
    },

    /// 输入数组长度与关节数不符
    #[error("Invalid {field}: expected {expected} values, got {actual}")]
    Validation {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// 无效输入（如非有限值）
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 重试次数用尽仍未得到确认
    #[error("Command {command} not acknowledged after {attempts} attempts")]
    RetriesExhausted { command: i32, attempts: u32 },

    /// 当前状态下不允许该操作
    #[error("Cannot {operation} in state {state:?}")]
    InvalidState {
        state: SessionState,
        operation: &'static str,
    },

    /// 等待应答超时
    #[error("Operation timeout")]
    Timeout,

    /// 流式发送线程失败
    #[error("Streaming loop failed: {0}")]
    Stream(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),
}

fn subcode_text(subcode: &i32) -> &'static str {
    MotionReplySubcode::from(*subcode).description()
}

impl DriverError {
    /// 是否为传输层错误（会话已不可用）
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DriverError::Connection(e) if e.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::Rejected {
            command: 200121,
            result: MotionReplyResult::NotReady,
            subcode: 5006,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("200121"), "{}", msg);
        assert!(msg.contains("NotReady"), "{}", msg);
        assert!(msg.contains("servo power off"), "{}", msg);

        let err = DriverError::Validation {
            field: "positions",
            expected: 6,
            actual: 5,
        };
        assert_eq!(
            format!("{}", err),
            "Invalid positions: expected 6 values, got 5"
        );

        let err = DriverError::InvalidState {
            state: SessionState::Disconnected,
            operation: "start",
        };
        assert_eq!(format!("{}", err), "Cannot start in state Disconnected");

        assert_eq!(format!("{}", DriverError::Timeout), "Operation timeout");
    }

    #[test]
    fn test_from_net_error() {
        let err: DriverError = NetError::Closed.into();
        assert!(matches!(err, DriverError::Connection(NetError::Closed)));
        assert!(err.is_connection_error());

        let err: DriverError = NetError::Timeout.into();
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_from_protocol_error() {
        let err: DriverError = ProtocolError::UnknownMessageType { msg_type: 7 }.into();
        match err {
            DriverError::Protocol(ProtocolError::UnknownMessageType { msg_type }) => {
                assert_eq!(msg_type, 7)
            },
            _ => panic!("Expected Protocol variant"),
        }
    }
}
