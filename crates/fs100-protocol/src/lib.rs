//! # FS100 Protocol
//!
//! Motoman FS100 运动服务器 SimpleMessage 协议定义（无 IO 依赖）
//!
//! ## 模块
//!
//! - `constants`: 端口、帧长度等协议常量
//! - `ids`: 消息类型 / 通信类型 / 应答类型枚举
//! - `control`: 下发帧（轨迹点、运动控制指令）
//! - `feedback`: 上行帧（运动应答、关节反馈、机器人状态）
//! - `frame`: 帧头、帧枚举与编解码器
//!
//! ## 帧格式
//!
//! ```text
//! +----------+----------+-----------+------------+---------------------+
//! | length   | msg_type | comm_type | reply_type | payload (按类型固定) |
//! | i32      | i32      | i32       | i32        |                     |
//! +----------+----------+-----------+------------+---------------------+
//! ```
//!
//! `length` 为前缀之后的字节数。每种消息类型的帧长度固定。
//!
//! ## 字节序
//!
//! 线上字节序固定（默认大端，见 [`ByteOrder`]），编解码全部通过显式的
//! `to_be_bytes`/`from_be_bytes` 语义完成，与主机字节序无关。

pub mod constants;
pub mod control;
pub mod feedback;
pub mod frame;
pub mod ids;

// 重新导出常用类型
pub use constants::*;
pub use control::*;
pub use feedback::*;
pub use frame::*;
pub use ids::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 缓冲区不足以容纳前缀和帧头
    #[error("Frame too short: need at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    /// 未知的消息类型
    #[error("Unknown message type: {msg_type}")]
    UnknownMessageType { msg_type: i32 },

    /// 声明长度与消息类型的固定长度不符
    #[error("Malformed frame for {msg_type:?}: expected {expected} bytes, got {actual}")]
    MalformedFrame {
        msg_type: MsgType,
        expected: usize,
        actual: usize,
    },

    /// 字段取值非法
    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnknownMessageType { msg_type: 99 };
        assert_eq!(format!("{}", err), "Unknown message type: 99");

        let err = ProtocolError::MalformedFrame {
            msg_type: MsgType::MotionReply,
            expected: 76,
            actual: 80,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("MotionReply") && msg.contains("76") && msg.contains("80"));

        let err = ProtocolError::TooShort {
            expected: 16,
            actual: 3,
        };
        assert!(format!("{}", err).contains("too short"));
    }
}
