//! # FS100 Net
//!
//! 运动服务器传输层：在 TCP 字节流上收发完整的 SimpleMessage 帧。
//!
//! 本层只负责帧边界（长度前缀），不解析帧内容；解析由 `fs100-protocol` 完成。

use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

pub mod tcp;

pub use tcp::{TcpConnection, TcpConnector};

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mock")]
pub use mock::{MockConnection, MockController};

/// 传输层错误类型
#[derive(Error, Debug)]
pub enum NetError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Receive timeout")]
    Timeout,

    #[error("Connection closed")]
    Closed,

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to resolve {host}: {message}")]
    Resolve { host: String, message: String },
}

impl NetError {
    /// 是否为致命错误（连接已不可用）
    ///
    /// 只有接收超时可以继续使用同一连接。
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NetError::Timeout)
    }

    /// 把 IO 错误归类：对端关闭 / 复位归为 `Closed`，超时归为 `Timeout`
    pub fn from_io(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => NetError::Timeout,
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotConnected => NetError::Closed,
            _ => NetError::Io(e),
        }
    }
}

/// 帧级双向连接
///
/// 实现必须保证：
/// - `send_frame` 一次写出整帧，要么全部写出，要么返回错误
/// - `recv_frame` 超时返回 `NetError::Timeout` 时不丢失已读到的部分数据
/// - `recv_frame(Duration::ZERO)` 只取已到达的数据，不阻塞
pub trait Connection: Send {
    /// 发送一个完整帧
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), NetError>;

    /// 接收一个完整帧（包含长度前缀）
    fn recv_frame(&mut self, timeout: Duration) -> Result<Bytes, NetError>;

    /// 非阻塞接收：没有完整帧时返回 `Ok(None)`
    fn try_recv_frame(&mut self) -> Result<Option<Bytes>, NetError> {
        match self.recv_frame(Duration::ZERO) {
            Ok(frame) => Ok(Some(frame)),
            Err(NetError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 关闭连接（幂等）
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// 连接工厂
///
/// 驱动在 `connect` 时调用它建立新连接，断开后可再次调用以重连。
pub trait Connector: Send {
    fn connect(&mut self) -> Result<Box<dyn Connection>, NetError>;

    /// 目标描述（用于日志）
    fn target(&self) -> String;
}
