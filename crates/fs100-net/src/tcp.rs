//! TCP 连接实现
//!
//! 在字节流上按长度前缀切分帧。接收缓冲区跨调用保留，读超时不会导致失步。

use crate::{Connection, Connector, NetError};
use bytes::{Buf, Bytes, BytesMut};
use fs100_protocol::{ByteOrder, MAX_FRAME_LEN, PREFIX_LEN};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 阻塞 read 的最小超时（`set_read_timeout` 不接受 0）；零超时走非阻塞路径
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// 单次 read 的缓冲区大小
const READ_CHUNK: usize = 512;

/// 运动服务器 TCP 连接
pub struct TcpConnection {
    stream: Option<TcpStream>,
    peer: SocketAddr,
    order: ByteOrder,
    /// 已接收但尚未组成完整帧的数据
    rx_buffer: BytesMut,
}

impl TcpConnection {
    /// 解析地址并建立连接
    ///
    /// `addr` 可以是 `host:port` 形式的主机名或 IP。依次尝试解析出的每个地址，
    /// 每个地址最多等待 `timeout`。
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self, NetError> {
        let candidates: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|e| NetError::Resolve {
                host: addr.to_string(),
                message: e.to_string(),
            })?
            .collect();

        if candidates.is_empty() {
            return Err(NetError::Resolve {
                host: addr.to_string(),
                message: "no addresses found".to_string(),
            });
        }

        let mut last_err = None;
        for candidate in candidates {
            debug!("Connecting to {} ({})", addr, candidate);
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => return Self::from_stream(stream),
                Err(e) => {
                    warn!("Connect to {} failed: {}", candidate, e);
                    last_err = Some(e);
                },
            }
        }

        Err(NetError::Connect {
            addr: addr.to_string(),
            source: last_err
                .unwrap_or_else(|| std::io::Error::new(ErrorKind::NotConnected, "no candidates")),
        })
    }

    /// 包装已建立的流（测试中用于接入本地监听端）
    pub fn from_stream(stream: TcpStream) -> Result<Self, NetError> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok(Self {
            stream: Some(stream),
            peer,
            order: ByteOrder::default(),
            rx_buffer: BytesMut::with_capacity(MAX_FRAME_LEN),
        })
    }

    /// 设置长度前缀的字节序（须与编解码器一致）
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// 缓冲区中已到达的字节数（不含已返回的帧）
    pub fn buffered_len(&self) -> usize {
        self.rx_buffer.len()
    }

    /// 关闭流并把错误归类
    fn fail(&mut self, e: std::io::Error) -> NetError {
        let err = NetError::from_io(e);
        if err.is_fatal() {
            self.close();
        }
        err
    }

    /// 从缓冲区切出一个完整帧；前缀非法时关闭连接
    fn take_frame(&mut self) -> Result<Option<Bytes>, NetError> {
        match split_frame(&mut self.rx_buffer, self.order) {
            Ok(frame) => {
                if let Some(f) = &frame {
                    trace!("RX {} bytes from {}", f.len(), self.peer);
                }
                Ok(frame)
            },
            Err(e) => {
                self.close();
                Err(e)
            },
        }
    }

    /// 零超时接收：只取已到达的数据，从不阻塞
    ///
    /// 缓冲区中没有完整帧时做一次非阻塞 read，仍凑不齐则返回 `Timeout`。
    fn poll_frame(&mut self) -> Result<Bytes, NetError> {
        if let Some(frame) = self.take_frame()? {
            return Ok(frame);
        }

        let stream = self.stream.as_mut().ok_or(NetError::Closed)?;
        let peer_open = match read_nonblocking(stream, &mut self.rx_buffer) {
            Ok(open) => open,
            Err(e) => return Err(self.fail(e)),
        };

        if let Some(frame) = self.take_frame()? {
            return Ok(frame);
        }
        if !peer_open {
            debug!("Peer {} closed the connection", self.peer);
            self.close();
            return Err(NetError::Closed);
        }
        Err(NetError::Timeout)
    }
}

/// 若缓冲区中已有完整帧，切出并返回
///
/// 长度前缀为负或超过 [`MAX_FRAME_LEN`] 时流已无法重新同步，返回 `InvalidData`。
fn split_frame(buf: &mut BytesMut, order: ByteOrder) -> Result<Option<Bytes>, NetError> {
    if buf.len() < PREFIX_LEN {
        return Ok(None);
    }

    let mut prefix = &buf[..PREFIX_LEN];
    let length = match order {
        ByteOrder::BigEndian => prefix.get_i32(),
        ByteOrder::LittleEndian => prefix.get_i32_le(),
    };

    if length < 0 || length as usize + PREFIX_LEN > MAX_FRAME_LEN {
        return Err(NetError::Io(std::io::Error::new(
            ErrorKind::InvalidData,
            format!("invalid frame length prefix: {}", length),
        )));
    }

    let total = length as usize + PREFIX_LEN;
    if buf.len() < total {
        return Ok(None);
    }

    Ok(Some(buf.split_to(total).freeze()))
}

/// 以非阻塞方式做一次 read，把读到的数据追加到 `buf`
///
/// 返回 `Ok(false)` 表示对端已关闭。返回前恢复阻塞模式。
fn read_nonblocking(stream: &mut TcpStream, buf: &mut BytesMut) -> std::io::Result<bool> {
    stream.set_nonblocking(true)?;
    let mut chunk = [0u8; READ_CHUNK];
    let result = loop {
        match stream.read(&mut chunk) {
            Ok(0) => break Ok(false),
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                break Ok(true);
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(true),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => break Err(e),
        }
    };
    stream.set_nonblocking(false)?;
    result
}

impl Connection for TcpConnection {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), NetError> {
        let stream = self.stream.as_mut().ok_or(NetError::Closed)?;
        trace!("TX {} bytes to {}", frame.len(), self.peer);
        match stream.write_all(frame).and_then(|_| stream.flush()) {
            Ok(()) => Ok(()),
            Err(e) => {
                // 部分写出后流已失步，任何发送错误都关闭连接
                self.close();
                Err(match NetError::from_io(e) {
                    NetError::Timeout => NetError::Io(std::io::Error::new(
                        ErrorKind::TimedOut,
                        "send timed out",
                    )),
                    other => other,
                })
            },
        }
    }

    fn recv_frame(&mut self, timeout: Duration) -> Result<Bytes, NetError> {
        if timeout.is_zero() {
            return self.poll_frame();
        }

        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(frame);
            }

            let stream = self.stream.as_mut().ok_or(NetError::Closed)?;
            let remaining = deadline
                .saturating_duration_since(Instant::now())
                .max(MIN_READ_TIMEOUT);
            if let Err(e) = stream.set_read_timeout(Some(remaining)) {
                return Err(self.fail(e));
            }

            match stream.read(&mut chunk) {
                Ok(0) => {
                    debug!("Peer {} closed the connection", self.peer);
                    self.close();
                    return Err(NetError::Closed);
                },
                Ok(n) => self.rx_buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.fail(e)),
            }

            // 读到数据但截止时间已过：再检查一次是否凑齐了完整帧
            if Instant::now() >= deadline {
                return self.take_frame()?.ok_or(NetError::Timeout);
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("Closing connection to {}", self.peer);
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

/// TCP 连接工厂
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    connect_timeout: Duration,
    order: ByteOrder,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            order: ByteOrder::default(),
        }
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }
}

impl Connector for TcpConnector {
    fn connect(&mut self) -> Result<Box<dyn Connection>, NetError> {
        let conn = TcpConnection::connect(&self.addr, self.connect_timeout)?
            .with_byte_order(self.order);
        Ok(Box::new(conn))
    }

    fn target(&self) -> String {
        self.addr.clone()
    }
}
