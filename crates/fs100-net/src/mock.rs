//! Mock 连接（无控制器依赖，用于测试）
//!
//! [`MockController`] 模拟控制器一侧：记录驱动写出的每一帧，并通过可替换的
//! 应答函数生成回复。[`MockConnection`] 是交给驱动的一端，二者共享状态。

use crate::{Connection, Connector, NetError};
use bytes::Bytes;
use fs100_protocol::{
    Body, Codec, Frame, MotionCtrlCommand, MotionReply, MotionReplyResult, MsgType, ReplyType,
};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 应答函数：输入驱动发出的帧，输出控制器要回复的帧
pub type Responder = Box<dyn FnMut(&Frame) -> Vec<Frame> + Send>;

struct MockState {
    /// 驱动写出的原始字节（按写入顺序）
    sent: Vec<Bytes>,
    /// 待驱动读取的帧
    inbound: VecDeque<Bytes>,
    responder: Option<Responder>,
    open: bool,
    /// 剩余多少次发送后开始失败（`None` 表示不注入）
    fail_after_sends: Option<usize>,
    /// 剩余多少次连接尝试失败
    connect_failures: usize,
    connect_count: usize,
}

struct Shared {
    state: Mutex<MockState>,
    /// inbound 有新数据或连接关闭时通知
    readable: Condvar,
    codec: Codec,
}

/// 模拟控制器（测试侧句柄）
#[derive(Clone)]
pub struct MockController {
    shared: Arc<Shared>,
}

impl Default for MockController {
    fn default() -> Self {
        Self::new(Codec::default())
    }
}

impl MockController {
    pub fn new(codec: Codec) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MockState {
                    sent: Vec::new(),
                    inbound: VecDeque::new(),
                    responder: None,
                    open: true,
                    fail_after_sends: None,
                    connect_failures: 0,
                    connect_count: 0,
                }),
                readable: Condvar::new(),
                codec,
            }),
        }
    }

    /// 创建一个新的连接端（共享同一控制器状态）
    pub fn connection(&self) -> MockConnection {
        self.shared.state.lock().open = true;
        MockConnection {
            shared: self.shared.clone(),
        }
    }

    /// 作为连接工厂使用
    pub fn connector(&self) -> Box<dyn Connector> {
        Box::new(self.clone())
    }

    /// 设置应答函数（替换之前的）
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&Frame) -> Vec<Frame> + Send + 'static,
    {
        self.shared.state.lock().responder = Some(Box::new(responder));
    }

    /// 对每个指令和轨迹点回复 `Success`
    pub fn acknowledge_all(&self) {
        self.set_responder(|frame| {
            reply_with(frame, MotionReplyResult::Success)
                .into_iter()
                .collect()
        });
    }

    /// 按顺序为运动控制指令使用给定结果，用完后回复 `Success`
    ///
    /// 轨迹点始终回复 `Success`。
    pub fn script_control_results(&self, results: Vec<MotionReplyResult>) {
        let mut scripted: VecDeque<MotionReplyResult> = results.into();
        self.set_responder(move |frame| {
            let result = match frame.body {
                Body::MotionCtrl(_) => scripted.pop_front().unwrap_or(MotionReplyResult::Success),
                _ => MotionReplyResult::Success,
            };
            reply_with(frame, result).into_iter().collect()
        });
    }

    /// 不回复任何帧
    pub fn silence(&self) {
        self.set_responder(|_| Vec::new());
    }

    /// 直接注入待读取的原始字节（可以是畸形帧）
    pub fn push_raw(&self, bytes: impl Into<Bytes>) {
        self.shared.state.lock().inbound.push_back(bytes.into());
        self.shared.readable.notify_all();
    }

    /// 注入一个帧
    pub fn push_frame(&self, frame: &Frame) {
        self.push_raw(self.shared.codec.encode(frame));
    }

    /// 从第 `n` 次之后的发送开始返回 `Closed`
    pub fn fail_after_sends(&self, n: usize) {
        self.shared.state.lock().fail_after_sends = Some(n);
    }

    /// 接下来 `n` 次连接尝试失败
    pub fn fail_next_connects(&self, n: usize) {
        self.shared.state.lock().connect_failures = n;
    }

    /// 模拟对端关闭
    pub fn close_peer(&self) {
        self.shared.state.lock().open = false;
        self.shared.readable.notify_all();
    }

    pub fn connect_count(&self) -> usize {
        self.shared.state.lock().connect_count
    }

    /// 驱动写出的原始字节
    pub fn sent_raw(&self) -> Vec<Bytes> {
        self.shared.state.lock().sent.clone()
    }

    /// 驱动写出的帧（解码失败的跳过）
    pub fn sent_frames(&self) -> Vec<Frame> {
        let codec = self.shared.codec;
        self.sent_raw()
            .iter()
            .filter_map(|raw| codec.decode(raw).ok())
            .collect()
    }

    /// 驱动发出的运动控制指令
    pub fn sent_commands(&self) -> Vec<(i32, Option<MotionCtrlCommand>)> {
        self.sent_frames()
            .iter()
            .filter_map(|f| match f.body {
                Body::MotionCtrl(ctrl) => Some((ctrl.sequence, ctrl.command())),
                _ => None,
            })
            .collect()
    }

    /// 驱动发出的轨迹点（序列号，累计时间，位置）
    pub fn sent_points(&self) -> Vec<(i32, f32, [f32; 6])> {
        self.sent_frames()
            .iter()
            .filter_map(|f| match f.body {
                Body::JointTrajPtFull(pt) => {
                    let mut pos = [0.0f32; 6];
                    pos.copy_from_slice(&pt.positions[..6]);
                    Some((pt.sequence, pt.time, pos))
                },
                _ => None,
            })
            .collect()
    }

    /// 等待驱动写出至少 `count` 帧
    pub fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.shared.state.lock().sent.len() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.shared.state.lock().sent.len() >= count
    }
}

impl Connector for MockController {
    fn connect(&mut self) -> Result<Box<dyn Connection>, NetError> {
        {
            let mut state = self.shared.state.lock();
            state.connect_count += 1;
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                return Err(NetError::Connect {
                    addr: self.target(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "scripted connect failure",
                    ),
                });
            }
        }
        Ok(Box::new(self.connection()))
    }

    fn target(&self) -> String {
        "mock".to_string()
    }
}

/// 为请求帧生成一个匹配序列号的运动应答
pub fn reply_with(frame: &Frame, result: MotionReplyResult) -> Option<Frame> {
    let (sequence, command) = match frame.body {
        Body::MotionCtrl(ctrl) => (ctrl.sequence, ctrl.command_code),
        Body::JointTrajPtFull(pt) => (pt.sequence, MsgType::JointTrajPtFull.into()),
        _ => return None,
    };
    let reply_type = if result == MotionReplyResult::Success {
        ReplyType::Success
    } else {
        ReplyType::Failure
    };
    Some(Frame::reply(
        Body::MotionReply(MotionReply::new(sequence, command, result, 0)),
        reply_type,
    ))
}

/// 交给驱动的连接端
pub struct MockConnection {
    shared: Arc<Shared>,
}

impl Connection for MockConnection {
    fn send_frame(&mut self, frame: &[u8]) -> Result<(), NetError> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        if !state.open {
            return Err(NetError::Closed);
        }
        if let Some(remaining) = state.fail_after_sends.as_mut() {
            if *remaining == 0 {
                state.open = false;
                self.shared.readable.notify_all();
                return Err(NetError::Closed);
            }
            *remaining -= 1;
        }

        state.sent.push(Bytes::copy_from_slice(frame));

        // 应答函数在锁内运行，回复与发送保持同序
        if let Ok(decoded) = self.shared.codec.decode(frame) {
            if let Some(responder) = state.responder.as_mut() {
                let replies = responder(&decoded);
                for reply in replies {
                    let bytes = self.shared.codec.encode(&reply);
                    state.inbound.push_back(bytes);
                }
            }
        }
        self.shared.readable.notify_all();
        Ok(())
    }

    fn recv_frame(&mut self, timeout: Duration) -> Result<Bytes, NetError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let Some(frame) = state.inbound.pop_front() {
                return Ok(frame);
            }
            if !state.open {
                return Err(NetError::Closed);
            }
            if self
                .shared
                .readable
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return match state.inbound.pop_front() {
                    Some(frame) => Ok(frame),
                    None if !state.open => Err(NetError::Closed),
                    None => Err(NetError::Timeout),
                };
            }
        }
    }

    fn close(&mut self) {
        self.shared.state.lock().open = false;
        self.shared.readable.notify_all();
    }

    fn is_open(&self) -> bool {
        self.shared.state.lock().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fs100_protocol::MotionCtrl;

    fn ctrl_bytes(codec: &Codec, seq: i32) -> Bytes {
        codec.encode(&Frame::request(Body::MotionCtrl(MotionCtrl::trajectory_start(seq))))
    }

    #[test]
    fn test_records_sends_and_replies_with_matching_sequence() {
        let controller = MockController::default();
        controller.acknowledge_all();
        let mut conn = controller.connection();
        let codec = Codec::default();

        conn.send_frame(&ctrl_bytes(&codec, 7)).unwrap();
        let reply = codec.decode(&conn.recv_frame(Duration::from_millis(10)).unwrap()).unwrap();
        assert_eq!(reply.sequence(), Some(7));
        assert!(reply.as_motion_reply().unwrap().is_success());
        assert_eq!(
            controller.sent_commands(),
            vec![(7, Some(MotionCtrlCommand::StartTrajMode))]
        );
    }

    #[test]
    fn test_scripted_results_then_success() {
        let controller = MockController::default();
        controller.script_control_results(vec![MotionReplyResult::NotReady]);
        let mut conn = controller.connection();
        let codec = Codec::default();

        conn.send_frame(&ctrl_bytes(&codec, 1)).unwrap();
        conn.send_frame(&ctrl_bytes(&codec, 2)).unwrap();
        let first = codec.decode(&conn.recv_frame(Duration::ZERO).unwrap()).unwrap();
        let second = codec.decode(&conn.recv_frame(Duration::ZERO).unwrap()).unwrap();
        assert_eq!(
            first.as_motion_reply().unwrap().result(),
            MotionReplyResult::NotReady
        );
        assert!(second.as_motion_reply().unwrap().is_success());
    }

    #[test]
    fn test_recv_timeout_and_close() {
        let controller = MockController::default();
        let mut conn = controller.connection();
        assert!(matches!(
            conn.recv_frame(Duration::from_millis(5)),
            Err(NetError::Timeout)
        ));
        assert!(conn.try_recv_frame().unwrap().is_none());

        controller.close_peer();
        assert!(!conn.is_open());
        assert!(matches!(
            conn.recv_frame(Duration::from_millis(5)),
            Err(NetError::Closed)
        ));
    }

    #[test]
    fn test_fail_after_sends() {
        let controller = MockController::default();
        controller.fail_after_sends(1);
        let mut conn = controller.connection();
        conn.send_frame(&[0u8; 4]).unwrap();
        assert!(matches!(conn.send_frame(&[0u8; 4]), Err(NetError::Closed)));
        assert_eq!(controller.sent_raw().len(), 1);
    }

    #[test]
    fn test_scripted_connect_failures() {
        let mut controller = MockController::default();
        controller.fail_next_connects(1);
        assert!(controller.connect().is_err());
        assert!(controller.connect().is_ok());
        assert_eq!(controller.connect_count(), 2);
    }
}
