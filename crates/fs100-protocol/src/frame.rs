//! 帧定义与编解码
//!
//! [`Codec`] 在 [`Frame`] 与整帧字节之间转换，不做任何 IO，不保存状态。
//! 调用方（连接层）保证交给 `decode` 的是一个完整帧。

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ProtocolError;
use crate::constants::*;
use crate::control::{JointTrajPtFull, MotionCtrl};
use crate::feedback::{JointFeedback, MotionReply, RobotStatus};
use crate::ids::{CommType, MsgType, ReplyType};

/// 线上字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ByteOrder {
    /// 大端（默认，参考驱动在小端主机上逐字段翻转后的结果）
    #[default]
    BigEndian,
    /// 小端（控制器按本机字节序配置时使用）
    LittleEndian,
}

// ============================================================================
// Frame
// ============================================================================

/// 帧负载（按消息类型区分）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Body {
    JointTrajPtFull(JointTrajPtFull),
    MotionCtrl(MotionCtrl),
    MotionReply(MotionReply),
    JointFeedback(JointFeedback),
    RobotStatus(RobotStatus),
}

impl Body {
    /// 负载对应的消息类型
    pub fn msg_type(&self) -> MsgType {
        match self {
            Body::JointTrajPtFull(_) => MsgType::JointTrajPtFull,
            Body::MotionCtrl(_) => MsgType::MotionCtrl,
            Body::MotionReply(_) => MsgType::MotionReply,
            Body::JointFeedback(_) => MsgType::JointFeedback,
            Body::RobotStatus(_) => MsgType::RobotStatus,
        }
    }
}

/// 一个完整的 SimpleMessage 帧
///
/// 长度前缀和消息类型由 `body` 决定，不单独存储。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    pub comm_type: CommType,
    pub reply_type: ReplyType,
    pub body: Body,
}

impl Frame {
    /// 服务请求帧（指令、轨迹点）
    pub fn request(body: Body) -> Self {
        Self {
            comm_type: CommType::ServiceRequest,
            reply_type: ReplyType::Invalid,
            body,
        }
    }

    /// 服务应答帧
    pub fn reply(body: Body, reply_type: ReplyType) -> Self {
        Self {
            comm_type: CommType::ServiceReply,
            reply_type,
            body,
        }
    }

    /// 主题帧（状态端口周期性推送）
    pub fn topic(body: Body) -> Self {
        Self {
            comm_type: CommType::Topic,
            reply_type: ReplyType::Invalid,
            body,
        }
    }

    pub fn msg_type(&self) -> MsgType {
        self.body.msg_type()
    }

    /// 帧的总字节数（包含长度前缀）
    pub fn encoded_len(&self) -> usize {
        self.msg_type().frame_len()
    }

    /// 序列号（仅指令、轨迹点、运动应答携带）
    pub fn sequence(&self) -> Option<i32> {
        match &self.body {
            Body::JointTrajPtFull(b) => Some(b.sequence),
            Body::MotionCtrl(b) => Some(b.sequence),
            Body::MotionReply(b) => Some(b.sequence),
            Body::JointFeedback(_) | Body::RobotStatus(_) => None,
        }
    }

    /// 若为运动应答，返回应答负载
    pub fn as_motion_reply(&self) -> Option<&MotionReply> {
        match &self.body {
            Body::MotionReply(reply) => Some(reply),
            _ => None,
        }
    }
}

// ============================================================================
// Header
// ============================================================================

/// 帧头（解码时读取的原始字段）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// 长度前缀（前缀之后的字节数）
    pub length: i32,
    pub msg_type: MsgType,
    pub comm_type: CommType,
    pub reply_type: ReplyType,
}

// ============================================================================
// 字节序读写辅助
// ============================================================================

struct WireWriter {
    buf: BytesMut,
    order: ByteOrder,
}

impl WireWriter {
    fn with_capacity(capacity: usize, order: ByteOrder) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            order,
        }
    }

    fn put_i32(&mut self, value: i32) {
        match self.order {
            ByteOrder::BigEndian => self.buf.put_i32(value),
            ByteOrder::LittleEndian => self.buf.put_i32_le(value),
        }
    }

    fn put_f32(&mut self, value: f32) {
        match self.order {
            ByteOrder::BigEndian => self.buf.put_f32(value),
            ByteOrder::LittleEndian => self.buf.put_f32_le(value),
        }
    }

    fn put_f32_array(&mut self, values: &[f32; MAX_JOINTS]) {
        for v in values {
            self.put_f32(*v);
        }
    }

    fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

struct WireReader<'a> {
    buf: &'a [u8],
    order: ByteOrder,
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8], order: ByteOrder) -> Self {
        Self { buf, order }
    }

    // 调用前已校验整帧长度，以下读取不会越界
    fn get_i32(&mut self) -> i32 {
        match self.order {
            ByteOrder::BigEndian => self.buf.get_i32(),
            ByteOrder::LittleEndian => self.buf.get_i32_le(),
        }
    }

    fn get_f32(&mut self) -> f32 {
        match self.order {
            ByteOrder::BigEndian => self.buf.get_f32(),
            ByteOrder::LittleEndian => self.buf.get_f32_le(),
        }
    }

    fn get_f32_array(&mut self) -> [f32; MAX_JOINTS] {
        let mut out = [0.0f32; MAX_JOINTS];
        for v in out.iter_mut() {
            *v = self.get_f32();
        }
        out
    }
}

// ============================================================================
// Codec
// ============================================================================

/// SimpleMessage 编解码器
///
/// # Example
///
/// ```
/// use fs100_protocol::{Body, Codec, Frame, MotionCtrl};
///
/// let codec = Codec::default();
/// let frame = Frame::request(Body::MotionCtrl(MotionCtrl::trajectory_start(1)));
/// let bytes = codec.encode(&frame);
/// assert_eq!(bytes.len(), 68);
/// assert_eq!(codec.decode(&bytes).unwrap(), frame);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Codec {
    order: ByteOrder,
}

impl Codec {
    pub fn new(order: ByteOrder) -> Self {
        Self { order }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// 编码为整帧字节（长度恰为该消息类型的固定长度）
    pub fn encode(&self, frame: &Frame) -> Bytes {
        let msg_type = frame.msg_type();
        let mut w = WireWriter::with_capacity(msg_type.frame_len(), self.order);

        w.put_i32(msg_type.declared_len());
        w.put_i32(msg_type.into());
        w.put_i32(frame.comm_type.into());
        w.put_i32(frame.reply_type.into());

        match &frame.body {
            Body::JointTrajPtFull(b) => {
                w.put_i32(b.group);
                w.put_i32(b.sequence);
                w.put_i32(b.valid_fields);
                w.put_f32(b.time);
                w.put_f32_array(&b.positions);
                w.put_f32_array(&b.velocities);
                w.put_f32_array(&b.accelerations);
            },
            Body::MotionCtrl(b) => {
                w.put_i32(b.group);
                w.put_i32(b.sequence);
                w.put_i32(b.command_code);
                w.put_f32_array(&b.data);
            },
            Body::MotionReply(b) => {
                w.put_i32(b.group);
                w.put_i32(b.sequence);
                w.put_i32(b.command);
                w.put_i32(b.result_code);
                w.put_i32(b.subcode_code);
                w.put_f32_array(&b.data);
            },
            Body::JointFeedback(b) => {
                w.put_i32(b.group);
                w.put_i32(b.valid_fields);
                w.put_f32(b.time);
                w.put_f32_array(&b.positions);
                w.put_f32_array(&b.velocities);
                w.put_f32_array(&b.accelerations);
            },
            Body::RobotStatus(b) => {
                w.put_i32(b.drives_powered);
                w.put_i32(b.e_stopped);
                w.put_i32(b.error_code);
                w.put_i32(b.in_error);
                w.put_i32(b.in_motion);
                w.put_i32(b.mode);
                w.put_i32(b.motion_possible);
            },
        }

        let bytes = w.finish();
        debug_assert_eq!(bytes.len(), msg_type.frame_len());
        bytes
    }

    /// 读取长度前缀
    ///
    /// 连接层用它确定还需读取多少字节。`buf` 至少 4 字节。
    pub fn read_length_prefix(&self, buf: &[u8]) -> Result<i32, ProtocolError> {
        if buf.len() < PREFIX_LEN {
            return Err(ProtocolError::TooShort {
                expected: PREFIX_LEN,
                actual: buf.len(),
            });
        }
        Ok(WireReader::new(&buf[..PREFIX_LEN], self.order).get_i32())
    }

    /// 解码帧头并校验声明长度
    pub fn decode_header(&self, buf: &[u8]) -> Result<Header, ProtocolError> {
        if buf.len() < MIN_FRAME_LEN {
            return Err(ProtocolError::TooShort {
                expected: MIN_FRAME_LEN,
                actual: buf.len(),
            });
        }

        let mut r = WireReader::new(&buf[..MIN_FRAME_LEN], self.order);
        let length = r.get_i32();
        let raw_type = r.get_i32();
        let msg_type = MsgType::try_from(raw_type)
            .map_err(|_| ProtocolError::UnknownMessageType { msg_type: raw_type })?;

        // 声明长度必须与该类型的固定长度一致
        let expected = msg_type.frame_len();
        let declared = (length as i64 + PREFIX_LEN as i64).max(0) as usize;
        if declared != expected {
            return Err(ProtocolError::MalformedFrame {
                msg_type,
                expected,
                actual: declared,
            });
        }

        let comm_type = CommType::from_wire(r.get_i32())?;
        let reply_type = ReplyType::from_wire(r.get_i32())?;

        Ok(Header {
            length,
            msg_type,
            comm_type,
            reply_type,
        })
    }

    /// 解码整帧
    ///
    /// # 错误
    /// - `TooShort`: 不足前缀 + 帧头
    /// - `UnknownMessageType`: 消息类型不在已知枚举内
    /// - `MalformedFrame`: 声明长度或实际长度与该类型的固定长度不符
    /// - `InvalidValue`: 通信类型 / 应答类型非法
    pub fn decode(&self, buf: &[u8]) -> Result<Frame, ProtocolError> {
        let header = self.decode_header(buf)?;

        let expected = header.msg_type.frame_len();
        if buf.len() != expected {
            return Err(ProtocolError::MalformedFrame {
                msg_type: header.msg_type,
                expected,
                actual: buf.len(),
            });
        }

        let mut r = WireReader::new(&buf[MIN_FRAME_LEN..], self.order);
        let body = match header.msg_type {
            MsgType::JointTrajPtFull => Body::JointTrajPtFull(JointTrajPtFull {
                group: r.get_i32(),
                sequence: r.get_i32(),
                valid_fields: r.get_i32(),
                time: r.get_f32(),
                positions: r.get_f32_array(),
                velocities: r.get_f32_array(),
                accelerations: r.get_f32_array(),
            }),
            MsgType::MotionCtrl => Body::MotionCtrl(MotionCtrl {
                group: r.get_i32(),
                sequence: r.get_i32(),
                command_code: r.get_i32(),
                data: r.get_f32_array(),
            }),
            MsgType::MotionReply => Body::MotionReply(MotionReply {
                group: r.get_i32(),
                sequence: r.get_i32(),
                command: r.get_i32(),
                result_code: r.get_i32(),
                subcode_code: r.get_i32(),
                data: r.get_f32_array(),
            }),
            MsgType::JointFeedback => Body::JointFeedback(JointFeedback {
                group: r.get_i32(),
                valid_fields: r.get_i32(),
                time: r.get_f32(),
                positions: r.get_f32_array(),
                velocities: r.get_f32_array(),
                accelerations: r.get_f32_array(),
            }),
            MsgType::RobotStatus => Body::RobotStatus(RobotStatus {
                drives_powered: r.get_i32(),
                e_stopped: r.get_i32(),
                error_code: r.get_i32(),
                in_error: r.get_i32(),
                in_motion: r.get_i32(),
                mode: r.get_i32(),
                motion_possible: r.get_i32(),
            }),
        };

        Ok(Frame {
            comm_type: header.comm_type,
            reply_type: header.reply_type,
            body,
        })
    }
}

/// 使用默认字节序编码
pub fn encode(frame: &Frame) -> Bytes {
    Codec::default().encode(frame)
}

/// 使用默认字节序解码
pub fn decode(buf: &[u8]) -> Result<Frame, ProtocolError> {
    Codec::default().decode(buf)
}
