//! 帧头字段枚举
//!
//! 消息类型、通信类型、应答类型。线上均为 i32。

use crate::ProtocolError;
use crate::constants::*;

/// 消息类型
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum MsgType {
    /// 机器人状态（状态端口，Topic）
    RobotStatus = 13,
    /// 完整轨迹点（位置 + 速度 + 加速度 + 时间）
    JointTrajPtFull = 14,
    /// 关节反馈（状态端口，Topic）
    JointFeedback = 15,
    /// Motoman 运动控制指令
    MotionCtrl = 2001,
    /// Motoman 运动应答
    MotionReply = 2002,
}

impl MsgType {
    /// 该类型的固定帧长度（包含长度前缀）
    pub const fn frame_len(self) -> usize {
        match self {
            MsgType::RobotStatus => ROBOT_STATUS_LEN,
            MsgType::JointTrajPtFull => JOINT_TRAJ_PT_FULL_LEN,
            MsgType::JointFeedback => JOINT_FEEDBACK_LEN,
            MsgType::MotionCtrl => MOTION_CTRL_LEN,
            MsgType::MotionReply => MOTION_REPLY_LEN,
        }
    }

    /// 长度前缀中应当声明的值（帧长度减去前缀本身）
    pub const fn declared_len(self) -> i32 {
        (self.frame_len() - PREFIX_LEN) as i32
    }
}

/// 通信类型
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum CommType {
    #[default]
    Invalid = 0,
    Topic = 1,
    ServiceRequest = 2,
    ServiceReply = 3,
}

impl CommType {
    /// 从线上 i32 解析
    pub fn from_wire(value: i32) -> Result<Self, ProtocolError> {
        Self::try_from(value).map_err(|_| ProtocolError::InvalidValue {
            field: "comm_type",
            value,
        })
    }
}

/// 应答类型（帧头级别）
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum ReplyType {
    #[default]
    Invalid = 0,
    Success = 1,
    Failure = 2,
}

impl ReplyType {
    /// 从线上 i32 解析
    pub fn from_wire(value: i32) -> Result<Self, ProtocolError> {
        Self::try_from(value).map_err(|_| ProtocolError::InvalidValue {
            field: "reply_type",
            value,
        })
    }
}
