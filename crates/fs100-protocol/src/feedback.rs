//! 上行帧结构体定义
//!
//! 包含运动应答（MOTO_MOTION_REPLY）、关节反馈（JOINT_FEEDBACK）和机器人状态（ROBOT_STATUS）。

use crate::constants::*;

// ============================================================================
// 运动应答结果码
// ============================================================================

/// 运动应答结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, num_enum::FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum MotionReplyResult {
    /// 成功
    Success = 0,
    /// 控制器繁忙（运动队列已满），稍后重发
    Busy = 1,
    /// 失败
    Failure = 2,
    /// 指令或数据非法（见子码 3000-3017）
    Invalid = 3,
    /// 控制器报警
    Alarm = 4,
    /// 控制器未就绪（见子码 5000-5010）
    NotReady = 5,
    /// MP 函数调用失败
    MpFailure = 6,
    /// 未知结果码
    #[default]
    Unknown = -1,
}

/// 运动应答子码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, num_enum::FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum MotionReplySubcode {
    /// 无子码（成功应答）
    Success = 0,

    // === Invalid (3000-3017) ===
    InvalidUnspecified = 3000,
    InvalidMsgSize = 3001,
    InvalidMsgHeader = 3002,
    InvalidMsgType = 3003,
    InvalidGroupNo = 3004,
    InvalidSequence = 3005,
    InvalidCommand = 3006,
    InvalidData = 3010,
    InvalidDataStartPos = 3011,
    InvalidDataPosition = 3012,
    InvalidDataSpeed = 3013,
    InvalidDataAccel = 3014,
    InvalidDataInsufficient = 3015,
    InvalidDataTime = 3016,
    InvalidDataToolNo = 3017,

    // === NotReady (5000-5010) ===
    NotReadyUnspecified = 5000,
    NotReadyAlarm = 5001,
    NotReadyError = 5002,
    NotReadyEStop = 5003,
    NotReadyNotPlay = 5004,
    NotReadyNotRemote = 5005,
    NotReadyServoOff = 5006,
    NotReadyHold = 5007,
    NotReadyNotStarted = 5008,
    NotReadyWaitingRos = 5009,
    NotReadySkillSend = 5010,

    #[default]
    Unknown = -1,
}

impl MotionReplySubcode {
    /// 子码的可读说明
    pub fn description(self) -> &'static str {
        use MotionReplySubcode::*;
        match self {
            Success => "no subcode",
            InvalidUnspecified => "unspecified invalid message",
            InvalidMsgSize => "message size mismatch",
            InvalidMsgHeader => "invalid message header",
            InvalidMsgType => "invalid message type",
            InvalidGroupNo => "invalid control group number",
            InvalidSequence => "invalid sequence number",
            InvalidCommand => "invalid command",
            InvalidData => "invalid data",
            InvalidDataStartPos => "trajectory start position does not match current position",
            InvalidDataPosition => "position out of range",
            InvalidDataSpeed => "speed out of range",
            InvalidDataAccel => "acceleration out of range",
            InvalidDataInsufficient => "insufficient trajectory data",
            InvalidDataTime => "invalid time value",
            InvalidDataToolNo => "invalid tool number",
            NotReadyUnspecified => "controller not ready",
            NotReadyAlarm => "controller alarm active",
            NotReadyError => "controller error active",
            NotReadyEStop => "emergency stop active",
            NotReadyNotPlay => "controller not in play mode",
            NotReadyNotRemote => "controller not in remote mode",
            NotReadyServoOff => "servo power off",
            NotReadyHold => "hold active",
            NotReadyNotStarted => "motion server job not started",
            NotReadyWaitingRos => "waiting for trajectory mode start",
            NotReadySkillSend => "skill send active",
            Unknown => "unknown subcode",
        }
    }
}

// ============================================================================
// MOTO_MOTION_REPLY (2002)
// ============================================================================

/// 运动应答帧负载
///
/// 布局：group, sequence, command, result, subcode, data[10]
///
/// `sequence` 回显被应答指令（或轨迹点）的序列号。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotionReply {
    pub group: i32,
    pub sequence: i32,
    /// 被应答的指令码（轨迹点应答时为消息类型）
    pub command: i32,
    /// 原始结果码（见 [`MotionReply::result`]）
    pub result_code: i32,
    /// 原始子码（见 [`MotionReply::subcode`]）
    pub subcode_code: i32,
    pub data: [f32; MAX_JOINTS],
}

impl MotionReply {
    /// 创建应答（测试与模拟控制器使用）
    pub fn new(sequence: i32, command: i32, result: MotionReplyResult, subcode: i32) -> Self {
        Self {
            group: DEFAULT_GROUP,
            sequence,
            command,
            result_code: result as i32,
            subcode_code: subcode,
            data: [0.0; MAX_JOINTS],
        }
    }

    /// 结果码
    pub fn result(&self) -> MotionReplyResult {
        MotionReplyResult::from(self.result_code)
    }

    /// 子码
    pub fn subcode(&self) -> MotionReplySubcode {
        MotionReplySubcode::from(self.subcode_code)
    }

    /// 是否成功
    pub fn is_success(&self) -> bool {
        self.result() == MotionReplyResult::Success
    }

    /// 人类可读的应答说明（用于日志）
    pub fn describe(&self) -> String {
        format!(
            "seq={} command={} result={:?}({}) subcode={}({})",
            self.sequence,
            self.command,
            self.result(),
            self.result_code,
            self.subcode_code,
            self.subcode().description()
        )
    }
}

// ============================================================================
// JOINT_FEEDBACK (15)
// ============================================================================

/// 关节反馈帧负载（状态端口）
///
/// 布局：group, valid_fields, time, pos[10], vel[10], acc[10]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointFeedback {
    pub group: i32,
    pub valid_fields: i32,
    pub time: f32,
    pub positions: [f32; MAX_JOINTS],
    pub velocities: [f32; MAX_JOINTS],
    pub accelerations: [f32; MAX_JOINTS],
}

impl JointFeedback {
    /// 前 `J` 个关节的位置
    pub fn joint_positions(&self) -> [f32; NUMBER_OF_JOINTS] {
        let mut out = [0.0; NUMBER_OF_JOINTS];
        out.copy_from_slice(&self.positions[..NUMBER_OF_JOINTS]);
        out
    }

    /// 位置字段是否有效
    pub fn has_positions(&self) -> bool {
        self.valid_fields & VALID_FIELD_POSITION != 0
    }
}

// ============================================================================
// ROBOT_STATUS (13)
// ============================================================================

/// 三态标志（-1 表示未知）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum TriState {
    #[default]
    Unknown = -1,
    Off = 0,
    On = 1,
}

/// 机器人状态帧负载（状态端口）
///
/// 布局：drives_powered, e_stopped, error_code, in_error, in_motion, mode, motion_possible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RobotStatus {
    pub drives_powered: i32,
    pub e_stopped: i32,
    pub error_code: i32,
    pub in_error: i32,
    pub in_motion: i32,
    /// 1 = 手动（示教），2 = 自动（再现）
    pub mode: i32,
    pub motion_possible: i32,
}

impl RobotStatus {
    pub fn drives_powered(&self) -> TriState {
        TriState::from(self.drives_powered)
    }

    pub fn e_stopped(&self) -> TriState {
        TriState::from(self.e_stopped)
    }

    pub fn in_error(&self) -> TriState {
        TriState::from(self.in_error)
    }

    pub fn in_motion(&self) -> TriState {
        TriState::from(self.in_motion)
    }

    pub fn motion_possible(&self) -> TriState {
        TriState::from(self.motion_possible)
    }
}
