//! 协议常量定义

/// 运动指令端口（轨迹点、运动控制指令）
pub const MOTION_PORT: u16 = 50240;

/// 状态反馈端口（关节反馈、机器人状态）
pub const STATE_PORT: u16 = 50241;

/// 目标机器人的关节数（SIA10F / MH5L 为 6 轴）
pub const NUMBER_OF_JOINTS: usize = 6;

/// 线上关节数组固定长度（未使用的关节填 0）
pub const MAX_JOINTS: usize = 10;

/// 默认控制组号
pub const DEFAULT_GROUP: i32 = 0;

// ============================================================================
// 帧长度（包含 4 字节长度前缀）
// ============================================================================

/// 长度前缀字节数
pub const PREFIX_LEN: usize = 4;

/// 帧头字节数（msg_type + comm_type + reply_type）
pub const HEADER_LEN: usize = 12;

/// 最小帧长度（前缀 + 帧头）
pub const MIN_FRAME_LEN: usize = PREFIX_LEN + HEADER_LEN;

/// JOINT_TRAJ_PT_FULL 帧长度
pub const JOINT_TRAJ_PT_FULL_LEN: usize = MIN_FRAME_LEN + 4 * 4 + 3 * MAX_JOINTS * 4;

/// MOTO_MOTION_REPLY 帧长度
pub const MOTION_REPLY_LEN: usize = MIN_FRAME_LEN + 5 * 4 + MAX_JOINTS * 4;

/// MOTO_MOTION_CTRL 帧长度
pub const MOTION_CTRL_LEN: usize = MIN_FRAME_LEN + 3 * 4 + MAX_JOINTS * 4;

/// JOINT_FEEDBACK 帧长度
pub const JOINT_FEEDBACK_LEN: usize = MIN_FRAME_LEN + 3 * 4 + 3 * MAX_JOINTS * 4;

/// ROBOT_STATUS 帧长度
pub const ROBOT_STATUS_LEN: usize = MIN_FRAME_LEN + 7 * 4;

/// 任意已知帧的最大长度上限
///
/// 接收端用它判断长度前缀是否可信，超过即认为流已失步。
pub const MAX_FRAME_LEN: usize = 1024;

// ============================================================================
// valid_fields 位掩码
// ============================================================================

pub const VALID_FIELD_TIME: i32 = 0x01;
pub const VALID_FIELD_POSITION: i32 = 0x02;
pub const VALID_FIELD_VELOCITY: i32 = 0x04;
pub const VALID_FIELD_ACCELERATION: i32 = 0x08;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_frame_lengths() {
        assert_eq!(JOINT_TRAJ_PT_FULL_LEN, 152);
        assert_eq!(MOTION_REPLY_LEN, 76);
        assert_eq!(MOTION_CTRL_LEN, 68);
        assert_eq!(JOINT_FEEDBACK_LEN, 148);
        assert_eq!(ROBOT_STATUS_LEN, 44);
    }
}
