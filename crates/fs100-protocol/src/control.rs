//! 下发帧结构体定义
//!
//! 包含轨迹点（JOINT_TRAJ_PT_FULL）和运动控制指令（MOTO_MOTION_CTRL）。

use crate::constants::*;

// ============================================================================
// 轨迹点（队列元素）
// ============================================================================

/// 关节空间轨迹点
///
/// 队列中的基本元素：`J` 个关节位置、`J` 个关节速度，以及距上一个点的时间（秒）。
/// 入队后不可变，由流式发送线程取出并转换为 [`JointTrajPtFull`]。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrajectoryPoint {
    /// 关节位置（弧度）
    pub positions: [f32; NUMBER_OF_JOINTS],
    /// 关节速度（弧度/秒）
    pub velocities: [f32; NUMBER_OF_JOINTS],
    /// 距上一个点的时间（秒）
    pub time: f32,
}

impl TrajectoryPoint {
    pub fn new(
        positions: [f32; NUMBER_OF_JOINTS],
        velocities: [f32; NUMBER_OF_JOINTS],
        time: f32,
    ) -> Self {
        Self {
            positions,
            velocities,
            time,
        }
    }

    /// 从切片构造
    ///
    /// 切片长度必须等于 [`NUMBER_OF_JOINTS`]，否则返回 `None`。
    pub fn from_slices(positions: &[f32], velocities: &[f32], time: f32) -> Option<Self> {
        Some(Self {
            positions: positions.try_into().ok()?,
            velocities: velocities.try_into().ok()?,
            time,
        })
    }

    /// 所有字段是否为有限值
    pub fn is_finite(&self) -> bool {
        self.time.is_finite()
            && self.positions.iter().all(|v| v.is_finite())
            && self.velocities.iter().all(|v| v.is_finite())
    }
}

/// 把 `J` 维数组填充到线上的 10 维数组
fn pad_joints(values: &[f32; NUMBER_OF_JOINTS]) -> [f32; MAX_JOINTS] {
    let mut out = [0.0f32; MAX_JOINTS];
    out[..NUMBER_OF_JOINTS].copy_from_slice(values);
    out
}

// ============================================================================
// JOINT_TRAJ_PT_FULL (14)
// ============================================================================

/// 完整轨迹点帧负载
///
/// 布局：group, sequence, valid_fields, time, pos[10], vel[10], acc[10]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointTrajPtFull {
    pub group: i32,
    pub sequence: i32,
    /// 有效字段掩码（见 `VALID_FIELD_*`）
    pub valid_fields: i32,
    /// 距轨迹起点的时间（秒）
    pub time: f32,
    pub positions: [f32; MAX_JOINTS],
    pub velocities: [f32; MAX_JOINTS],
    pub accelerations: [f32; MAX_JOINTS],
}

impl JointTrajPtFull {
    /// 从轨迹点构造（时间、位置、速度有效，加速度为 0）
    ///
    /// 控制器期望的是距轨迹起点的累计时间，而轨迹点携带的是相对上一点的时间差，
    /// 因此由调用方传入累计后的 `time`。
    pub fn from_point(sequence: i32, point: &TrajectoryPoint, time: f32) -> Self {
        Self {
            group: DEFAULT_GROUP,
            sequence,
            valid_fields: VALID_FIELD_TIME | VALID_FIELD_POSITION | VALID_FIELD_VELOCITY,
            time,
            positions: pad_joints(&point.positions),
            velocities: pad_joints(&point.velocities),
            accelerations: [0.0; MAX_JOINTS],
        }
    }
}

// ============================================================================
// MOTO_MOTION_CTRL (2001)
// ============================================================================

/// 运动控制指令码
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i32)]
pub enum MotionCtrlCommand {
    /// 查询控制器是否可接收运动指令
    CheckMotionReady = 200101,
    /// 查询运动队列中的点数
    CheckQueueCnt = 200102,
    /// 停止当前运动
    StopMotion = 200111,
    /// 伺服上电
    StartServos = 200112,
    /// 伺服断电
    StopServos = 200113,
    /// 复位报警
    ResetAlarm = 200114,
    /// 进入轨迹模式（伺服上电并准备接收轨迹点）
    StartTrajMode = 200121,
    /// 退出轨迹模式
    StopTrajMode = 200122,
    /// 断开运动服务器连接
    Disconnect = 200130,
}

/// 运动控制指令帧负载
///
/// 布局：group, sequence, command, data[10]
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotionCtrl {
    pub group: i32,
    pub sequence: i32,
    /// 指令码（原样保留线上值，见 [`MotionCtrl::command`]）
    pub command_code: i32,
    pub data: [f32; MAX_JOINTS],
}

impl MotionCtrl {
    /// 创建运动控制指令
    pub fn new(sequence: i32, command: MotionCtrlCommand) -> Self {
        Self {
            group: DEFAULT_GROUP,
            sequence,
            command_code: command.into(),
            data: [0.0; MAX_JOINTS],
        }
    }

    /// 创建进入轨迹模式指令
    pub fn trajectory_start(sequence: i32) -> Self {
        Self::new(sequence, MotionCtrlCommand::StartTrajMode)
    }

    /// 创建退出轨迹模式指令
    pub fn trajectory_stop(sequence: i32) -> Self {
        Self::new(sequence, MotionCtrlCommand::StopTrajMode)
    }

    /// 解析指令码，未知值返回 `None`
    pub fn command(&self) -> Option<MotionCtrlCommand> {
        MotionCtrlCommand::try_from(self.command_code).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_from_slices() {
        let pos = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        let vel = [1.0; 6];
        let point = TrajectoryPoint::from_slices(&pos, &vel, 0.05).unwrap();
        assert_eq!(point.positions, pos);
        assert_eq!(point.time, 0.05);

        assert!(TrajectoryPoint::from_slices(&pos[..5], &vel, 0.05).is_none());
        assert!(TrajectoryPoint::from_slices(&pos, &[0.0; 7], 0.05).is_none());
    }

    #[test]
    fn test_point_is_finite() {
        let mut point = TrajectoryPoint::new([0.0; 6], [0.0; 6], 0.1);
        assert!(point.is_finite());
        point.velocities[3] = f32::NAN;
        assert!(!point.is_finite());
    }

    #[test]
    fn test_traj_pt_full_from_point() {
        let point = TrajectoryPoint::new([1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [0.5; 6], 0.2);
        let pt = JointTrajPtFull::from_point(42, &point, 1.2);

        assert_eq!(pt.sequence, 42);
        assert_eq!(pt.group, 0);
        assert_eq!(pt.valid_fields, 0x07);
        assert_eq!(pt.time, 1.2);
        assert_eq!(pt.positions[..6], [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(pt.positions[6..], [0.0; 4]);
        assert_eq!(pt.velocities[5], 0.5);
        assert_eq!(pt.accelerations, [0.0; 10]);
    }

    #[test]
    fn test_motion_ctrl_commands() {
        let start = MotionCtrl::trajectory_start(1);
        assert_eq!(start.command_code, 200121);
        assert_eq!(start.command(), Some(MotionCtrlCommand::StartTrajMode));

        let stop = MotionCtrl::trajectory_stop(2);
        assert_eq!(stop.command(), Some(MotionCtrlCommand::StopTrajMode));

        let unknown = MotionCtrl {
            command_code: 123,
            ..start
        };
        assert_eq!(unknown.command(), None);
    }
}
