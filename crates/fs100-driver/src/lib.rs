//! 驱动层模块
//!
//! 本模块提供 Motoman FS100 运动服务器的轨迹流式驱动，包括：
//! - 命令队列（门控 + 纪元，重置时原子清空）
//! - 流式发送线程（出队即发送，无人为延时）
//! - 会话状态机（连接 → 轨迹模式 → 流式发送 → 停止 / 关闭）
//! - 控制指令的请求 / 应答交换与重试策略
//! - 状态端口读取（ArcSwap 无锁读取）
//!
//! # 使用场景
//!
//! 上层规划器把关节空间轨迹点按时间顺序入队，驱动负责把它们按序列号递增的顺序
//! 发送给控制器。入队从不阻塞，空队列不是错误。

mod builder;
pub mod config;
mod driver;
mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod state;
mod state_reader;

pub use builder::DriverBuilder;
pub use config::{DEFAULT_HOST, DriverConfig};
pub use driver::Fs100Driver;
pub use error::DriverError;
pub use event::{DriverEvent, EVENT_CHANNEL_CAPACITY, EventBus};
pub use metrics::{DriverMetrics, MetricsSnapshot};
pub use pipeline::{PipelineConfig, stream_loop};
pub use queue::{CommandQueue, Popped};
pub use retry::RetryPolicy;
pub use state::{AtomicSessionState, SessionState};
pub use state_reader::{DEFAULT_POLL_INTERVAL, StateReader};

// 重新导出协议层常用类型
pub use fs100_protocol::{
    ByteOrder, JointFeedback, MotionCtrlCommand, MotionReply, MotionReplyResult,
    MotionReplySubcode, NUMBER_OF_JOINTS, RobotStatus, TrajectoryPoint,
};
