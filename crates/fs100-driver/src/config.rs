//! 驱动配置
//!
//! 可以在代码中构造，也可以从 TOML 文件加载：
//!
//! ```toml
//! host = "192.168.255.1"
//! motion_port = 50240
//! reply_timeout_ms = 500
//! retry_interval_ms = 200
//! max_attempts = 10
//! byte_order = "big_endian"
//! ```
//!
//! 未出现的字段使用默认值。时间字段单位均为毫秒。

use crate::error::DriverError;
use crate::pipeline::PipelineConfig;
use crate::retry::RetryPolicy;
use fs100_protocol::{ByteOrder, MOTION_PORT, STATE_PORT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 控制器默认地址
pub const DEFAULT_HOST: &str = "192.168.255.1";

/// 驱动配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// 控制器主机名或 IP
    pub host: String,
    /// 运动指令端口
    pub motion_port: u16,
    /// 状态反馈端口
    pub state_port: u16,
    /// 建立连接超时（毫秒）
    pub connect_timeout_ms: u64,
    /// 每次尝试等待应答的时间（毫秒）
    pub reply_timeout_ms: u64,
    /// 重试间隔（毫秒）
    pub retry_interval_ms: u64,
    /// 控制指令最大尝试次数
    pub max_attempts: u32,
    /// 不限次数重试（忽略 `max_attempts`）
    pub unbounded_retry: bool,
    /// 线上字节序
    pub byte_order: ByteOrder,
    /// 队列初始容量
    pub queue_capacity: usize,
    /// 流式线程每次发送后读取应答的等待时间（毫秒）
    pub drain_timeout_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        let retry = RetryPolicy::until_acknowledged();
        Self {
            host: DEFAULT_HOST.to_string(),
            motion_port: MOTION_PORT,
            state_port: STATE_PORT,
            connect_timeout_ms: 3000,
            reply_timeout_ms: retry.reply_timeout.as_millis() as u64,
            retry_interval_ms: retry.interval.as_millis() as u64,
            max_attempts: retry.max_attempts.unwrap_or(1),
            unbounded_retry: false,
            byte_order: ByteOrder::BigEndian,
            queue_capacity: 256,
            drain_timeout_ms: 0,
        }
    }
}

impl DriverConfig {
    /// 使用默认值，指定主机
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, DriverError> {
        let config: Self =
            toml::from_str(content).map_err(|e| DriverError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DriverError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String, DriverError> {
        toml::to_string_pretty(self).map_err(|e| DriverError::Config(e.to_string()))
    }

    /// 校验字段取值
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.host.trim().is_empty() {
            return Err(DriverError::Config("host must not be empty".into()));
        }
        if self.motion_port == 0 || self.state_port == 0 {
            return Err(DriverError::Config("ports must be non-zero".into()));
        }
        if self.reply_timeout_ms == 0 {
            return Err(DriverError::Config(
                "reply_timeout_ms must be greater than 0".into(),
            ));
        }
        if !self.unbounded_retry && self.max_attempts == 0 {
            return Err(DriverError::Config(
                "max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// 运动端口地址（`host:port`，IPv6 字面量加方括号）
    pub fn motion_addr(&self) -> String {
        join_host_port(&self.host, self.motion_port)
    }

    /// 状态端口地址
    pub fn state_addr(&self) -> String {
        join_host_port(&self.host, self.state_port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// 配置中的默认重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        let base = if self.unbounded_retry {
            RetryPolicy::unbounded()
        } else {
            RetryPolicy::until_acknowledged().with_max_attempts(self.max_attempts)
        };
        base.with_interval(Duration::from_millis(self.retry_interval_ms))
            .with_reply_timeout(self.reply_timeout())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            drain_timeout_ms: self.drain_timeout_ms,
        }
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
