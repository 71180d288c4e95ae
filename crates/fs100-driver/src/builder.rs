//! Builder 模式实现
//!
//! 提供链式构造 `Fs100Driver` 实例的便捷方式。

use crate::config::DriverConfig;
use crate::driver::Fs100Driver;
use crate::error::DriverError;
use crate::retry::RetryPolicy;
use fs100_net::{Connector, TcpConnector};
use fs100_protocol::ByteOrder;

/// Fs100Driver Builder（链式构造）
///
/// 未设置的字段沿用基础配置（默认为 [`DriverConfig::default`]）。
///
/// # Example
///
/// ```no_run
/// use fs100_driver::{DriverBuilder, RetryPolicy};
/// use std::time::Duration;
///
/// let mut driver = DriverBuilder::new()
///     .host("192.168.255.1")
///     .retry_policy(RetryPolicy::until_acknowledged().with_max_attempts(5))
///     .connect_timeout(Duration::from_secs(1))
///     .build()?;
///
/// driver.connect()?;
/// # Ok::<(), fs100_driver::DriverError>(())
/// ```
#[derive(Default)]
pub struct DriverBuilder {
    /// 基础配置（例如从 TOML 文件加载）
    base: Option<DriverConfig>,
    host: Option<String>,
    motion_port: Option<u16>,
    state_port: Option<u16>,
    connect_timeout_ms: Option<u64>,
    retry_policy: Option<RetryPolicy>,
    byte_order: Option<ByteOrder>,
    queue_capacity: Option<usize>,
    drain_timeout_ms: Option<u64>,
    /// 自定义连接工厂（测试或非 TCP 传输）
    connector: Option<Box<dyn Connector>>,
}

impl DriverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以已有配置为基础
    pub fn config(mut self, config: DriverConfig) -> Self {
        self.base = Some(config);
        self
    }

    /// 控制器主机名或 IP
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn motion_port(mut self, port: u16) -> Self {
        self.motion_port = Some(port);
        self
    }

    pub fn state_port(mut self, port: u16) -> Self {
        self.state_port = Some(port);
        self
    }

    pub fn connect_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.connect_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// 默认重试策略（写回配置中的重试字段）
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = Some(order);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// 流式线程每次发送后读取应答的等待时间
    pub fn drain_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.drain_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// 使用自定义连接工厂替代 TCP
    pub fn connector(mut self, connector: Box<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// 合并后的配置（已校验）
    pub fn resolve_config(&self) -> Result<DriverConfig, DriverError> {
        let mut config = self.base.clone().unwrap_or_default();

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.motion_port {
            config.motion_port = port;
        }
        if let Some(port) = self.state_port {
            config.state_port = port;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout_ms = ms;
        }
        if let Some(policy) = &self.retry_policy {
            config.unbounded_retry = policy.max_attempts.is_none();
            if let Some(max) = policy.max_attempts {
                config.max_attempts = max;
            }
            config.retry_interval_ms = policy.interval.as_millis() as u64;
            config.reply_timeout_ms = policy.reply_timeout.as_millis() as u64;
        }
        if let Some(order) = self.byte_order {
            config.byte_order = order;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(ms) = self.drain_timeout_ms {
            config.drain_timeout_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }

    /// 构建驱动实例（不建立连接）
    ///
    /// # Errors
    /// - `DriverError::Config`: 合并后的配置无效
    pub fn build(self) -> Result<Fs100Driver, DriverError> {
        let config = self.resolve_config()?;
        let connector = match self.connector {
            Some(connector) => connector,
            None => Box::new(
                TcpConnector::new(config.motion_addr(), config.connect_timeout())
                    .with_byte_order(config.byte_order),
            ),
        };
        Ok(Fs100Driver::with_connector(config, connector))
    }
}
