//! 控制指令重试策略

use std::time::Duration;

/// 默认最大尝试次数（`until_acknowledged`）
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// 默认重试间隔
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// 默认应答等待时间
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// 控制指令重试策略
///
/// 每次尝试使用新的序列号发送指令，并在 `reply_timeout` 内等待序列号匹配的应答。
/// 未成功时间隔 `interval` 再次尝试，直到成功、次数用尽或出现传输层错误。
///
/// # Example
///
/// ```
/// use fs100_driver::RetryPolicy;
/// use std::time::Duration;
///
/// // 只尝试一次
/// let once = RetryPolicy::single_shot();
/// assert_eq!(once.max_attempts, Some(1));
///
/// // 最多 20 次，间隔 100ms
/// let policy = RetryPolicy::until_acknowledged()
///     .with_max_attempts(20)
///     .with_interval(Duration::from_millis(100));
/// assert!(policy.allows(19));
/// assert!(!policy.allows(20));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（`None` 表示不限次数）
    pub max_attempts: Option<u32>,
    /// 两次尝试之间的间隔
    pub interval: Duration,
    /// 每次尝试等待应答的时间
    pub reply_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::until_acknowledged()
    }
}

impl RetryPolicy {
    /// 只发送一次，失败立即返回
    pub fn single_shot() -> Self {
        Self {
            max_attempts: Some(1),
            interval: DEFAULT_RETRY_INTERVAL,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    /// 重试直到控制器确认（默认最多 [`DEFAULT_MAX_ATTEMPTS`] 次）
    pub fn until_acknowledged() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            interval: DEFAULT_RETRY_INTERVAL,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    /// 不限次数重试（只在传输层错误时停止）
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            ..Self::until_acknowledged()
        }
    }

    /// 从布尔重试标志构造
    pub fn from_flag(retry: bool) -> Self {
        if retry {
            Self::until_acknowledged()
        } else {
            Self::single_shot()
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// 已尝试 `attempts_made` 次后是否还允许再尝试
    pub fn allows(&self, attempts_made: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts_made < max,
            None => true,
        }
    }

    pub fn is_single_shot(&self) -> bool {
        self.max_attempts == Some(1)
    }
}
