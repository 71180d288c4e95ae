//! 命令定义和实现

pub mod monitor;
pub mod ready;
pub mod stream;

pub use monitor::MonitorCommand;
pub use ready::ReadyCommand;
pub use stream::StreamCommand;

use anyhow::{Context, Result};
use clap::Args;
use fs100_driver::DriverConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 各命令共用的连接参数
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// TOML 配置文件
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 控制器地址（覆盖配置）
    #[arg(long)]
    pub host: Option<String>,
}

impl ConnectionArgs {
    /// 加载配置，命令行参数优先
    pub fn load(&self) -> Result<DriverConfig> {
        let mut config = match &self.config {
            Some(path) => DriverConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => DriverConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

/// 注册 Ctrl+C 处理器，返回运行标志（收到信号后置为 `false`）
pub fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal. Shutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set signal handler")?;
    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_override() {
        let args = ConnectionArgs {
            config: None,
            host: Some("10.1.2.3".to_string()),
        };
        let config = args.load().unwrap();
        assert_eq!(config.motion_addr(), "10.1.2.3:50240");
    }

    #[test]
    fn test_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs100.toml");
        std::fs::write(&path, "host = \"robot\"\nmotion_port = 6000\n").unwrap();

        let args = ConnectionArgs {
            config: Some(path),
            host: None,
        };
        assert_eq!(args.load().unwrap().motion_addr(), "robot:6000");
    }
}
