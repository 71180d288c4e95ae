//! stream 命令
//!
//! 连接 → 进入轨迹模式 → 入队全部 CSV 点 → 等待发送完成 → 关闭

use super::{ConnectionArgs, interrupt_flag};
use crate::trajectory;
use anyhow::{Result, bail};
use clap::Args;
use fs100_driver::{DriverBuilder, RetryPolicy, SessionState};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{info, warn};

/// 流式发送命令参数
#[derive(Args, Debug)]
pub struct StreamCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// CSV 轨迹文件（每行 p1..p6,v1..v6,t）
    #[arg(short, long)]
    pub trajectory: PathBuf,

    /// 握手失败时按配置重试
    #[arg(long)]
    pub retry: bool,
}

impl StreamCommand {
    pub fn execute(&self) -> Result<()> {
        let config = self.connection.load()?;
        let points = trajectory::load(&self.trajectory)?;
        info!(
            "Loaded {} point(s) from {}",
            points.len(),
            self.trajectory.display()
        );

        let policy = if self.retry {
            config.retry_policy()
        } else {
            RetryPolicy::single_shot().with_reply_timeout(config.reply_timeout())
        };

        let running = interrupt_flag()?;
        let mut driver = DriverBuilder::new().config(config).build()?;

        driver.connect()?;
        driver.start(policy)?;

        for point in points {
            driver.enqueue_point(point)?;
        }

        while running.load(Ordering::SeqCst) {
            if driver.wait_until_drained(Duration::from_millis(200)) {
                break;
            }
            let state = driver.state();
            if !matches!(state, SessionState::Ready | SessionState::Streaming) {
                break;
            }
            info!("{} point(s) pending", driver.queue_len());
        }

        let interrupted = !running.load(Ordering::SeqCst);
        if interrupted {
            warn!("Interrupted, stopping trajectory");
            if let Err(e) = driver.stop_trajectory(RetryPolicy::single_shot()) {
                warn!("Stop failed: {}", e);
            }
        }

        let metrics = driver.metrics();
        let failure = driver.last_error();
        driver.close();

        println!(
            "Sent {} point(s), dropped {}, rejected replies {}, decode errors {}",
            metrics.points_sent,
            metrics.points_dropped,
            metrics.replies_rejected,
            metrics.decode_errors
        );

        if let Some(err) = failure {
            bail!("streaming failed: {}", err);
        }
        Ok(())
    }
}
