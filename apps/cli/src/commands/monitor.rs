//! monitor 命令
//!
//! 读取状态端口并周期性打印关节位置与机器人状态

use super::{ConnectionArgs, interrupt_flag};
use anyhow::{Result, bail};
use clap::Args;
use fs100_driver::{JointFeedback, RobotStatus, StateReader};
use std::sync::atomic::Ordering;
use std::time::Duration;

/// 监控命令参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// 更新频率（Hz）
    #[arg(short, long, default_value_t = 2)]
    pub frequency: u32,
}

impl MonitorCommand {
    pub fn execute(&self) -> Result<()> {
        let config = self.connection.load()?;
        let running = interrupt_flag()?;

        let mut reader = StateReader::connect(&config)?;
        println!("Monitoring {} (Ctrl+C to stop)", config.state_addr());

        let interval = Duration::from_secs_f64(1.0 / self.frequency.max(1) as f64);
        let mut iteration = 0u64;

        while running.load(Ordering::SeqCst) {
            if !reader.is_running() {
                reader.shutdown();
                bail!("state connection lost");
            }

            iteration += 1;
            print_monitor_output(
                iteration,
                reader.latest_feedback().as_ref(),
                reader.latest_status().as_ref(),
            );
            std::thread::sleep(interval);
        }

        reader.shutdown();
        println!(
            "Received {} frame(s), {} decode error(s)",
            reader.frames_received(),
            reader.decode_errors()
        );
        Ok(())
    }
}

fn print_monitor_output(
    iteration: u64,
    feedback: Option<&JointFeedback>,
    status: Option<&RobotStatus>,
) {
    println!("--- #{} ---", iteration);
    match feedback {
        Some(f) => {
            let joints = f.joint_positions();
            let formatted: Vec<String> = joints.iter().map(|p| format!("{:.4}", p)).collect();
            println!("  t={:.3}s  joints=[{}]", f.time, formatted.join(", "));
        },
        None => println!("  no joint feedback yet"),
    }
    if let Some(s) = status {
        println!(
            "  drives={:?} e_stop={:?} error={:?}({}) motion={:?} possible={:?} mode={}",
            s.drives_powered(),
            s.e_stopped(),
            s.in_error(),
            s.error_code,
            s.in_motion(),
            s.motion_possible(),
            s.mode
        );
    }
}
