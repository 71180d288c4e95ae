//! # FS100 CLI
//!
//! Command-line interface for streaming joint trajectories to a Motoman FS100 controller.
//!
//! ```bash
//! # 流式发送 CSV 轨迹（每行 p1..p6,v1..v6,t）
//! fs100-cli stream --config fs100.toml --trajectory path.csv --retry
//!
//! # 查询控制器是否可接收运动指令
//! fs100-cli ready --host 192.168.255.1
//!
//! # 打印状态端口反馈
//! fs100-cli monitor --frequency 5
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

mod commands;
mod trajectory;

use commands::{MonitorCommand, ReadyCommand, StreamCommand};

/// FS100 CLI - 轨迹流式发送工具
#[derive(Parser, Debug)]
#[command(name = "fs100-cli")]
#[command(about = "Stream joint trajectories to a Motoman FS100 controller", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 连接、进入轨迹模式并发送 CSV 轨迹
    Stream {
        #[command(flatten)]
        args: StreamCommand,
    },

    /// 检查控制器是否可接收运动指令
    Ready {
        #[command(flatten)]
        args: ReadyCommand,
    },

    /// 监控状态端口反馈
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fs100_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stream { args } => args.execute()?,
        Commands::Ready { args } => return Ok(args.execute()?.exit_code()),
        Commands::Monitor { args } => args.execute()?,
    }
    Ok(ExitCode::SUCCESS)
}
