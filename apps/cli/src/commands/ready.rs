//! ready 命令
//!
//! 查询控制器是否可接收运动指令

use super::ConnectionArgs;
use anyhow::Result;
use clap::Args;
use fs100_driver::{DriverBuilder, DriverError, MotionReplyResult, RetryPolicy};
use std::process::ExitCode;

/// 未就绪时的退出码
const NOT_READY_EXIT_CODE: u8 = 2;

/// 运动就绪检查命令参数
#[derive(Args, Debug)]
pub struct ReadyCommand {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// 未就绪时按配置重试
    #[arg(long)]
    pub retry: bool,
}

/// 检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady {
        result: MotionReplyResult,
        subcode: i32,
    },
}

impl Readiness {
    /// 控制器的拒绝是检查结果，其余错误照常返回
    fn from_check(check: Result<(), DriverError>) -> Result<Self, DriverError> {
        match check {
            Ok(()) => Ok(Readiness::Ready),
            Err(DriverError::Rejected {
                result, subcode, ..
            }) => Ok(Readiness::NotReady { result, subcode }),
            Err(e) => Err(e),
        }
    }

    pub fn exit_code(self) -> ExitCode {
        match self {
            Readiness::Ready => ExitCode::SUCCESS,
            Readiness::NotReady { .. } => ExitCode::from(NOT_READY_EXIT_CODE),
        }
    }
}

impl ReadyCommand {
    pub fn execute(&self) -> Result<Readiness> {
        let config = self.connection.load()?;
        let policy = if self.retry {
            config.retry_policy()
        } else {
            RetryPolicy::single_shot().with_reply_timeout(config.reply_timeout())
        };

        let mut driver = DriverBuilder::new().config(config).build()?;
        driver.connect()?;

        let check = driver.check_motion_ready(policy);
        driver.close();

        let readiness = Readiness::from_check(check)?;
        match readiness {
            Readiness::Ready => println!("Controller is ready for motion"),
            Readiness::NotReady { result, subcode } => {
                println!("Controller not ready: {:?} (subcode {})", result, subcode)
            },
        }
        Ok(readiness)
    }
}
