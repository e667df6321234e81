//! 舵机命令

use crate::output;
use crate::setup::{self, GlobalArgs};
use anyhow::{Context, Result};
use bbplay::hw::clamp_position;
use bbplay::{Hardware, PinMode};
use clap::Subcommand;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// 轮询已提交位置的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 舵机命令
#[derive(Subcommand, Debug)]
pub enum ServoCommand {
    /// 列出已配置的舵机
    List,

    /// 设置舵机位置（0 = 最小，1 = 最大，超出范围会被截断）
    Set {
        /// 舵机 ID
        id: usize,

        /// 目标位置
        #[arg(allow_negative_numbers = true)]
        position: f64,

        /// 等待写入完成的最长时间（毫秒）
        #[arg(long, default_value_t = 2000)]
        wait_ms: u64,
    },

    /// 读取舵机最近一次写入的位置
    Get {
        /// 舵机 ID
        id: usize,
    },
}

impl ServoCommand {
    pub fn execute(self, global: &GlobalArgs) -> Result<()> {
        match self {
            ServoCommand::List => {
                let hw = setup::start(global, false)?;
                for info in hw.servos().list() {
                    println!("{}", output::device(&info));
                }
                Ok(())
            },

            ServoCommand::Set {
                id,
                position,
                wait_ms,
            } => {
                let hw = setup::start(global, true)?;
                set_and_wait(&hw, id, position, Duration::from_millis(wait_ms))?;
                let reading = hw.servos().read(id)?;
                println!("{}", output::servo_reading(id, &reading));
                Ok(())
            },

            ServoCommand::Get { id } => {
                let hw = setup::start(global, false)?;
                let reading = hw.servos().read(id)?;
                println!("{}", output::servo_reading(id, &reading));
                Ok(())
            },
        }
    }
}

/// 配置引脚并设置位置，等待本次请求对应的写入结束
///
/// 合并策略下位置由后台写入线程提交。调用前记下已提交的写入数，
/// 之后只认序号更大的写入结果，因此重复设置同一位置也会等到新的写入，
/// 写入失败时返回错误。
pub fn set_and_wait(hw: &Hardware, id: usize, position: f64, timeout: Duration) -> Result<()> {
    let servos = hw.servos();
    let range = servos.duty_cycle_range(id)?;
    let signal = hw
        .config()
        .servos
        .get(id)
        .map(|servo| servo.pins.signal.clone())
        .context("servo config missing")?;

    hw.queue()
        .pin(signal)
        .set_mode(PinMode::Output)
        .wait_timeout(timeout)
        .context("配置舵机引脚失败")?;

    let target = clamp_position(position);
    debug!(
        "Servo {} target {:.3} (duty {:.4})",
        id,
        target,
        range.duty_for(target)
    );

    let issued_before = servos.issued_writes(id)?;
    if let Some(handle) = servos.set_position(id, position)? {
        handle.wait_timeout(timeout).context("舵机写入失败")?;
        info!("Servo {} set to {:.3}", id, target);
        return Ok(());
    }

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(outcome) = servos.last_write(id)?
            && outcome.seq > issued_before
        {
            if let Some(error) = outcome.error {
                anyhow::bail!("舵机 {} 写入失败: {}", id, error);
            }
            if outcome.position == target {
                info!("Servo {} set to {:.3}", id, target);
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            anyhow::bail!("舵机 {} 在 {:?} 内未完成写入", id, timeout);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
