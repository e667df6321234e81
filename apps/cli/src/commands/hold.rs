//! 保持命令
//!
//! 初始化所有舵机后保持后台写入线程运行，定期记录队列指标，Ctrl-C 退出。

use crate::output;
use crate::setup::{self, GlobalArgs};
use anyhow::{Context, Result};
use clap::Args;
use crossbeam_channel::{RecvTimeoutError, bounded};
use std::time::Duration;
use tracing::info;

/// 未配置初始位置时使用的位置（中位）
const DEFAULT_HOLD_POSITION: f64 = 0.5;

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct HoldCommand {
    /// 初始位置（默认使用配置中的 `servo.initial_position`）
    #[arg(long, allow_negative_numbers = true)]
    pub position: Option<f64>,
}

impl HoldCommand {
    pub fn execute(self, global: &GlobalArgs) -> Result<()> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        ctrlc::set_handler(move || {
            let _ = stop_tx.try_send(());
        })
        .context("注册 Ctrl-C 处理器失败")?;

        let hw = setup::start(global, true)?;
        let position = self
            .position
            .or(hw.config().servo.initial_position)
            .unwrap_or(DEFAULT_HOLD_POSITION);

        for handle in hw.servos().init(position)? {
            handle.wait_timeout(Duration::from_secs(2)).context("配置舵机引脚失败")?;
        }

        info!(
            "Holding {} servo(s) at {:.3}, press Ctrl-C to stop",
            hw.servos().len(),
            position
        );

        loop {
            match stop_rx.recv_timeout(REPORT_INTERVAL) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    let metrics = hw.queue().metrics();
                    info!(
                        "queue: submitted={} succeeded={} failed={} in_flight={}",
                        metrics.submitted, metrics.succeeded, metrics.failed, metrics.in_flight
                    );
                },
            }
        }

        info!("Stopping");
        println!("{}", output::metrics(&hw.queue().metrics()));
        Ok(())
    }
}
