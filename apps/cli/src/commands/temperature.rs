//! 温度命令

use crate::output;
use crate::setup::{self, GlobalArgs};
use anyhow::Result;
use clap::Args;

/// 温度读取参数
#[derive(Args, Debug)]
pub struct TemperatureCommand {
    /// 传感器 ID（省略时读取全部）
    pub id: Option<usize>,
}

impl TemperatureCommand {
    pub fn execute(self, global: &GlobalArgs) -> Result<()> {
        let hw = setup::start(global, false)?;
        let sensors = hw.sensors();

        let ids: Vec<usize> = match self.id {
            Some(id) => vec![id],
            None => (0..sensors.len()).collect(),
        };

        for id in ids {
            let reading = sensors.read_temperature(id)?;
            println!("{}", output::temperature(id, &reading));
        }
        Ok(())
    }
}
