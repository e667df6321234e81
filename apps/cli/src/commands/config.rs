//! 配置管理命令
//!
//! 硬件配置文件为 TOML，默认位于 `<config_dir>/bbplay/hardware.toml`。

use crate::setup::{self, GlobalArgs};
use anyhow::{Context, Result};
use bbplay::HardwareConfig;
use clap::Subcommand;
use std::fs;
use std::path::PathBuf;

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印生效的配置（TOML）
    Show,

    /// 打印配置文件路径
    Path,

    /// 写入默认配置文件
    Init {
        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },

    /// 校验配置文件
    Check,
}

impl ConfigCommand {
    pub fn execute(self, global: &GlobalArgs) -> Result<()> {
        match self {
            ConfigCommand::Show => {
                let config = setup::load_config(global.config.as_deref())?;
                print!("{}", config.to_toml_string()?);
                Ok(())
            },

            ConfigCommand::Path => {
                println!("{}", config_path(global)?.display());
                Ok(())
            },

            ConfigCommand::Init { force } => {
                let path = config_path(global)?;
                if path.exists() && !force {
                    anyhow::bail!("配置文件已存在: {}（使用 --force 覆盖）", path.display());
                }
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    fs::create_dir_all(parent).context("创建配置目录失败")?;
                }
                HardwareConfig::default().save(&path)?;
                println!("✅ 已写入默认配置: {}", path.display());
                Ok(())
            },

            ConfigCommand::Check => {
                let path = config_path(global)?;
                let config = setup::load_config(Some(&path))?;
                println!(
                    "✅ 配置有效: {} 个舵机, {} 个温度传感器",
                    config.servos.len(),
                    config.temperature_sensors.len()
                );
                Ok(())
            },
        }
    }
}

fn config_path(global: &GlobalArgs) -> Result<PathBuf> {
    match &global.config {
        Some(path) => Ok(path.clone()),
        None => setup::default_config_path(),
    }
}
