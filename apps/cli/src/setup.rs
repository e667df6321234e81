//! 配置加载与硬件启动

use anyhow::{Context, Result};
use bbplay::pins::MockPinDriver;
use bbplay::{Hardware, HardwareConfig, PinDriver};
use clap::{Args, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// 引脚后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// 内存 Mock（无硬件）
    Mock,
    /// Linux sysfs（PWM / IIO ADC / GPIO）
    Sysfs,
}

/// 所有子命令共享的参数
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// 硬件配置文件（默认 `<config_dir>/bbplay/hardware.toml`）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 引脚后端
    #[arg(long, value_enum, default_value_t = Backend::Mock, global = true)]
    pub backend: Backend,

    /// sysfs 根目录（测试用）
    #[arg(long, global = true)]
    pub sysfs_root: Option<PathBuf>,
}

/// 默认配置目录
pub fn config_dir() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("bbplay");
    Ok(path)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("hardware.toml"))
}

/// 加载配置
///
/// 显式给出的路径必须存在；默认路径不存在时使用内置默认配置。
pub fn load_config(path: Option<&Path>) -> Result<HardwareConfig> {
    match path {
        Some(path) => HardwareConfig::load(path)
            .with_context(|| format!("加载配置文件失败: {}", path.display())),
        None => {
            let path = default_config_path()?;
            if path.exists() {
                debug!("Loading hardware config from {}", path.display());
                HardwareConfig::load(&path)
                    .with_context(|| format!("加载配置文件失败: {}", path.display()))
            } else {
                debug!("No config at {}, using defaults", path.display());
                Ok(HardwareConfig::default())
            }
        },
    }
}

pub fn build_driver(args: &GlobalArgs, config: &HardwareConfig) -> Result<Arc<dyn PinDriver>> {
    match args.backend {
        Backend::Mock => Ok(Arc::new(MockPinDriver::new())),
        Backend::Sysfs => sysfs_driver(args, config),
    }
}

#[cfg(target_os = "linux")]
fn sysfs_driver(args: &GlobalArgs, config: &HardwareConfig) -> Result<Arc<dyn PinDriver>> {
    use bbplay::pins::SysfsPinDriver;

    let bindings = config.pin_bindings();
    let driver = match &args.sysfs_root {
        Some(root) => SysfsPinDriver::with_root(root, bindings),
        None => SysfsPinDriver::new(bindings),
    };
    Ok(Arc::new(driver))
}

#[cfg(not(target_os = "linux"))]
fn sysfs_driver(_args: &GlobalArgs, _config: &HardwareConfig) -> Result<Arc<dyn PinDriver>> {
    anyhow::bail!("sysfs 后端仅支持 Linux")
}

/// 加载配置、创建驱动并启动硬件栈
pub fn start(args: &GlobalArgs, with_writer: bool) -> Result<Hardware> {
    let config = load_config(args.config.as_deref())?;
    let driver = build_driver(args, &config)?;
    let backend = driver.backend_name();

    let hw = if with_writer {
        Hardware::start(config, driver)
    } else {
        Hardware::start_without_writer(config, driver)
    }
    .context("启动硬件失败")?;

    info!("Using {} backend", backend);
    Ok(hw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn mock_args(config: Option<PathBuf>) -> GlobalArgs {
        GlobalArgs {
            config,
            backend: Backend::Mock,
            sysfs_root: None,
        }
    }

    #[test]
    fn test_load_explicit_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[servos]]\npins = {{ signal = \"P8_13\" }}\nduty_cycle = {{ min = 0.05, max = 0.1 }}"
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.servos[0].pins.signal.as_str(), "P8_13");
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        assert!(load_config(Some(Path::new("/nonexistent/hardware.toml"))).is_err());
    }

    #[test]
    fn test_start_mock_backend() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[servos]]\npins = {{ signal = \"P9_14\" }}\nduty_cycle = {{ min = 0.046, max = 0.134 }}"
        )
        .unwrap();

        let hw = start(&mock_args(Some(file.path().to_path_buf())), false).unwrap();
        assert_eq!(hw.servos().len(), 1);
        assert_eq!(hw.queue().driver().backend_name(), "mock");
    }
}
