//! # bbplay Pin Layer
//!
//! 引脚硬件抽象层，为 PWM 输出、模拟输入和 GPIO 提供统一的驱动接口。
//!
//! 上层（命令队列、舵机控制器）只通过 [`PinDriver`] 访问硬件，
//! 不关心具体后端是 sysfs、内存 Mock 还是其他实现。

use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockPinDriver, PinCall, PinEvent};

#[cfg(target_os = "linux")]
pub mod sysfs;

#[cfg(target_os = "linux")]
pub use sysfs::SysfsPinDriver;

/// 引脚标识（如 `P9_14`）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct PinId(String);

impl PinId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 空名称（配置缺失）
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PinId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PinId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&PinId> for PinId {
    fn from(pin: &PinId) -> Self {
        pin.clone()
    }
}

impl Borrow<str> for PinId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// 引脚工作模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "lowercase"))]
pub enum PinMode {
    Input,
    Output,
}

impl fmt::Display for PinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinMode::Input => f.write_str("input"),
            PinMode::Output => f.write_str("output"),
        }
    }
}

/// 逻辑引脚到 sysfs 通道的绑定
///
/// 仅 Linux sysfs 后端使用，但配置文件在所有平台上都可以解析。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "snake_case"))]
pub enum PinBinding {
    /// `class/pwm/pwmchip<chip>/pwm<channel>`
    Pwm { chip: u32, channel: u32 },
    /// `bus/iio/devices/iio:device<device>/in_voltage<channel>_raw`
    Adc { device: u32, channel: u32 },
    /// `class/gpio/gpio<number>`
    Gpio { number: u32 },
}

/// 引脚层统一错误类型
#[derive(Error, Debug)]
pub enum PinError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] PinDeviceError),
    #[error("Unknown pin: {0}")]
    UnknownPin(PinId),
    #[error("Invalid value for pin {pin}: {value}")]
    InvalidValue { pin: PinId, value: f64 },
    #[error("Operation '{operation}' not supported on pin {pin}")]
    Unsupported {
        pin: PinId,
        operation: &'static str,
    },
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDeviceErrorKind {
    Unknown,
    NotFound,
    AccessDenied,
    Busy,
    InvalidResponse,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct PinDeviceError {
    pub kind: PinDeviceErrorKind,
    pub message: String,
}

impl PinDeviceError {
    pub fn new(kind: PinDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            PinDeviceErrorKind::NotFound | PinDeviceErrorKind::AccessDenied
        )
    }
}

/// 检查占空比是否位于 [0, 1]
///
/// NaN 和无穷大同样被拒绝。
pub fn check_duty_cycle(pin: &PinId, duty_cycle: f64) -> Result<(), PinError> {
    if duty_cycle.is_finite() && (0.0..=1.0).contains(&duty_cycle) {
        Ok(())
    } else {
        Err(PinError::InvalidValue {
            pin: pin.clone(),
            value: duty_cycle,
        })
    }
}

/// 引脚驱动能力
///
/// 所有方法都接收 `&self`：流水线模式下多个操作可能并发访问同一个驱动，
/// 实现需要自行处理内部同步。
pub trait PinDriver: Send + Sync {
    /// 设置引脚模式
    fn set_mode(&self, pin: &PinId, mode: PinMode) -> Result<(), PinError>;

    /// PWM 输出
    ///
    /// - `duty_cycle`: 占空比，范围 [0, 1]
    /// - `frequency_hz`: PWM 频率
    fn write_analog(&self, pin: &PinId, duty_cycle: f64, frequency_hz: u32)
    -> Result<(), PinError>;

    /// 模拟输入，返回归一化值 [0, 1]（0 为 0V，1 为满量程）
    fn read_analog(&self, pin: &PinId) -> Result<f64, PinError>;

    /// 后端名称（用于日志）
    fn backend_name(&self) -> &'static str {
        "unknown"
    }
}
