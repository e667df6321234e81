//! 控制层错误类型

use bbplay_driver::DriverError;
use bbplay_pins::PinError;
use std::fmt;
use thiserror::Error;

/// 资源类别（用于 NotFound）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Servo,
    Sensor,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Servo => f.write_str("servo"),
            Resource::Sensor => f.write_str("sensor"),
        }
    }
}

/// 错误分类（带显式判别值，便于跨边界传递）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlErrorKind {
    NotFound = 1,
    Busy = 2,
    HardwareFault = 3,
    InvalidConfig = 4,
    InvalidPosition = 5,
}

/// 控制层统一错误类型
#[derive(Error, Debug)]
pub enum ControlError {
    /// id 超出配置范围
    #[error("{resource} {id} not found")]
    NotFound { resource: Resource, id: usize },

    /// 该舵机已有写入在执行（仅 reject-when-busy 策略）
    #[error("servo {id} is busy, retry later")]
    Busy { id: usize },

    /// 引脚驱动或队列失败
    #[error("hardware fault: {0}")]
    HardwareFault(#[from] DriverError),

    /// 配置缺失或非法（启动时致命）
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// NaN 或无穷大
    #[error("invalid position: {0}")]
    InvalidPosition(f64),
}

impl ControlError {
    pub fn kind(&self) -> ControlErrorKind {
        match self {
            ControlError::NotFound { .. } => ControlErrorKind::NotFound,
            ControlError::Busy { .. } => ControlErrorKind::Busy,
            ControlError::HardwareFault(_) => ControlErrorKind::HardwareFault,
            ControlError::InvalidConfig(_) => ControlErrorKind::InvalidConfig,
            ControlError::InvalidPosition(_) => ControlErrorKind::InvalidPosition,
        }
    }

    /// 只有配置错误是致命的，其余都可以由调用方重试或报告
    pub fn is_fatal(&self) -> bool {
        matches!(self, ControlError::InvalidConfig(_))
    }

    pub(crate) fn servo_not_found(id: usize) -> Self {
        ControlError::NotFound {
            resource: Resource::Servo,
            id,
        }
    }

    pub(crate) fn sensor_not_found(id: usize) -> Self {
        ControlError::NotFound {
            resource: Resource::Sensor,
            id,
        }
    }
}

impl From<PinError> for ControlError {
    fn from(err: PinError) -> Self {
        ControlError::HardwareFault(DriverError::Pin(err))
    }
}
