//! 驱动层错误类型定义

use bbplay_pins::PinError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 引脚驱动错误（硬件故障）
    #[error("Pin driver error: {0}")]
    Pin(#[from] PinError),

    /// 命令通道已关闭（队列线程退出，命令未执行）
    #[error("Command channel closed")]
    ChannelClosed,

    /// 等待结果超时（命令仍在队列中，不会被取消）
    #[error("Operation timeout")]
    Timeout,

    /// 操作内部 panic
    #[error("Operation panicked: {0}")]
    OperationPanicked(String),

    /// 队列线程错误
    #[error("Queue thread error: {0}")]
    QueueThread(String),

    /// 无效输入
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DriverError {
    /// 是否来自硬件（而非队列自身）
    pub fn is_hardware(&self) -> bool {
        matches!(self, DriverError::Pin(_))
    }
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use bbplay_pins::{PinError, PinId};

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::Pin(PinError::UnknownPin(PinId::from("P9_14")));
        let msg = format!("{}", err);
        assert!(msg.contains("Pin driver error") && msg.contains("P9_14"));

        assert_eq!(
            format!("{}", DriverError::ChannelClosed),
            "Command channel closed"
        );
        assert_eq!(format!("{}", DriverError::Timeout), "Operation timeout");

        let msg = format!("{}", DriverError::OperationPanicked("boom".to_string()));
        assert!(msg.contains("panicked") && msg.contains("boom"));
    }

    #[test]
    fn test_from_pin_error() {
        let err: DriverError = PinError::UnknownPin(PinId::from("P8_07")).into();
        assert!(err.is_hardware());
        match err {
            DriverError::Pin(PinError::UnknownPin(pin)) => assert_eq!(pin.as_str(), "P8_07"),
            _ => panic!("Expected Pin variant"),
        }
        assert!(!DriverError::Timeout.is_hardware());
    }
}
