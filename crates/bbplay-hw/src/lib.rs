//! # bbplay 硬件控制层
//!
//! 在命令队列之上提供：
//! - 舵机位置控制（目标合并、单舵机写入互斥、固定频率周期写入）
//! - 温度传感器读取与单位换算
//! - TOML 硬件配置

mod config;
mod duty;
mod error;
mod hardware;
mod sensor;
mod servo;

pub use config::{
    HardwareConfig, PinSet, QueueSection, SensorConfig, ServoConfig, ServoSection, WritePolicy,
};
pub use duty::{DutyCycleRange, clamp_position};
pub use error::{ControlError, ControlErrorKind, Resource};
pub use hardware::Hardware;
pub use sensor::{
    ADC_REFERENCE_MV, SensorReader, SensorReading, Temperature, TemperatureReading,
};
pub use servo::{CycleWrite, DeviceInfo, ServoController, ServoReading, WriteOutcome};

use chrono::{DateTime, SecondsFormat, Utc};

/// RFC 3339 / ISO-8601，毫秒精度，`Z` 结尾
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_timestamp() {
        let ts = Utc
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 5)
            .single()
            .unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-01T12:30:05.000Z");
    }
}
