//! 传感器读取
//!
//! 读取不经过命令队列：同步调用引脚驱动，读操作不改变硬件状态。

use crate::config::SensorConfig;
use crate::error::ControlError;
use crate::servo::DeviceInfo;
use bbplay_pins::PinDriver;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::trace;

/// ADC 参考电压（毫伏），归一化读数乘以它得到毫伏
pub const ADC_REFERENCE_MV: f64 = 1800.0;

/// 温度换算结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature {
    pub millivolts: f64,
    pub celsius: f64,
    pub fahrenheit: f64,
}

impl Temperature {
    /// 10 mV/°C 的线性传感器
    pub fn from_millivolts(millivolts: f64) -> Self {
        let celsius = millivolts / 10.0;
        Self {
            millivolts,
            celsius,
            fahrenheit: celsius * 9.0 / 5.0 + 32.0,
        }
    }

    /// 从归一化 ADC 读数换算
    pub fn from_normalized(value: f64) -> Self {
        Self::from_millivolts(value * ADC_REFERENCE_MV)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub timestamp: DateTime<Utc>,
    /// 归一化值 [0, 1]
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureReading {
    pub timestamp: DateTime<Utc>,
    pub temperature: Temperature,
}

impl TemperatureReading {
    pub fn timestamp_rfc3339(&self) -> String {
        crate::format_timestamp(&self.timestamp)
    }
}

pub struct SensorReader {
    driver: Arc<dyn PinDriver>,
    sensors: Vec<SensorConfig>,
}

impl SensorReader {
    pub fn new(driver: Arc<dyn PinDriver>, sensors: Vec<SensorConfig>) -> Self {
        Self { driver, sensors }
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn exists(&self, id: usize) -> bool {
        id < self.sensors.len()
    }

    pub fn list(&self) -> Vec<DeviceInfo> {
        self.sensors
            .iter()
            .enumerate()
            .map(|(id, sensor)| DeviceInfo {
                id,
                pins: sensor.pins.clone(),
            })
            .collect()
    }

    pub fn read(&self, id: usize) -> Result<SensorReading, ControlError> {
        let sensor = self
            .sensors
            .get(id)
            .ok_or_else(|| ControlError::sensor_not_found(id))?;
        let value = self.driver.read_analog(&sensor.pins.signal)?;
        trace!("Sensor {} read {:.4}", id, value);
        Ok(SensorReading {
            timestamp: Utc::now(),
            value,
        })
    }

    pub fn read_temperature(&self, id: usize) -> Result<TemperatureReading, ControlError> {
        let reading = self.read(id)?;
        Ok(TemperatureReading {
            timestamp: reading.timestamp,
            temperature: Temperature::from_normalized(reading.value),
        })
    }
}
