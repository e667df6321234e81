//! # 硬件配置
//!
//! 从 TOML 加载舵机、传感器、队列参数以及 sysfs 引脚绑定。
//!
//! ```toml
//! [queue]
//! strict = true
//! max_idle_ms = 150
//! min_busy_ms = 1
//!
//! [servo]
//! write_frequency_hz = 10
//! pwm_frequency_hz = 60
//! policy = "coalesce"
//!
//! [[servos]]
//! pins = { signal = "P9_14", power = "P9_5", ground = "P9_1" }
//! duty_cycle = { min = 0.044, max = 0.135 }
//!
//! [[temperature_sensors]]
//! pins = { signal = "P9_40", power = "P9_6", ground = "P9_34" }
//!
//! [pins.P9_14]
//! pwm = { chip = 4, channel = 0 }
//! ```

use crate::duty::DutyCycleRange;
use crate::error::ControlError;
use bbplay_driver::QueueConfig;
use bbplay_pins::{PinBinding, PinId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// 舵机写入策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// 新目标覆盖未消费的旧目标，由周期写入线程下发
    #[default]
    Coalesce,
    /// 立即写入；已有写入在执行时返回 Busy
    RejectWhenBusy,
}

impl std::fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WritePolicy::Coalesce => f.write_str("coalesce"),
            WritePolicy::RejectWhenBusy => f.write_str("reject-when-busy"),
        }
    }
}

/// 设备引脚
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinSet {
    pub signal: PinId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<PinId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground: Option<PinId>,
}

impl PinSet {
    pub fn new(signal: impl Into<PinId>) -> Self {
        Self {
            signal: signal.into(),
            power: None,
            ground: None,
        }
    }

    pub fn with_power(mut self, pin: impl Into<PinId>) -> Self {
        self.power = Some(pin.into());
        self
    }

    pub fn with_ground(mut self, pin: impl Into<PinId>) -> Self {
        self.ground = Some(pin.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServoConfig {
    pub pins: PinSet,
    pub duty_cycle: DutyCycleRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub pins: PinSet,
}

/// `[queue]` 段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub strict: bool,
    pub max_idle_ms: u64,
    pub min_busy_ms: u64,
}

impl Default for QueueSection {
    fn default() -> Self {
        let defaults = QueueConfig::default();
        Self {
            strict: defaults.strict,
            max_idle_ms: defaults.max_idle_ms,
            min_busy_ms: defaults.min_busy_ms,
        }
    }
}

impl From<QueueSection> for QueueConfig {
    fn from(section: QueueSection) -> Self {
        QueueConfig {
            strict: section.strict,
            max_idle_ms: section.max_idle_ms,
            min_busy_ms: section.min_busy_ms,
        }
    }
}

/// `[servo]` 段
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoSection {
    /// 周期写入频率
    pub write_frequency_hz: u32,
    /// 下发给引脚的 PWM 频率
    pub pwm_frequency_hz: u32,
    pub policy: WritePolicy,
    /// 启动时下发的初始位置
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_position: Option<f64>,
}

impl Default for ServoSection {
    fn default() -> Self {
        Self {
            write_frequency_hz: 10,
            pwm_frequency_hz: 60,
            policy: WritePolicy::Coalesce,
            initial_position: None,
        }
    }
}

/// 完整硬件配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub queue: QueueSection,
    pub servo: ServoSection,
    pub servos: Vec<ServoConfig>,
    pub temperature_sensors: Vec<SensorConfig>,
    /// sysfs 后端的引脚绑定
    pub pins: BTreeMap<PinId, PinBinding>,
}

impl Default for HardwareConfig {
    /// BeagleBone 上的默认接线：P9_14 一个舵机，P9_40 一个温度传感器
    fn default() -> Self {
        let mut pins = BTreeMap::new();
        pins.insert(PinId::from("P9_14"), PinBinding::Pwm { chip: 4, channel: 0 });
        pins.insert(PinId::from("P9_40"), PinBinding::Adc { device: 0, channel: 1 });

        Self {
            queue: QueueSection::default(),
            servo: ServoSection::default(),
            servos: vec![ServoConfig {
                pins: PinSet::new("P9_14").with_power("P9_5").with_ground("P9_1"),
                duty_cycle: DutyCycleRange {
                    min: 0.044,
                    max: 0.135,
                },
            }],
            temperature_sensors: vec![SensorConfig {
                pins: PinSet::new("P9_40").with_power("P9_6").with_ground("P9_34"),
            }],
            pins,
        }
    }
}

impl HardwareConfig {
    /// 解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ControlError> {
        let config: HardwareConfig =
            toml::from_str(content).map_err(|e| ControlError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ControlError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ControlError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ControlError> {
        toml::to_string_pretty(self).map_err(|e| ControlError::InvalidConfig(e.to_string()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ControlError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        fs::write(path, content).map_err(|e| {
            ControlError::InvalidConfig(format!("failed to write {}: {}", path.display(), e))
        })
    }

    pub fn validate(&self) -> Result<(), ControlError> {
        if self.servos.is_empty() {
            return Err(ControlError::InvalidConfig(
                "at least one servo must be configured".to_string(),
            ));
        }
        if self.servo.write_frequency_hz == 0 {
            return Err(ControlError::InvalidConfig(
                "servo.write_frequency_hz must be greater than 0".to_string(),
            ));
        }
        if self.servo.pwm_frequency_hz == 0 {
            return Err(ControlError::InvalidConfig(
                "servo.pwm_frequency_hz must be greater than 0".to_string(),
            ));
        }
        if let Some(position) = self.servo.initial_position
            && !position.is_finite()
        {
            return Err(ControlError::InvalidConfig(format!(
                "servo.initial_position must be finite, got {position}"
            )));
        }

        for (id, servo) in self.servos.iter().enumerate() {
            if servo.pins.signal.is_empty() {
                return Err(ControlError::InvalidConfig(format!(
                    "servos[{id}].pins.signal must not be empty"
                )));
            }
            servo.duty_cycle.validate().map_err(|e| match e {
                ControlError::InvalidConfig(msg) => {
                    ControlError::InvalidConfig(format!("servos[{id}]: {msg}"))
                },
                other => other,
            })?;
        }

        for (id, sensor) in self.temperature_sensors.iter().enumerate() {
            if sensor.pins.signal.is_empty() {
                return Err(ControlError::InvalidConfig(format!(
                    "temperature_sensors[{id}].pins.signal must not be empty"
                )));
            }
        }

        Ok(())
    }

    pub fn queue_config(&self) -> QueueConfig {
        self.queue.into()
    }

    /// sysfs 后端需要的绑定表
    pub fn pin_bindings(&self) -> HashMap<PinId, PinBinding> {
        self.pins.iter().map(|(pin, binding)| (pin.clone(), *binding)).collect()
    }
}
