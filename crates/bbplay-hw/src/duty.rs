//! 位置到占空比的映射

use crate::error::ControlError;
use serde::{Deserialize, Serialize};

/// 把位置限制到 [0, 1]
///
/// NaN 映射为 0。
pub fn clamp_position(position: f64) -> f64 {
    if position.is_nan() {
        0.0
    } else {
        position.clamp(0.0, 1.0)
    }
}

/// 舵机占空比范围
///
/// 位置 0 对应 `min`，位置 1 对应 `max`，中间线性插值。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DutyCycleRange {
    pub min: f64,
    pub max: f64,
}

impl DutyCycleRange {
    pub fn new(min: f64, max: f64) -> Result<Self, ControlError> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    /// 要求 `0 <= min < max <= 1`
    pub fn validate(&self) -> Result<(), ControlError> {
        let valid = self.min.is_finite()
            && self.max.is_finite()
            && self.min >= 0.0
            && self.max <= 1.0
            && self.min < self.max;
        if valid {
            Ok(())
        } else {
            Err(ControlError::InvalidConfig(format!(
                "duty cycle range must satisfy 0 <= min < max <= 1, got min={} max={}",
                self.min, self.max
            )))
        }
    }

    /// 位置（先限幅）对应的占空比
    pub fn duty_for(&self, position: f64) -> f64 {
        self.min + clamp_position(position) * (self.max - self.min)
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}
