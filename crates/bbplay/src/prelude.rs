//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use bbplay::prelude::*;
//! ```

// 控制层（推荐使用）
pub use bbplay_hw::{
    ControlError, DutyCycleRange, Hardware, HardwareConfig, SensorReader, ServoController,
    ServoReading, Temperature, WritePolicy,
};

// 驱动层
pub use bbplay_driver::{CommandHandle, CommandQueue, CommandQueueBuilder, DriverError, QueueMode};

// 引脚层
pub use bbplay_pins::{PinDriver, PinError, PinId, PinMode};

#[cfg(any(test, feature = "mock"))]
pub use bbplay_pins::MockPinDriver;
