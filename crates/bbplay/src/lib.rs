//! bbplay - 单板机硬件访问
//!
//! 分层结构，从底层到高层：
//!
//! - **引脚层** (`pins`): `PinDriver` 抽象，Mock 与 Linux sysfs 后端
//! - **驱动层** (`driver`): 命令队列，严格串行 / 流水线两种执行模式
//! - **控制层** (`hw`): 舵机位置控制、传感器读取、硬件配置
//!
//! # 快速开始
//!
//! ```rust
//! use bbplay::pins::MockPinDriver;
//! use bbplay::prelude::*;
//! use std::sync::Arc;
//!
//! let hw = Hardware::start_without_writer(HardwareConfig::default(), Arc::new(MockPinDriver::new()))?;
//! hw.servos().queue_position(0, 0.5)?;
//! for write in hw.servos().run_cycle() {
//!     write.handle.wait()?;
//! }
//! assert_eq!(hw.servos().read(0)?.position, Some(0.5));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use bbplay_driver as driver;
pub use bbplay_hw as hw;
pub use bbplay_pins as pins;

pub mod logging;
pub mod prelude;

pub use bbplay_driver::{CommandHandle, CommandQueue, DriverError, QueueConfig, QueueMode};
pub use bbplay_hw::{
    ControlError, Hardware, HardwareConfig, SensorReader, ServoController, WritePolicy,
};
pub use bbplay_pins::{PinDriver, PinError, PinId, PinMode};
