//! 命令定义和实现

pub mod config;
pub mod hold;
pub mod servo;
pub mod temperature;

pub use config::ConfigCommand;
pub use hold::HoldCommand;
pub use servo::ServoCommand;
pub use temperature::TemperatureCommand;
