//! Builder 模式实现
//!
//! 提供链式构造 `CommandQueue` 实例的便捷方式。

use crate::error::DriverError;
use crate::mode::QueueMode;
use crate::pipeline::QueueConfig;
use crate::queue::CommandQueue;
use bbplay_pins::PinDriver;
use std::sync::Arc;

/// 命令队列 Builder
///
/// # Example
///
/// ```
/// use bbplay_driver::{CommandQueueBuilder, QueueMode};
/// use bbplay_pins::MockPinDriver;
/// use std::sync::Arc;
///
/// let queue = CommandQueueBuilder::new()
///     .mode(QueueMode::Pipelined)
///     .max_idle_ms(50)
///     .build(Arc::new(MockPinDriver::new()))
///     .unwrap();
/// assert_eq!(queue.mode(), QueueMode::Pipelined);
/// ```
#[derive(Debug, Default)]
pub struct CommandQueueBuilder {
    config: QueueConfig,
    thread_name: Option<String>,
}

impl CommandQueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体替换队列配置
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    pub fn mode(self, mode: QueueMode) -> Self {
        self.strict(mode.is_strict())
    }

    pub fn max_idle_ms(mut self, ms: u64) -> Self {
        self.config.max_idle_ms = ms;
        self
    }

    pub fn min_busy_ms(mut self, ms: u64) -> Self {
        self.config.min_busy_ms = ms;
        self
    }

    /// 调度线程名称（默认 `bbplay-queue`）
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    pub fn build(self, driver: Arc<dyn PinDriver>) -> Result<CommandQueue, DriverError> {
        let name = self.thread_name.unwrap_or_else(|| "bbplay-queue".to_string());
        CommandQueue::spawn(driver, self.config, name)
    }
}
