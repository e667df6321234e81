//! 驱动层模块
//!
//! 本模块提供硬件引脚操作的命令队列，包括：
//! - 有序执行（FIFO，提交顺序即开始顺序）
//! - 两种执行模式：严格串行 / 流水线
//! - 自适应轮询（空闲时降频，繁忙时快速排空）
//! - 结果句柄（每个命令的成功/失败都能被调用方观察到）
//!
//! # 使用场景
//!
//! 上层的舵机控制器通过 [`CommandQueue::submit`] 提交写操作；
//! 需要直接操作引脚时使用 [`CommandQueue::pin`]。

mod builder;
pub mod command;
mod error;
pub mod metrics;
pub mod mode;
pub mod pipeline;
mod queue;

pub use builder::CommandQueueBuilder;
pub use command::{Command, CommandHandle, CommandId};
pub use error::DriverError;
pub use metrics::{MetricsSnapshot, QueueMetrics};
pub use mode::{AtomicQueueMode, QueueMode};
pub use pipeline::{QueueConfig, TickPacer, scheduler_loop};
pub use queue::{CommandQueue, PinCommands};
