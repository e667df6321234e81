//! 队列执行模式定义
//!
//! 定义命令队列的两种执行模式，用于控制调度线程是否等待命令完成。

use std::sync::atomic::{AtomicU8, Ordering};

/// 队列执行模式
///
/// # 模式说明
///
/// - **Strict**: 严格串行，调度线程等待当前命令完成后才开始下一个，
///   任意两个命令在时间上不会重叠
/// - **Pipelined**: 流水线，调度线程启动命令后立即进入下一个 tick，
///   多个命令可以同时执行，完成顺序不保证
///
/// 两种模式下开始顺序都与提交顺序一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum QueueMode {
    /// 严格串行（默认）
    #[default]
    Strict = 0,

    /// 流水线
    Pipelined = 1,
}

impl QueueMode {
    /// 从配置中的 `strict` 开关转换
    pub fn from_strict(strict: bool) -> Self {
        if strict { Self::Strict } else { Self::Pipelined }
    }

    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Strict 模式。
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Strict,
            1 => Self::Pipelined,
            _ => Self::Strict,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_strict(self) -> bool {
        self == Self::Strict
    }

    pub fn is_pipelined(self) -> bool {
        self == Self::Pipelined
    }
}

impl std::fmt::Display for QueueMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueMode::Strict => f.write_str("strict"),
            QueueMode::Pipelined => f.write_str("pipelined"),
        }
    }
}

impl std::str::FromStr for QueueMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "pipelined" => Ok(Self::Pipelined),
            other => Err(format!("unknown queue mode '{other}'")),
        }
    }
}

/// 队列执行模式（原子版本，用于线程间共享）
///
/// 调度线程每个 tick 读取一次，调用方通过 `set()` 在运行时切换。
///
/// # 示例
///
/// ```rust
/// use bbplay_driver::mode::{AtomicQueueMode, QueueMode};
/// use std::sync::atomic::Ordering;
///
/// let mode = AtomicQueueMode::new(QueueMode::Strict);
/// mode.set(QueueMode::Pipelined, Ordering::Relaxed);
/// assert!(mode.get(Ordering::Relaxed).is_pipelined());
/// ```
#[derive(Debug)]
pub struct AtomicQueueMode {
    inner: AtomicU8,
}

impl AtomicQueueMode {
    pub fn new(mode: QueueMode) -> Self {
        Self {
            inner: AtomicU8::new(mode.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> QueueMode {
        QueueMode::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, mode: QueueMode, ordering: Ordering) {
        self.inner.store(mode.as_u8(), ordering);
    }
}

impl Clone for AtomicQueueMode {
    fn clone(&self) -> Self {
        Self::new(self.get(Ordering::Relaxed))
    }
}
