//! 调度循环
//!
//! 每个 tick 最多从队列头部取出一个命令。
//! 严格模式下在当前线程执行并等待完成；流水线模式下在独立线程执行，
//! 调度线程等到操作开始后进入下一个 tick，不等待完成。
//! tick 间隔由 [`TickPacer`] 决定：本 tick 开始时队列为空则休眠 `max_idle_ms`，否则 `min_busy_ms`。

use crate::command::Command;
use crate::metrics::QueueMetrics;
use crate::mode::{AtomicQueueMode, QueueMode};
use crossbeam_channel::{Receiver, TryRecvError, bounded};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// 队列配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// 严格串行（true）或流水线（false）
    pub strict: bool,
    /// 队列为空时的轮询间隔（毫秒）
    pub max_idle_ms: u64,
    /// 排空积压时的轮询间隔（毫秒）
    pub min_busy_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            strict: true,
            max_idle_ms: 150,
            min_busy_ms: 1,
        }
    }
}

impl QueueConfig {
    pub fn mode(&self) -> QueueMode {
        QueueMode::from_strict(self.strict)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.max_idle_ms)
    }

    pub fn busy_interval(&self) -> Duration {
        Duration::from_millis(self.min_busy_ms)
    }
}

/// 自适应轮询节拍
///
/// # Example
///
/// ```
/// use bbplay_driver::{QueueConfig, TickPacer};
/// use std::time::Duration;
///
/// let mut pacer = TickPacer::new(&QueueConfig::default());
/// assert_eq!(pacer.next_delay(true), Duration::from_millis(150));
/// assert_eq!(pacer.next_delay(false), Duration::from_millis(1));
/// ```
#[derive(Debug, Clone)]
pub struct TickPacer {
    idle: Duration,
    busy: Duration,
    idle_streak: u64,
}

impl TickPacer {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            idle: config.idle_interval(),
            busy: config.busy_interval(),
            idle_streak: 0,
        }
    }

    /// 根据本 tick 开始时队列是否为空，返回到下一个 tick 的间隔
    pub fn next_delay(&mut self, was_empty: bool) -> Duration {
        if was_empty {
            self.idle_streak = self.idle_streak.saturating_add(1);
            self.idle
        } else {
            self.idle_streak = 0;
            self.busy
        }
    }

    /// 连续空闲 tick 数
    pub fn idle_streak(&self) -> u64 {
        self.idle_streak
    }
}

/// 调度线程主循环
///
/// 退出条件：
/// - `is_running` 被置为 false
/// - 命令通道断开（所有 Sender 已丢弃）
///
/// 退出时通道中尚未取出的命令随接收端一起丢弃，对应句柄收到 `ChannelClosed`。
pub fn scheduler_loop(
    cmd_rx: Receiver<Command>,
    mode: Arc<AtomicQueueMode>,
    config: QueueConfig,
    is_running: Arc<AtomicBool>,
    metrics: Arc<QueueMetrics>,
) {
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;
        use tracing::info;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("Queue thread priority set to MAX (realtime)");
            },
            Err(e) => {
                warn!(
                    "Failed to set queue thread priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                );
            },
        }
    }

    let mut pacer = TickPacer::new(&config);

    loop {
        // Acquire: 看到 false 时也能看到 Drop 之前的所有写入
        if !is_running.load(Ordering::Acquire) {
            trace!("Queue thread: is_running flag is false, exiting");
            break;
        }

        let was_empty = match cmd_rx.try_recv() {
            Ok(cmd) => {
                dispatch(cmd, mode.get(Ordering::Relaxed), &metrics);
                false
            },
            Err(TryRecvError::Empty) => true,
            Err(TryRecvError::Disconnected) => {
                trace!("Queue thread: command channel disconnected, exiting");
                break;
            },
        };

        metrics.record_tick(was_empty);
        spin_sleep::sleep(pacer.next_delay(was_empty));
    }

    let dropped = cmd_rx.len();
    if dropped > 0 {
        debug!("Queue thread exited with {} command(s) still pending", dropped);
    }
}

fn dispatch(cmd: Command, mode: QueueMode, metrics: &Arc<QueueMetrics>) {
    trace!(
        "Dispatching command {} ({} mode, queued for {:?})",
        cmd.id(),
        mode,
        cmd.queued_for()
    );

    match mode {
        QueueMode::Strict => run_inline(cmd, metrics),
        QueueMode::Pipelined => spawn_operation(cmd, metrics),
    }
}

fn run_inline(cmd: Command, metrics: &QueueMetrics) {
    let id = cmd.id();
    metrics.record_start();
    let ok = cmd.execute();
    metrics.record_finish(ok);
    if !ok {
        debug!("Command {} completed with an error", id);
    }
}

/// 在独立线程启动命令，返回时操作已经开始
///
/// 开始顺序因此等于出队顺序，与线程调度无关。
fn spawn_operation(cmd: Command, metrics: &Arc<QueueMetrics>) {
    let id = cmd.id();
    // 线程创建失败时需要把命令取回来在当前线程执行
    let slot = Arc::new(Mutex::new(Some(cmd)));
    let worker_slot = slot.clone();
    let worker_metrics = metrics.clone();
    let (started_tx, started_rx) = bounded::<()>(1);

    metrics.record_start();
    let spawned = thread::Builder::new()
        .name(format!("bbplay-op-{id}"))
        .spawn(move || {
            let cmd = worker_slot.lock().ok().and_then(|mut slot| slot.take());
            if let Some(cmd) = cmd {
                let ok = cmd.execute_with(|| {
                    let _ = started_tx.try_send(());
                });
                worker_metrics.record_finish(ok);
                if !ok {
                    debug!("Command {} completed with an error", id);
                }
            }
        });

    match spawned {
        Ok(_) => {
            // 工作线程没有取到命令时发送端随线程丢弃，recv 同样返回
            let _ = started_rx.recv();
        },
        Err(e) => {
            warn!(
                "Failed to spawn worker for command {}: {}, running inline",
                id, e
            );
            match slot.lock().ok().and_then(|mut slot| slot.take()) {
                Some(cmd) => {
                    let ok = cmd.execute();
                    metrics.record_finish(ok);
                },
                None => {
                    error!("Command {} lost after failed spawn", id);
                    metrics.record_finish(false);
                },
            }
        },
    }
}
