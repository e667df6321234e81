//! 命令队列（对外 API）

use crate::command::{Command, CommandHandle, CommandId};
use crate::error::DriverError;
use crate::metrics::{MetricsSnapshot, QueueMetrics};
use crate::mode::{AtomicQueueMode, QueueMode};
use crate::pipeline::{QueueConfig, scheduler_loop};
use bbplay_pins::{PinDriver, PinId, PinMode};
use crossbeam_channel::{Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 带超时的 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        let (tx, rx) = crossbeam_channel::bounded(1);

        // 看门狗线程负责真正的 join
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(Box::new(
                std::io::Error::new(std::io::ErrorKind::TimedOut, "Thread join timeout"),
            )),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => Err(Box::new(
                std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "Thread panicked during join",
                ),
            )),
        }
    }
}

/// 硬件命令队列
///
/// 持有一个调度线程，所有经由本队列的引脚操作都按提交顺序开始执行。
/// 丢弃时停止调度线程；尚未开始的命令的句柄收到 [`DriverError::ChannelClosed`]。
pub struct CommandQueue {
    /// 命令发送端，Drop 时必须在 join 之前关闭
    cmd_tx: Option<Sender<Command>>,
    driver: Arc<dyn PinDriver>,
    mode: Arc<AtomicQueueMode>,
    config: QueueConfig,
    next_id: AtomicU64,
    loop_thread: Option<JoinHandle<()>>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<QueueMetrics>,
}

impl CommandQueue {
    /// 创建队列并启动调度线程
    pub fn new(driver: Arc<dyn PinDriver>, config: QueueConfig) -> Result<Self, DriverError> {
        Self::spawn(driver, config, "bbplay-queue".to_string())
    }

    pub(crate) fn spawn(
        driver: Arc<dyn PinDriver>,
        config: QueueConfig,
        thread_name: String,
    ) -> Result<Self, DriverError> {
        let (cmd_tx, cmd_rx) = unbounded::<Command>();
        let mode = Arc::new(AtomicQueueMode::new(config.mode()));
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(QueueMetrics::new());

        let loop_mode = mode.clone();
        let loop_running = is_running.clone();
        let loop_metrics = metrics.clone();
        let loop_thread = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || scheduler_loop(cmd_rx, loop_mode, config, loop_running, loop_metrics))
            .map_err(|e| DriverError::QueueThread(e.to_string()))?;

        info!(
            "Command queue started ({} mode, backend: {}, idle {}ms, busy {}ms)",
            config.mode(),
            driver.backend_name(),
            config.max_idle_ms,
            config.min_busy_ms
        );

        Ok(Self {
            cmd_tx: Some(cmd_tx),
            driver,
            mode,
            config,
            next_id: AtomicU64::new(0),
            loop_thread: Some(loop_thread),
            is_running,
            metrics,
        })
    }

    /// 提交一个操作
    ///
    /// 提交永远不会被拒绝；结果（成功、失败或 panic）通过返回的句柄交付。
    /// 如果调度线程已经退出，句柄立即收到 [`DriverError::ChannelClosed`]。
    pub fn submit<T, F>(&self, op: F) -> CommandHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, DriverError> + Send + 'static,
    {
        let id: CommandId = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (command, handle) = Command::new(id, op);
        self.metrics.record_submit();

        match &self.cmd_tx {
            Some(tx) => {
                if tx.send(command).is_err() {
                    // 命令随 SendError 一起丢弃，句柄收到 ChannelClosed
                    warn!("Command {} dropped: queue thread has exited", id);
                } else {
                    trace!("Command {} submitted", id);
                }
            },
            None => warn!("Command {} dropped: queue is shutting down", id),
        }
        handle
    }

    /// 针对单个引脚的操作入口
    ///
    /// # Example
    ///
    /// ```
    /// use bbplay_driver::{CommandQueue, QueueConfig};
    /// use bbplay_pins::{MockPinDriver, PinMode};
    /// use std::sync::Arc;
    ///
    /// let queue = CommandQueue::new(Arc::new(MockPinDriver::new()), QueueConfig::default()).unwrap();
    /// queue.pin("P9_14").set_mode(PinMode::Output).wait().unwrap();
    /// queue.pin("P9_14").write_analog(0.09, 60).wait().unwrap();
    /// ```
    pub fn pin(&self, pin: impl Into<PinId>) -> PinCommands<'_> {
        PinCommands {
            queue: self,
            pin: pin.into(),
        }
    }

    pub fn driver(&self) -> Arc<dyn PinDriver> {
        self.driver.clone()
    }

    pub fn mode(&self) -> QueueMode {
        self.mode.get(Ordering::Relaxed)
    }

    /// 运行时切换执行模式，从下一个 tick 开始生效
    pub fn set_mode(&self, mode: QueueMode) {
        let previous = self.mode.get(Ordering::Relaxed);
        self.mode.set(mode, Ordering::Relaxed);
        if previous != mode {
            info!("Queue mode changed: {} -> {}", previous, mode);
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// 尚未被调度线程取出的命令数
    pub fn backlog(&self) -> usize {
        self.cmd_tx.as_ref().map_or(0, |tx| tx.len())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// 调度线程是否仍在运行
    pub fn is_healthy(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
            && self.loop_thread.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        // Release：调度线程看到 false 时也能看到之前的写入
        self.is_running.store(false, Ordering::Release);

        // 先关闭通道，再 join
        self.cmd_tx.take();

        let join_timeout = Duration::from_secs(2);
        if let Some(handle) = self.loop_thread.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "Queue thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }

        debug!("Command queue dropped");
    }
}

/// 单引脚操作
///
/// 每个方法都提交一个命令并返回它的句柄。
pub struct PinCommands<'a> {
    queue: &'a CommandQueue,
    pin: PinId,
}

impl PinCommands<'_> {
    pub fn id(&self) -> &PinId {
        &self.pin
    }

    pub fn set_mode(&self, mode: PinMode) -> CommandHandle<()> {
        let driver = self.queue.driver();
        let pin = self.pin.clone();
        self.queue
            .submit(move || driver.set_mode(&pin, mode).map_err(DriverError::from))
    }

    /// 写入占空比（[0, 1]）和 PWM 频率
    ///
    /// 频率为 0 时不调用驱动，句柄收到 [`DriverError::InvalidInput`]。
    pub fn write_analog(&self, duty_cycle: f64, frequency_hz: u32) -> CommandHandle<()> {
        let driver = self.queue.driver();
        let pin = self.pin.clone();
        self.queue.submit(move || {
            if frequency_hz == 0 {
                return Err(DriverError::InvalidInput(format!(
                    "PWM frequency for {pin} must be greater than 0"
                )));
            }
            driver
                .write_analog(&pin, duty_cycle, frequency_hz)
                .map_err(DriverError::from)
        })
    }

    /// 读取归一化模拟输入（[0, 1]）
    pub fn read_analog(&self) -> CommandHandle<f64> {
        let driver = self.queue.driver();
        let pin = self.pin.clone();
        self.queue
            .submit(move || driver.read_analog(&pin).map_err(DriverError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbplay_pins::{MockPinDriver, PinError};
    use std::time::Instant;

    fn fast_config(strict: bool) -> QueueConfig {
        QueueConfig {
            strict,
            max_idle_ms: 10,
            min_busy_ms: 1,
        }
    }

    #[test]
    fn test_pin_commands_roundtrip() {
        let mock = Arc::new(MockPinDriver::new());
        mock.set_analog_input("P9_40", 0.5);
        let queue = CommandQueue::new(mock.clone(), fast_config(true)).unwrap();

        queue.pin("P9_14").set_mode(PinMode::Output).wait().unwrap();
        queue.pin("P9_14").write_analog(0.09, 60).wait().unwrap();
        let value = queue.pin("P9_40").read_analog().wait().unwrap();

        let pin = PinId::from("P9_14");
        assert_eq!(mock.mode(&pin), Some(PinMode::Output));
        assert_eq!(mock.last_write(&pin), Some((0.09, 60)));
        assert_eq!(value, 0.5);
    }

    #[test]
    fn test_invalid_duty_is_reported_through_handle() {
        let mock = Arc::new(MockPinDriver::new());
        let queue = CommandQueue::new(mock, fast_config(true)).unwrap();

        let result = queue.pin("P9_14").write_analog(1.2, 60).wait();
        assert!(matches!(
            result,
            Err(DriverError::Pin(PinError::InvalidValue { .. }))
        ));
        // 队列继续工作
        assert!(queue.pin("P9_14").write_analog(0.1, 60).wait().is_ok());
    }

    #[test]
    fn test_zero_frequency_is_rejected_without_driver_call() {
        let mock = Arc::new(MockPinDriver::new());
        let queue = CommandQueue::new(mock.clone(), fast_config(true)).unwrap();

        let result = queue.pin("P9_14").write_analog(0.5, 0).wait();
        match result {
            Err(DriverError::InvalidInput(msg)) => assert!(msg.contains("P9_14")),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
        assert!(mock.events().is_empty());
    }

    #[test]
    fn test_command_ids_are_sequential() {
        let queue = CommandQueue::new(Arc::new(MockPinDriver::new()), fast_config(true)).unwrap();
        let a = queue.submit(|| Ok::<_, DriverError>(()));
        let b = queue.submit(|| Ok::<_, DriverError>(()));
        assert_eq!(b.id(), a.id() + 1);
        a.wait().unwrap();
        b.wait().unwrap();
        assert_eq!(queue.metrics().submitted, 2);
    }

    #[test]
    fn test_set_mode_at_runtime() {
        let queue = CommandQueue::new(Arc::new(MockPinDriver::new()), fast_config(true)).unwrap();
        assert_eq!(queue.mode(), QueueMode::Strict);

        queue.set_mode(QueueMode::Pipelined);
        assert_eq!(queue.mode(), QueueMode::Pipelined);
        assert!(queue.submit(|| Ok::<_, DriverError>(1)).wait().is_ok());
    }

    #[test]
    fn test_backlog_drains() {
        let queue = CommandQueue::new(Arc::new(MockPinDriver::new()), fast_config(true)).unwrap();
        let handles: Vec<_> = (0..20)
            .map(|_| {
                queue.submit(|| {
                    std::thread::sleep(Duration::from_millis(2));
                    Ok::<_, DriverError>(())
                })
            })
            .collect();
        assert!(queue.backlog() > 0);

        for h in handles {
            h.wait().unwrap();
        }
        assert_eq!(queue.backlog(), 0);
        assert!(queue.is_healthy());
    }

    #[test]
    fn test_drop_closes_pending_handles() {
        let queue = CommandQueue::new(Arc::new(MockPinDriver::new()), fast_config(true)).unwrap();
        let slow = queue.submit(|| {
            std::thread::sleep(Duration::from_millis(100));
            Ok::<_, DriverError>(())
        });
        let pending: Vec<_> = (0..5)
            .map(|_| queue.submit(|| Ok::<_, DriverError>(())))
            .collect();

        // 等第一个命令开始执行
        let start = Instant::now();
        while queue.metrics().started == 0 && start.elapsed() < Duration::from_secs(1) {
            std::thread::sleep(Duration::from_millis(1));
        }
        drop(queue);

        assert!(slow.wait().is_ok());
        for h in pending {
            assert!(matches!(h.wait(), Err(DriverError::ChannelClosed)));
        }
    }
}
