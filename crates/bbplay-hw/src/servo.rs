//! 舵机位置控制
//!
//! 每个舵机有三份状态：
//! - `pending`：尚未下发的目标位置（至多一个，新值覆盖旧值）
//! - `busy`：是否有写入正在执行（同一舵机同一时刻至多一个写入）
//! - `committed`：最近一次成功写入的位置
//! - `last_write`：最近一次结束的写入（成功或失败），按提交序号区分
//!
//! 周期写入线程以固定频率调用 [`ServoController::run_cycle`]，与请求到达频率无关。

use crate::config::{HardwareConfig, PinSet, ServoConfig, WritePolicy};
use crate::duty::{DutyCycleRange, clamp_position};
use crate::error::ControlError;
use arc_swap::ArcSwapOption;
use bbplay_driver::{CommandHandle, CommandQueue, DriverError};
use bbplay_pins::PinMode;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Sender, bounded, select, tick};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// 设备描述（舵机和传感器共用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: usize,
    pub pins: PinSet,
}

/// 舵机读数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServoReading {
    /// 本次读取的时间（不是写入时间）
    pub timestamp: DateTime<Utc>,
    /// 最近一次成功写入的位置，尚未写入时为 `None`
    pub position: Option<f64>,
    /// 该次写入开始的时间
    pub written_at: Option<DateTime<Utc>>,
}

impl ServoReading {
    pub fn timestamp_rfc3339(&self) -> String {
        crate::format_timestamp(&self.timestamp)
    }
}

/// 一次周期写入
#[derive(Debug)]
pub struct CycleWrite {
    pub id: usize,
    pub position: f64,
    pub duty_cycle: f64,
    pub handle: CommandHandle<()>,
}

/// 一次已结束的写入
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// 该舵机上的提交序号，从 1 开始
    pub seq: u64,
    pub position: f64,
    pub started_at: DateTime<Utc>,
    /// 失败原因；成功时为 `None`
    pub error: Option<String>,
}

impl WriteOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug)]
struct Committed {
    position: f64,
    started_at: DateTime<Utc>,
}

struct ServoSlot {
    id: usize,
    pins: PinSet,
    range: DutyCycleRange,
    pending: Mutex<Option<f64>>,
    busy: AtomicBool,
    committed: ArcSwapOption<Committed>,
    issued: AtomicU64,
    last_write: ArcSwapOption<WriteOutcome>,
}

impl ServoSlot {
    fn new(id: usize, config: &ServoConfig) -> Self {
        Self {
            id,
            pins: config.pins.clone(),
            range: config.duty_cycle,
            pending: Mutex::new(None),
            busy: AtomicBool::new(false),
            committed: ArcSwapOption::empty(),
            issued: AtomicU64::new(0),
            last_write: ArcSwapOption::empty(),
        }
    }

    /// Idle -> Writing
    fn try_acquire(self: &Arc<Self>) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { slot: self.clone() })
    }
}

/// 持有期间舵机处于 Writing 状态
///
/// 随写入命令一起移动；命令成功、失败、panic 或者未执行就被丢弃，都会释放。
struct BusyGuard {
    slot: Arc<ServoSlot>,
}

impl BusyGuard {
    fn slot(&self) -> &ServoSlot {
        &self.slot
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}

/// 写入线程和控制器共享的部分
struct ServoBank {
    queue: Arc<CommandQueue>,
    slots: Vec<Arc<ServoSlot>>,
    pwm_frequency_hz: u32,
}

impl ServoBank {
    fn slot(&self, id: usize) -> Result<&Arc<ServoSlot>, ControlError> {
        self.slots
            .get(id)
            .ok_or_else(|| ControlError::servo_not_found(id))
    }

    /// 提交写入命令，调用方已经持有 busy
    fn submit_write(&self, guard: BusyGuard, position: f64) -> (f64, CommandHandle<()>) {
        let slot = guard.slot();
        let id = slot.id;
        let signal = slot.pins.signal.clone();
        let duty_cycle = slot.range.duty_for(position);
        let frequency_hz = self.pwm_frequency_hz;
        let driver = self.queue.driver();
        let seq = slot.issued.fetch_add(1, Ordering::AcqRel) + 1;

        debug!(
            "Servo {} -> position {:.4} (duty {:.4} @ {} Hz)",
            id, position, duty_cycle, frequency_hz
        );

        let handle = self.queue.submit(move || {
            let slot = guard.slot();
            let started_at = Utc::now();
            let result = driver.write_analog(&signal, duty_cycle, frequency_hz);
            if result.is_ok() {
                slot.committed.store(Some(Arc::new(Committed {
                    position,
                    started_at,
                })));
                trace!("Servo {} committed position {:.4}", slot.id, position);
            }
            slot.last_write.store(Some(Arc::new(WriteOutcome {
                seq,
                position,
                started_at,
                error: result.as_ref().err().map(|e| e.to_string()),
            })));
            result.map_err(|e| {
                warn!("Servo {} write failed: {}", slot.id, e);
                e.into()
            })
            // guard 在闭包结束时释放 busy，committed 已经先写入
        });
        (duty_cycle, handle)
    }

    fn run_cycle(&self) -> Vec<CycleWrite> {
        let mut writes = Vec::new();

        for slot in &self.slots {
            if slot.busy.load(Ordering::Acquire) {
                trace!("Servo {} busy, skipping cycle", slot.id);
                continue;
            }

            let Some(position) = slot.pending.lock().take() else {
                continue;
            };

            match slot.try_acquire() {
                Some(guard) => {
                    let (duty_cycle, handle) = self.submit_write(guard, position);
                    writes.push(CycleWrite {
                        id: slot.id,
                        position,
                        duty_cycle,
                        handle,
                    });
                },
                None => {
                    // 与 write() 竞争失败：放回去，除非已有更新的目标
                    let mut pending = slot.pending.lock();
                    if pending.is_none() {
                        *pending = Some(position);
                    }
                },
            }
        }

        writes
    }
}

/// 周期写入线程
struct CycleWriter {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CycleWriter {
    fn spawn(bank: Arc<ServoBank>, frequency_hz: u32) -> Result<Self, ControlError> {
        let period = Duration::from_secs_f64(1.0 / f64::from(frequency_hz.max(1)));
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let thread = thread::Builder::new()
            .name("bbplay-servo-writer".to_string())
            .spawn(move || {
                let ticker = tick(period);
                loop {
                    let stop = select! {
                        recv(ticker) -> _ => false,
                        recv(stop_rx) -> _ => true,
                    };
                    if stop {
                        break;
                    }

                    let writes = bank.run_cycle();
                    if !writes.is_empty() {
                        trace!("Servo cycle issued {} write(s)", writes.len());
                    }
                }
                trace!("Servo writer thread exiting");
            })
            .map_err(|e| {
                ControlError::HardwareFault(DriverError::QueueThread(format!(
                    "failed to spawn servo writer: {e}"
                )))
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl Drop for CycleWriter {
    fn drop(&mut self) {
        // 断开 stop 通道即唤醒 select
        self.stop_tx.take();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Servo writer thread panicked");
        }
    }
}

/// 舵机控制器
///
/// # Example
///
/// ```
/// use bbplay_driver::{CommandQueue, QueueConfig};
/// use bbplay_hw::{HardwareConfig, ServoController};
/// use bbplay_pins::MockPinDriver;
/// use std::sync::Arc;
///
/// let queue = Arc::new(CommandQueue::new(Arc::new(MockPinDriver::new()), QueueConfig::default()).unwrap());
/// let servos = ServoController::without_writer(queue, &HardwareConfig::default()).unwrap();
///
/// servos.queue_position(0, 0.2).unwrap();
/// servos.queue_position(0, 0.9).unwrap();
/// let writes = servos.run_cycle();
/// assert_eq!(writes.len(), 1);
/// writes.into_iter().next().unwrap().handle.wait().unwrap();
/// assert_eq!(servos.read(0).unwrap().position, Some(0.9));
/// ```
pub struct ServoController {
    bank: Arc<ServoBank>,
    policy: WritePolicy,
    write_frequency_hz: u32,
    writer: Option<CycleWriter>,
}

impl ServoController {
    /// 创建控制器并启动周期写入线程
    pub fn new(queue: Arc<CommandQueue>, config: &HardwareConfig) -> Result<Self, ControlError> {
        let mut controller = Self::without_writer(queue, config)?;
        controller.writer = Some(CycleWriter::spawn(
            controller.bank.clone(),
            controller.write_frequency_hz,
        )?);
        info!(
            "Servo controller started: {} servo(s), {} policy, cycle {} Hz",
            controller.len(),
            controller.policy,
            controller.write_frequency_hz
        );
        Ok(controller)
    }

    /// 不启动写入线程，由调用方驱动 [`run_cycle`](Self::run_cycle)
    pub fn without_writer(
        queue: Arc<CommandQueue>,
        config: &HardwareConfig,
    ) -> Result<Self, ControlError> {
        config.validate()?;

        let slots = config
            .servos
            .iter()
            .enumerate()
            .map(|(id, servo)| Arc::new(ServoSlot::new(id, servo)))
            .collect();

        Ok(Self {
            bank: Arc::new(ServoBank {
                queue,
                slots,
                pwm_frequency_hz: config.servo.pwm_frequency_hz,
            }),
            policy: config.servo.policy,
            write_frequency_hz: config.servo.write_frequency_hz,
            writer: None,
        })
    }

    pub fn len(&self) -> usize {
        self.bank.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bank.slots.is_empty()
    }

    pub fn exists(&self, id: usize) -> bool {
        id < self.len()
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    pub fn write_frequency_hz(&self) -> u32 {
        self.write_frequency_hz
    }

    pub fn has_writer(&self) -> bool {
        self.writer.is_some()
    }

    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.bank.queue
    }

    pub fn list(&self) -> Vec<DeviceInfo> {
        self.bank
            .slots
            .iter()
            .map(|slot| DeviceInfo {
                id: slot.id,
                pins: slot.pins.clone(),
            })
            .collect()
    }

    /// 设置待下发目标（覆盖尚未下发的旧目标），不做 I/O
    pub fn queue_position(&self, id: usize, position: f64) -> Result<(), ControlError> {
        let slot = self.bank.slot(id)?;
        let position = checked_position(position)?;
        let replaced = slot.pending.lock().replace(position);
        if let Some(old) = replaced {
            trace!("Servo {} pending target {:.4} superseded by {:.4}", id, old, position);
        }
        Ok(())
    }

    /// 立即提交写入；已有写入在执行时返回 [`ControlError::Busy`]
    pub fn write(&self, id: usize, position: f64) -> Result<CommandHandle<()>, ControlError> {
        let slot = self.bank.slot(id)?;
        let position = checked_position(position)?;
        let guard = slot.try_acquire().ok_or(ControlError::Busy { id })?;
        Ok(self.bank.submit_write(guard, position).1)
    }

    /// 按配置的策略设置位置
    ///
    /// - `Coalesce`：等同 [`queue_position`](Self::queue_position)，返回 `None`
    /// - `RejectWhenBusy`：等同 [`write`](Self::write)，返回写入句柄
    pub fn set_position(
        &self,
        id: usize,
        position: f64,
    ) -> Result<Option<CommandHandle<()>>, ControlError> {
        match self.policy {
            WritePolicy::Coalesce => self.queue_position(id, position).map(|_| None),
            WritePolicy::RejectWhenBusy => self.write(id, position).map(Some),
        }
    }

    /// 执行一次写入周期
    ///
    /// 对每个舵机：busy 则跳过；否则如果有待下发目标就取出并提交写入。
    pub fn run_cycle(&self) -> Vec<CycleWrite> {
        self.bank.run_cycle()
    }

    /// 所有舵机的信号引脚设为输出，并以 `position` 作为首个目标
    ///
    /// 返回设置模式命令的句柄。
    pub fn init(&self, position: f64) -> Result<Vec<CommandHandle<()>>, ControlError> {
        let position = checked_position(position)?;
        let mut handles = Vec::with_capacity(self.len());
        for slot in &self.bank.slots {
            handles.push(
                self.bank
                    .queue
                    .pin(slot.pins.signal.clone())
                    .set_mode(PinMode::Output),
            );
            self.queue_position(slot.id, position)?;
        }
        info!("Servos initialized to position {:.4}", position);
        Ok(handles)
    }

    pub fn read(&self, id: usize) -> Result<ServoReading, ControlError> {
        let slot = self.bank.slot(id)?;
        let committed = slot.committed.load_full();
        Ok(ServoReading {
            timestamp: Utc::now(),
            position: committed.as_ref().map(|c| c.position),
            written_at: committed.as_ref().map(|c| c.started_at),
        })
    }

    /// 尚未下发的目标
    pub fn pending(&self, id: usize) -> Result<Option<f64>, ControlError> {
        Ok(*self.bank.slot(id)?.pending.lock())
    }

    /// 已提交的写入数；下一次写入的序号大于它
    pub fn issued_writes(&self, id: usize) -> Result<u64, ControlError> {
        Ok(self.bank.slot(id)?.issued.load(Ordering::Acquire))
    }

    /// 最近一次结束的写入，失败的写入同样记录
    pub fn last_write(&self, id: usize) -> Result<Option<WriteOutcome>, ControlError> {
        Ok(self.bank.slot(id)?.last_write.load_full().map(|w| (*w).clone()))
    }

    pub fn is_busy(&self, id: usize) -> Result<bool, ControlError> {
        Ok(self.bank.slot(id)?.busy.load(Ordering::Acquire))
    }

    pub fn duty_cycle_range(&self, id: usize) -> Result<DutyCycleRange, ControlError> {
        Ok(self.bank.slot(id)?.range)
    }
}

fn checked_position(position: f64) -> Result<f64, ControlError> {
    if position.is_finite() {
        Ok(clamp_position(position))
    } else {
        Err(ControlError::InvalidPosition(position))
    }
}
