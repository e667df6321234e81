//! 内存 Mock 后端
//!
//! 记录每一次调用（开始/结束时间），支持按引脚注入故障、人为写入延迟，
//! 并统计同一引脚上的并发写入数，用于验证调度器不会重叠写同一个引脚。

use crate::{PinDeviceError, PinDeviceErrorKind, PinDriver, PinError, PinId, PinMode};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::thread;
use std::time::{Duration, Instant};

/// 调用类型
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PinCall {
    SetMode(PinMode),
    WriteAnalog { duty_cycle: f64, frequency_hz: u32 },
    ReadAnalog,
}

/// 一次已完成的调用
#[derive(Debug, Clone)]
pub struct PinEvent {
    /// 开始顺序（从 0 递增）
    pub seq: u64,
    pub pin: PinId,
    pub call: PinCall,
    pub started_at: Instant,
    pub finished_at: Instant,
    pub ok: bool,
}

#[derive(Default)]
struct MockState {
    next_seq: u64,
    events: Vec<PinEvent>,
    modes: HashMap<PinId, PinMode>,
    inputs: HashMap<PinId, f64>,
    failing: HashSet<PinId>,
    failing_writes: HashSet<PinId>,
    latencies: HashMap<PinId, Duration>,
    default_latency: Duration,
    writes_in_flight: HashMap<PinId, usize>,
    max_writes_in_flight: HashMap<PinId, usize>,
    calls_in_flight: usize,
    max_calls_in_flight: usize,
}

/// Mock 引脚驱动
///
/// 所有状态放在一把锁里，但锁不会跨越人为延迟持有，
/// 因此流水线模式下的并发调用能真实地重叠。
#[derive(Default)]
pub struct MockPinDriver {
    state: Mutex<MockState>,
}

struct CallTicket {
    seq: u64,
    started_at: Instant,
    latency: Duration,
}

impl MockPinDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有写入操作的默认延迟
    pub fn with_write_latency(self, latency: Duration) -> Self {
        self.state.lock().default_latency = latency;
        self
    }

    pub fn set_write_latency(&self, latency: Duration) {
        self.state.lock().default_latency = latency;
    }

    /// 单个引脚的写入延迟（覆盖默认值）
    pub fn set_pin_latency(&self, pin: impl Into<PinId>, latency: Duration) {
        self.state.lock().latencies.insert(pin.into(), latency);
    }

    /// 设置模拟输入值（归一化 [0, 1]）
    pub fn set_analog_input(&self, pin: impl Into<PinId>, value: f64) {
        self.state.lock().inputs.insert(pin.into(), value);
    }

    /// 之后对该引脚的所有操作都会失败
    pub fn fail_pin(&self, pin: impl Into<PinId>) {
        self.state.lock().failing.insert(pin.into());
    }

    /// 只让写入失败，设置模式和读取照常
    pub fn fail_writes(&self, pin: impl Into<PinId>) {
        self.state.lock().failing_writes.insert(pin.into());
    }

    pub fn heal_pin(&self, pin: &PinId) {
        let mut state = self.state.lock();
        state.failing.remove(pin);
        state.failing_writes.remove(pin);
    }

    /// 已完成调用（按完成顺序）
    pub fn events(&self) -> Vec<PinEvent> {
        self.state.lock().events.clone()
    }

    /// 某引脚上成功写入的 `(duty_cycle, frequency_hz)`，按完成顺序
    pub fn writes(&self, pin: &PinId) -> Vec<(f64, u32)> {
        self.state
            .lock()
            .events
            .iter()
            .filter(|e| e.ok && &e.pin == pin)
            .filter_map(|e| match e.call {
                PinCall::WriteAnalog {
                    duty_cycle,
                    frequency_hz,
                } => Some((duty_cycle, frequency_hz)),
                _ => None,
            })
            .collect()
    }

    pub fn last_write(&self, pin: &PinId) -> Option<(f64, u32)> {
        self.writes(pin).last().copied()
    }

    pub fn mode(&self, pin: &PinId) -> Option<PinMode> {
        self.state.lock().modes.get(pin).copied()
    }

    /// 同一引脚上曾经同时进行的最大写入数
    pub fn max_concurrent_writes(&self, pin: &PinId) -> usize {
        self.state.lock().max_writes_in_flight.get(pin).copied().unwrap_or(0)
    }

    /// 全部引脚上曾经同时进行的最大调用数
    pub fn max_concurrent_calls(&self) -> usize {
        self.state.lock().max_calls_in_flight
    }

    fn begin(&self, pin: &PinId, is_write: bool) -> CallTicket {
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;

        state.calls_in_flight += 1;
        state.max_calls_in_flight = state.max_calls_in_flight.max(state.calls_in_flight);

        if is_write {
            let in_flight = state.writes_in_flight.entry(pin.clone()).or_insert(0);
            *in_flight += 1;
            let current = *in_flight;
            let max = state.max_writes_in_flight.entry(pin.clone()).or_insert(0);
            *max = (*max).max(current);
        }

        let latency = if is_write {
            state.latencies.get(pin).copied().unwrap_or(state.default_latency)
        } else {
            Duration::ZERO
        };

        CallTicket {
            seq,
            started_at: Instant::now(),
            latency,
        }
    }

    fn finish(&self, ticket: CallTicket, pin: &PinId, call: PinCall, ok: bool) {
        let mut state = self.state.lock();
        state.calls_in_flight = state.calls_in_flight.saturating_sub(1);
        if matches!(call, PinCall::WriteAnalog { .. })
            && let Some(in_flight) = state.writes_in_flight.get_mut(pin)
        {
            *in_flight = in_flight.saturating_sub(1);
        }
        state.events.push(PinEvent {
            seq: ticket.seq,
            pin: pin.clone(),
            call,
            started_at: ticket.started_at,
            finished_at: Instant::now(),
            ok,
        });
    }

    fn injected_fault(&self, pin: &PinId, is_write: bool) -> Option<PinError> {
        let state = self.state.lock();
        let failing =
            state.failing.contains(pin) || (is_write && state.failing_writes.contains(pin));
        failing.then(|| {
            PinError::Device(PinDeviceError::new(
                PinDeviceErrorKind::Backend,
                format!("injected fault on {pin}"),
            ))
        })
    }
}

impl PinDriver for MockPinDriver {
    fn set_mode(&self, pin: &PinId, mode: PinMode) -> Result<(), PinError> {
        let ticket = self.begin(pin, false);
        let result = match self.injected_fault(pin, false) {
            Some(err) => Err(err),
            None => {
                self.state.lock().modes.insert(pin.clone(), mode);
                Ok(())
            },
        };
        self.finish(ticket, pin, PinCall::SetMode(mode), result.is_ok());
        result
    }

    fn write_analog(
        &self,
        pin: &PinId,
        duty_cycle: f64,
        frequency_hz: u32,
    ) -> Result<(), PinError> {
        let call = PinCall::WriteAnalog {
            duty_cycle,
            frequency_hz,
        };
        let ticket = self.begin(pin, true);
        if !ticket.latency.is_zero() {
            thread::sleep(ticket.latency);
        }
        let result = match self.injected_fault(pin, true) {
            Some(err) => Err(err),
            None => crate::check_duty_cycle(pin, duty_cycle),
        };
        self.finish(ticket, pin, call, result.is_ok());
        result
    }

    fn read_analog(&self, pin: &PinId) -> Result<f64, PinError> {
        let ticket = self.begin(pin, false);
        let result = match self.injected_fault(pin, false) {
            Some(err) => Err(err),
            None => Ok(self.state.lock().inputs.get(pin).copied().unwrap_or(0.0)),
        };
        self.finish(ticket, pin, PinCall::ReadAnalog, result.is_ok());
        result
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
