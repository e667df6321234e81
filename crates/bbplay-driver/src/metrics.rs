//! 队列运行指标
//!
//! 全部使用原子计数器，调度线程和操作线程直接更新，调用方通过快照读取。

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// 已提交命令数
    pub submitted: AtomicU64,
    /// 已开始执行的命令数
    pub started: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    /// 队列为空的 tick 数
    pub idle_ticks: AtomicU64,
    /// 取出命令的 tick 数
    pub busy_ticks: AtomicU64,
    /// 当前正在执行的命令数
    pub in_flight: AtomicU64,
    /// 历史最大同时执行数
    pub max_in_flight: AtomicU64,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_start(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(now, Ordering::Relaxed);
    }

    pub(crate) fn record_finish(&self, ok: bool) {
        if ok {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn record_tick(&self, was_empty: bool) {
        if was_empty {
            self.idle_ticks.fetch_add(1, Ordering::Relaxed);
        } else {
            self.busy_ticks.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            idle_ticks: self.idle_ticks.load(Ordering::Relaxed),
            busy_ticks: self.busy_ticks.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            max_in_flight: self.max_in_flight.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub idle_ticks: u64,
    pub busy_ticks: u64,
    pub in_flight: u64,
    pub max_in_flight: u64,
}

impl MetricsSnapshot {
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed
    }

    /// 失败率（百分比）
    pub fn failure_rate(&self) -> f64 {
        let completed = self.completed();
        if completed == 0 {
            0.0
        } else {
            self.failed as f64 / completed as f64 * 100.0
        }
    }
}
