//! 命令类型定义模块
//!
//! 队列中的每个命令都是一个类型擦除的闭包，外加一个一次性的结果通道。
//! 调用方拿到 [`CommandHandle`]，可以阻塞等待、带超时等待或者轮询结果。

use crate::error::DriverError;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError, bounded};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

/// 命令编号（按提交顺序单调递增）
pub type CommandId = u64;

/// 参数是开始回调：在操作本体被调用之前触发
type Operation = Box<dyn FnOnce(&mut dyn FnMut()) -> bool + Send + 'static>;

/// 队列中的一个待执行命令
///
/// 执行时捕获 panic，结果（包括 panic）通过一次性通道送回句柄。
/// 如果命令在执行前被丢弃，句柄会收到 [`DriverError::ChannelClosed`]。
pub struct Command {
    id: CommandId,
    submitted_at: Instant,
    op: Operation,
}

impl Command {
    /// 包装一个操作，返回命令和对应的结果句柄
    pub fn new<T, F>(id: CommandId, op: F) -> (Self, CommandHandle<T>)
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, DriverError> + Send + 'static,
    {
        let (result_tx, result_rx) = bounded(1);

        let op: Operation = Box::new(move |on_start: &mut dyn FnMut()| {
            on_start();
            let result = match panic::catch_unwind(AssertUnwindSafe(op)) {
                Ok(result) => result,
                Err(payload) => Err(DriverError::OperationPanicked(panic_message(&*payload))),
            };
            let ok = result.is_ok();
            // 句柄可能已被丢弃
            let _ = result_tx.send(result);
            ok
        });

        let command = Self {
            id,
            submitted_at: Instant::now(),
            op,
        };
        (
            command,
            CommandHandle {
                id,
                rx: result_rx,
            },
        )
    }

    #[inline]
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// 从提交到现在经过的时间
    pub fn queued_for(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    /// 执行命令，返回是否成功
    pub fn execute(self) -> bool {
        (self.op)(&mut || {})
    }

    /// 执行命令，操作本体开始前先调用 `on_start`
    pub fn execute_with(self, mut on_start: impl FnMut()) -> bool {
        (self.op)(&mut on_start)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("queued_for", &self.queued_for())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// 命令结果句柄
///
/// 每个提交的命令恰好产生一个结果。句柄可以直接丢弃（fire-and-forget），
/// 命令仍会照常执行。
#[derive(Debug)]
pub struct CommandHandle<T> {
    id: CommandId,
    rx: Receiver<Result<T, DriverError>>,
}

impl<T> CommandHandle<T> {
    #[inline]
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// 阻塞直到命令完成
    pub fn wait(self) -> Result<T, DriverError> {
        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => Err(DriverError::ChannelClosed),
        }
    }

    /// 带超时等待
    ///
    /// 超时返回 [`DriverError::Timeout`]，命令本身不会被取消，可以再次等待。
    /// 结果只会交付一次，取走之后再调用返回 [`DriverError::ChannelClosed`]。
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, DriverError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(DriverError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(DriverError::ChannelClosed),
        }
    }

    /// 非阻塞查询；尚未完成时返回 `None`
    pub fn try_result(&self) -> Option<Result<T, DriverError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(DriverError::ChannelClosed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbplay_pins::{PinError, PinId};

    #[test]
    fn test_execute_delivers_result() {
        let (cmd, handle) = Command::new(7, || Ok::<_, DriverError>(42u32));
        assert_eq!(cmd.id(), 7);
        assert_eq!(handle.id(), 7);
        assert!(handle.try_result().is_none());

        assert!(cmd.execute());
        assert_eq!(handle.wait().unwrap(), 42);
    }

    #[test]
    fn test_execute_delivers_error() {
        let (cmd, handle) = Command::new(1, || {
            Err::<(), _>(DriverError::Pin(PinError::UnknownPin(PinId::from("P9_14"))))
        });
        assert!(!cmd.execute());
        assert!(matches!(
            handle.wait(),
            Err(DriverError::Pin(PinError::UnknownPin(_)))
        ));
    }

    #[test]
    fn test_panic_is_captured() {
        let (cmd, handle) = Command::new(2, || -> Result<(), DriverError> { panic!("servo on fire") });
        assert!(!cmd.execute());
        match handle.wait() {
            Err(DriverError::OperationPanicked(msg)) => assert!(msg.contains("servo on fire")),
            other => panic!("Expected OperationPanicked, got {:?}", other),
        }
    }

    #[test]
    fn test_dropped_command_closes_handle() {
        let (cmd, handle) = Command::new(3, || Ok::<_, DriverError>(()));
        drop(cmd);
        assert!(matches!(handle.wait(), Err(DriverError::ChannelClosed)));
    }

    #[test]
    fn test_wait_timeout_does_not_cancel() {
        let (cmd, handle) = Command::new(4, || Ok::<_, DriverError>("done"));
        assert!(matches!(
            handle.wait_timeout(Duration::from_millis(10)),
            Err(DriverError::Timeout)
        ));

        cmd.execute();
        assert_eq!(handle.wait_timeout(Duration::from_millis(10)).unwrap(), "done");
        // 结果只交付一次
        assert!(matches!(
            handle.try_result(),
            Some(Err(DriverError::ChannelClosed))
        ));
    }

    #[test]
    fn test_dropped_handle_does_not_affect_execution() {
        let (cmd, handle) = Command::new(5, || Ok::<_, DriverError>(()));
        drop(handle);
        assert!(cmd.execute());
    }

    #[test]
    fn test_execute_with_signals_before_operation() {
        let log = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let op_log = log.clone();
        let (cmd, handle) = Command::new(6, move || {
            op_log.lock().unwrap().push("op");
            Ok::<_, DriverError>(())
        });

        let mut starts = 0;
        assert!(cmd.execute_with(|| {
            starts += 1;
            log.lock().unwrap().push("start");
        }));
        assert_eq!(starts, 1);
        assert_eq!(*log.lock().unwrap(), vec!["start", "op"]);
        handle.wait().unwrap();
    }
}
