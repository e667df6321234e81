//! 运行模式
//!
//! One-shot 子命令在 `commands` 中实现，这里是交互式 Shell。

pub mod repl;
