//! REPL 模式（交互式 Shell）
//!
//! 专用输入线程 + crossbeam 通道：rustyline 在输入线程内阻塞，
//! 主线程持有硬件栈并执行命令，会话期间后台写入线程保持运行。

use crate::commands::servo::set_and_wait;
use crate::output;
use anyhow::{Context, Result};
use bbplay::{Hardware, QueueMode};
use crossbeam_channel::{Receiver, bounded};
use rustyline::Editor;
use std::panic;
use std::thread;
use std::time::Duration;

const HISTORY_PATH: &str = ".bbplay_history";

/// `set` 命令等待写入生效的时间
const SET_TIMEOUT: Duration = Duration::from_secs(2);

/// 解析后的 Shell 命令
#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Set { id: usize, position: f64 },
    Get { id: usize },
    List,
    Temp { id: Option<usize> },
    Mode(Option<QueueMode>),
    Metrics,
    Help,
    Exit,
    Empty,
}

/// 解析一行输入
pub fn parse_command(line: &str) -> Result<ShellCommand> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let Some((&name, args)) = parts.split_first() else {
        return Ok(ShellCommand::Empty);
    };

    let id_arg = |index: usize| -> Result<usize> {
        let raw = args.get(index).with_context(|| format!("{} 缺少舵机/传感器 ID", name))?;
        raw.parse().with_context(|| format!("无效的 ID: {}", raw))
    };

    match name {
        "set" => {
            let id = id_arg(0)?;
            let raw = args.get(1).context("set 缺少位置参数")?;
            let position = raw.parse().with_context(|| format!("无效的位置: {}", raw))?;
            Ok(ShellCommand::Set { id, position })
        },
        "get" => Ok(ShellCommand::Get { id: id_arg(0)? }),
        "list" | "ls" => Ok(ShellCommand::List),
        "temp" | "temperature" => {
            let id = if args.is_empty() { None } else { Some(id_arg(0)?) };
            Ok(ShellCommand::Temp { id })
        },
        "mode" => match args.first() {
            None => Ok(ShellCommand::Mode(None)),
            Some(raw) => {
                let mode = raw.parse::<QueueMode>().map_err(|e| anyhow::anyhow!("{}", e))?;
                Ok(ShellCommand::Mode(Some(mode)))
            },
        },
        "metrics" => Ok(ShellCommand::Metrics),
        "help" | "?" => Ok(ShellCommand::Help),
        "exit" | "quit" => Ok(ShellCommand::Exit),
        other => anyhow::bail!("未知命令: {}", other),
    }
}

/// REPL 输入（专用输入线程）
pub struct ReplInput {
    command_rx: Receiver<String>,
    _input_thread: thread::JoinHandle<Result<()>>,
}

impl ReplInput {
    /// 创建专用输入线程（保留历史记录）
    pub fn new() -> Self {
        let (command_tx, command_rx) = bounded::<String>(10);

        // Editor 在输入线程内创建，生命周期等于会话
        let input_thread = thread::spawn(move || {
            use rustyline::history::DefaultHistory;

            let mut rl = Editor::<(), DefaultHistory>::new()
                .map_err(|e| anyhow::anyhow!("Failed to initialize readline: {}", e))?;

            rl.load_history(HISTORY_PATH).ok(); // 首次运行没有历史文件

            println!("bbplay CLI v{} - 交互式 Shell", env!("CARGO_PKG_VERSION"));
            println!("输入 'help' 查看帮助，'exit' 退出");
            println!();

            loop {
                match rl.readline("bbplay> ") {
                    Ok(line) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }

                        let exiting = line == "exit" || line == "quit";
                        let _ = rl.add_history_entry(line.clone());
                        if command_tx.send(line).is_err() || exiting {
                            break;
                        }
                    },

                    Err(rustyline::error::ReadlineError::Interrupted) => {
                        println!("^C");
                        let _ = command_tx.send("SIGINT".to_string());
                    },

                    Err(rustyline::error::ReadlineError::Eof) => break,

                    Err(err) => {
                        eprintln!("Error: {:?}", err);
                        break;
                    },
                }
            }

            rl.save_history(HISTORY_PATH).ok();
            Ok(())
        });

        Self {
            command_rx,
            _input_thread: input_thread,
        }
    }

    /// 阻塞等待用户输入；输入线程退出后返回 `None`
    pub fn recv_command(&self) -> Option<String> {
        self.command_rx.recv().ok()
    }
}

/// 运行 REPL 模式
pub fn run_repl(hw: &Hardware) -> Result<()> {
    let input = ReplInput::new();

    while let Some(line) = input.recv_command() {
        if line == "SIGINT" {
            eprintln!("💡 输入 'exit' 或按 Ctrl+D 退出");
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                eprintln!("❌ Error: {}", err);
                eprintln!("💡 提示: 输入 'help' 查看所有命令");
                continue;
            },
        };

        if command == ShellCommand::Exit {
            break;
        }

        // 命令 panic 不终止会话
        match panic::catch_unwind(panic::AssertUnwindSafe(|| execute(hw, command))) {
            Ok(Ok(())) => {},
            Ok(Err(err)) => eprintln!("❌ Error: {:#}", err),
            Err(panic_err) => eprintln!("❌ Command panicked: {:?}", panic_err),
        }
    }

    println!("👋 再见！");
    Ok(())
}

fn execute(hw: &Hardware, command: ShellCommand) -> Result<()> {
    match command {
        ShellCommand::Set { id, position } => {
            set_and_wait(hw, id, position, SET_TIMEOUT)?;
            println!("{}", output::servo_reading(id, &hw.servos().read(id)?));
        },
        ShellCommand::Get { id } => {
            println!("{}", output::servo_reading(id, &hw.servos().read(id)?));
        },
        ShellCommand::List => {
            for info in hw.servos().list() {
                println!("servo  {}", output::device(&info));
            }
            for info in hw.sensors().list() {
                println!("sensor {}", output::device(&info));
            }
        },
        ShellCommand::Temp { id } => {
            let ids: Vec<usize> = match id {
                Some(id) => vec![id],
                None => (0..hw.sensors().len()).collect(),
            };
            for id in ids {
                let reading = hw.sensors().read_temperature(id)?;
                println!("{}", output::temperature(id, &reading));
            }
        },
        ShellCommand::Mode(None) => println!("queue mode: {}", hw.queue().mode()),
        ShellCommand::Mode(Some(mode)) => {
            hw.queue().set_mode(mode);
            println!("✅ queue mode: {}", mode);
        },
        ShellCommand::Metrics => println!("{}", output::metrics(&hw.queue().metrics())),
        ShellCommand::Help => print_help(),
        ShellCommand::Exit | ShellCommand::Empty => {},
    }
    Ok(())
}

fn print_help() {
    println!("可用命令:");
    println!("  set <id> <position>           设置舵机位置（0..1）");
    println!("  get <id>                      读取舵机位置");
    println!("  list                          列出舵机和传感器");
    println!("  temp [id]                     读取温度");
    println!("  mode [strict|pipelined]       查看/切换队列模式");
    println!("  metrics                       队列指标");
    println!("  help                          显示帮助");
    println!("  exit / quit                   退出");
    println!();
    println!("快捷键:");
    println!("  Ctrl+D                        退出");
    println!();
}
