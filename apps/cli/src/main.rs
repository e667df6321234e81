//! # bbplay CLI
//!
//! 舵机与传感器的命令行工具。
//!
//! ## One-shot 模式
//!
//! ```bash
//! bbplay-cli servo list
//! bbplay-cli --backend sysfs servo set 0 0.5
//! bbplay-cli temperature
//! ```
//!
//! ## REPL 模式
//!
//! ```bash
//! $ bbplay-cli shell
//! bbplay> set 0 0.25
//! bbplay> get 0
//! bbplay> mode pipelined
//! bbplay> exit
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod modes;
mod output;
mod setup;

use commands::{ConfigCommand, HoldCommand, ServoCommand, TemperatureCommand};
use modes::repl::run_repl;
use setup::GlobalArgs;

/// bbplay CLI - 舵机与传感器命令行工具
#[derive(Parser, Debug)]
#[command(name = "bbplay-cli")]
#[command(about = "Command-line interface for bbplay servo and sensor control", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 舵机操作
    #[command(subcommand)]
    Servo(ServoCommand),

    /// 读取温度传感器
    Temperature {
        #[command(flatten)]
        args: TemperatureCommand,
    },

    /// 启动交互式 Shell（REPL 模式）
    Shell,

    /// 初始化舵机并保持写入线程运行，直到 Ctrl-C
    Hold {
        #[command(flatten)]
        args: HoldCommand,
    },

    /// 配置文件管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    bbplay::logging::init("bbplay_cli=info");

    let cli = Cli::parse();

    match cli.command {
        Commands::Servo(cmd) => cmd.execute(&cli.global),

        Commands::Temperature { args } => args.execute(&cli.global),

        Commands::Hold { args } => args.execute(&cli.global),

        Commands::Config(cmd) => cmd.execute(&cli.global),

        Commands::Shell => {
            let hw = setup::start(&cli.global, true)?;
            run_repl(&hw)
        },
    }
}
