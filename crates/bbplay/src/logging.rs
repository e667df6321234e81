//! 日志初始化
//!
//! 库内部只使用 `tracing` 宏；可执行程序调用 [`init`] 安装订阅者。

use tracing_subscriber::EnvFilter;

/// 安装 fmt 订阅者
///
/// 过滤规则取自 `RUST_LOG`，再追加 `default_directive`（例如 `bbplay_cli=info`）。
/// 日志写到 stderr，stdout 留给命令输出。
/// 重复调用时保留第一次安装的订阅者。
pub fn init(default_directive: &str) {
    let filter = build_filter(default_directive);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_filter(default_directive: &str) -> EnvFilter {
    let filter = EnvFilter::from_default_env();
    match default_directive.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}
