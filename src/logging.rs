//! 日志初始化 (tracing)

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装全局日志订阅器, 级别由 RUST_LOG 控制, 默认 info
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 重复初始化 (例如测试中) 时忽略错误
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_thread_names(true))
        .try_init();
}
