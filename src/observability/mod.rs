//! 可观测性：tracing 初始化
//!
//! 默认 info 级别，RUST_LOG 可覆盖；工具调用的审计记录以 JSON 写在 audit 字段中。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
