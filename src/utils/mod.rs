//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 统一工具模块，提供测试和示例共用的日志初始化等工具函数。

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// 初始化tracing日志，幂等，默认级别info，可被RUST_LOG覆盖
pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .try_init()
            .ok();
    });
}
