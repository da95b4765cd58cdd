//! 日志初始化
//!
//! 提供给集成测试和嵌入方二进制的 tracing 订阅器初始化，RUST_LOG 优先生效

use tracing_subscriber::filter::EnvFilter;

/// 初始化全局 tracing 订阅器
///
/// 重复调用是安全的（后续调用为 no-op）
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
