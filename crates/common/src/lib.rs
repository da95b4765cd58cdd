//! Formgate 基础设施库
//!
//! 为反垃圾核心提供公共组件：环境变量安全配置（含显式的启用/未启用模式）、
//! 反向代理头中的客户端 IP 提取、以及测试/二进制使用的日志初始化

pub mod config;
pub mod ip;
pub mod logging;

// Re-export commonly used types for convenience
pub use config::{
    CaptchaKeys, ConfigError, ConfigResult, EnforcementMode, SecurityConfig,
    DEFAULT_CAPTCHA_TIMEOUT_MS, DEFAULT_CAPTCHA_VERIFY_URL,
};
pub use ip::{client_ip, HeaderLookup};
pub use logging::init_tracing;
