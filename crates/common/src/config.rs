//! 安全配置模块
//!
//! 从环境变量加载表单 Token 密钥与 CAPTCHA 密钥对。缺失的密钥不会导致加载失败，
//! 而是进入显式的 `Disabled` 模式（fail-open 是产品决策，但必须可见、可审计）；
//! 已设置但非法的值（无效整数、无效 URL）是配置错误，直接拒绝启动。

use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// 表单 Token 签名密钥
pub const ENV_FORM_TOKEN_SECRET: &str = "FORMGATE_FORM_TOKEN_SECRET";
/// CAPTCHA 站点公钥（嵌入页面）
pub const ENV_CAPTCHA_SITE_KEY: &str = "FORMGATE_CAPTCHA_SITE_KEY";
/// CAPTCHA 服务端私钥（校验请求使用）
pub const ENV_CAPTCHA_SECRET_KEY: &str = "FORMGATE_CAPTCHA_SECRET_KEY";
/// CAPTCHA 校验端点覆盖（主要用于测试）
pub const ENV_CAPTCHA_VERIFY_URL: &str = "FORMGATE_CAPTCHA_VERIFY_URL";
/// CAPTCHA 出站请求超时（毫秒）
pub const ENV_CAPTCHA_TIMEOUT_MS: &str = "FORMGATE_CAPTCHA_TIMEOUT_MS";

/// 默认的第三方校验端点（Cloudflare Turnstile siteverify）
pub const DEFAULT_CAPTCHA_VERIFY_URL: &str =
    "https://challenges.cloudflare.com/turnstile/v0/siteverify";
/// 默认出站超时：5 秒
pub const DEFAULT_CAPTCHA_TIMEOUT_MS: u64 = 5_000;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 整数环境变量非法
    #[error("Invalid integer env var {name}={value}")]
    InvalidInteger { name: String, value: String },

    /// URL 环境变量非法
    #[error("Invalid URL env var {name}={value} (expected http:// or https://)")]
    InvalidUrl { name: String, value: String },
}

/// 配置结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;

/// 单个防护组件的生效模式
///
/// 缺失密钥时组件降级为 `Disabled`（不拦截任何提交）。区别于静默跳过，
/// 模式是显式值，组件构造时必须记录一条 warn 日志说明缺了哪个变量。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementMode {
    Enforced,
    Disabled,
}

impl EnforcementMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EnforcementMode::Enforced => "enforced",
            EnforcementMode::Disabled => "disabled",
        }
    }

    pub fn is_enforced(self) -> bool {
        matches!(self, EnforcementMode::Enforced)
    }
}

/// CAPTCHA 密钥对
///
/// 站点公钥由页面侧使用，服务端私钥用于 siteverify 请求；二者缺一不可
#[derive(Debug, Clone)]
pub struct CaptchaKeys {
    pub site_key: String,
    pub secret_key: String,
}

/// 反垃圾安全配置
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    form_token_secret: Option<String>,
    captcha: Option<CaptchaKeys>,
    captcha_verify_url: String,
    captcha_timeout: Duration,
}

impl SecurityConfig {
    /// 从环境变量加载配置
    ///
    /// 缺失的密钥进入 Disabled 模式（见模块文档）；半配置的 CAPTCHA
    /// 密钥对（只设置了一个）同样视为未配置，但会记录 warn 日志。
    pub fn from_env() -> ConfigResult<Self> {
        let form_token_secret = env_opt_nonempty(ENV_FORM_TOKEN_SECRET);

        let site_key = env_opt_nonempty(ENV_CAPTCHA_SITE_KEY);
        let secret_key = env_opt_nonempty(ENV_CAPTCHA_SECRET_KEY);
        let captcha = match (site_key, secret_key) {
            (Some(site_key), Some(secret_key)) => Some(CaptchaKeys {
                site_key,
                secret_key,
            }),
            (None, None) => None,
            (Some(_), None) => {
                warn!(
                    "{} is set but {} is missing; CAPTCHA verification disabled",
                    ENV_CAPTCHA_SITE_KEY, ENV_CAPTCHA_SECRET_KEY
                );
                None
            }
            (None, Some(_)) => {
                warn!(
                    "{} is set but {} is missing; CAPTCHA verification disabled",
                    ENV_CAPTCHA_SECRET_KEY, ENV_CAPTCHA_SITE_KEY
                );
                None
            }
        };

        let captcha_verify_url = match env_opt_nonempty(ENV_CAPTCHA_VERIFY_URL) {
            Some(url) => parse_http_url(&url).ok_or_else(|| ConfigError::InvalidUrl {
                name: ENV_CAPTCHA_VERIFY_URL.to_string(),
                value: url,
            })?,
            None => DEFAULT_CAPTCHA_VERIFY_URL.to_string(),
        };

        let captcha_timeout = match env_opt_nonempty(ENV_CAPTCHA_TIMEOUT_MS) {
            Some(raw) => {
                let ms = raw.trim().parse::<u64>().ok().filter(|ms| *ms > 0).ok_or_else(
                    || ConfigError::InvalidInteger {
                        name: ENV_CAPTCHA_TIMEOUT_MS.to_string(),
                        value: raw,
                    },
                )?;
                Duration::from_millis(ms)
            }
            None => Duration::from_millis(DEFAULT_CAPTCHA_TIMEOUT_MS),
        };

        Ok(Self {
            form_token_secret,
            captcha,
            captcha_verify_url,
            captcha_timeout,
        })
    }

    /// 构造一个全部防护未启用的配置（测试和嵌入方使用）
    pub fn disabled() -> Self {
        Self {
            form_token_secret: None,
            captcha: None,
            captcha_verify_url: DEFAULT_CAPTCHA_VERIFY_URL.to_string(),
            captcha_timeout: Duration::from_millis(DEFAULT_CAPTCHA_TIMEOUT_MS),
        }
    }

    /// 设置表单 Token 密钥
    pub fn with_form_token_secret(mut self, secret: impl Into<String>) -> Self {
        self.form_token_secret = Some(secret.into());
        self
    }

    /// 设置 CAPTCHA 密钥对
    pub fn with_captcha_keys(
        mut self,
        site_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.captcha = Some(CaptchaKeys {
            site_key: site_key.into(),
            secret_key: secret_key.into(),
        });
        self
    }

    /// 覆盖校验端点（测试用）
    pub fn with_captcha_verify_url(mut self, url: impl Into<String>) -> Self {
        self.captcha_verify_url = url.into();
        self
    }

    /// 覆盖出站超时
    pub fn with_captcha_timeout(mut self, timeout: Duration) -> Self {
        self.captcha_timeout = timeout;
        self
    }

    pub fn form_token_secret(&self) -> Option<&str> {
        self.form_token_secret.as_deref()
    }

    pub fn captcha_keys(&self) -> Option<&CaptchaKeys> {
        self.captcha.as_ref()
    }

    pub fn captcha_verify_url(&self) -> &str {
        &self.captcha_verify_url
    }

    pub fn captcha_timeout(&self) -> Duration {
        self.captcha_timeout
    }

    /// 表单 Token 防护的生效模式
    pub fn token_mode(&self) -> EnforcementMode {
        if self.form_token_secret.is_some() {
            EnforcementMode::Enforced
        } else {
            EnforcementMode::Disabled
        }
    }

    /// CAPTCHA 防护的生效模式
    pub fn captcha_mode(&self) -> EnforcementMode {
        if self.captcha.is_some() {
            EnforcementMode::Enforced
        } else {
            EnforcementMode::Disabled
        }
    }
}

fn env_opt_nonempty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_http_url(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Some(trimmed.to_string())
    } else {
        None
    }
}
