//! siteverify 出站校验
//!
//! 请求体为表单编码的 `secret` + `response`（+ 可选 `remoteip`），
//! 响应体为带布尔 `success` 字段的 JSON。超时由 HTTP 客户端统一施加，
//! 第三方不可达时表单提交不会被无限期拖住。

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use antispam::{ChallengeOutcome, ChallengeVerifier};
use formgate_common::{CaptchaKeys, EnforcementMode, SecurityConfig};

/// siteverify 响应体
#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Option<Vec<String>>,
}

/// 基于 HTTP 的挑战校验器
///
/// 所有失败模式（网络错误、超时、非成功状态码、畸形响应体）都折叠为
/// [`ChallengeOutcome::Unreachable`]，永不向调用方抛错
pub struct HttpChallengeVerifier {
    keys: Option<CaptchaKeys>,
    verify_url: String,
    client: reqwest::Client,
}

impl HttpChallengeVerifier {
    /// 从安全配置构造
    ///
    /// 缺失密钥对时进入 Disabled 模式并记录一条 warn（显式的 fail-open）
    pub fn from_config(cfg: &SecurityConfig) -> Self {
        let keys = cfg.captcha_keys().cloned();
        match &keys {
            Some(_) => {
                info!(
                    verify_url = %cfg.captcha_verify_url(),
                    timeout_ms = cfg.captcha_timeout().as_millis() as u64,
                    "CAPTCHA verification enabled"
                );
            }
            None => {
                warn!(
                    "CAPTCHA verification disabled ({} / {} not both set); challenge checks will be skipped",
                    formgate_common::config::ENV_CAPTCHA_SITE_KEY,
                    formgate_common::config::ENV_CAPTCHA_SECRET_KEY
                );
            }
        }

        let client = reqwest::Client::builder()
            .timeout(cfg.captcha_timeout())
            .build()
            .expect("reqwest client construction with static options");

        Self {
            keys,
            verify_url: cfg.captcha_verify_url().to_string(),
            client,
        }
    }

    /// 当前生效模式
    pub fn mode(&self) -> EnforcementMode {
        if self.keys.is_some() {
            EnforcementMode::Enforced
        } else {
            EnforcementMode::Disabled
        }
    }
}

#[async_trait]
impl ChallengeVerifier for HttpChallengeVerifier {
    async fn verify(&self, response: Option<&str>, remote_ip: Option<&str>) -> ChallengeOutcome {
        let Some(keys) = self.keys.as_ref() else {
            return ChallengeOutcome::Skipped;
        };

        // 已启用校验但客户端没交响应：直接失败，不必发请求
        let Some(response) = response.map(str::trim).filter(|r| !r.is_empty()) else {
            debug!("challenge response missing from submission");
            return ChallengeOutcome::Failed;
        };

        let mut form = vec![
            ("secret", keys.secret_key.as_str()),
            ("response", response),
        ];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let result = self.client.post(&self.verify_url).form(&form).send().await;
        let http_response = match result {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "challenge verification request failed");
                return ChallengeOutcome::Unreachable;
            }
        };

        let status = http_response.status();
        if !status.is_success() {
            warn!(%status, "challenge service returned non-success status");
            return ChallengeOutcome::Unreachable;
        }

        match http_response.json::<SiteverifyResponse>().await {
            Ok(body) if body.success => ChallengeOutcome::Passed,
            Ok(body) => {
                debug!(error_codes = ?body.error_codes, "challenge service rejected response");
                ChallengeOutcome::Failed
            }
            Err(err) => {
                warn!(error = %err, "challenge service returned malformed body");
                ChallengeOutcome::Unreachable
            }
        }
    }
}
