//! 表单 Token 签名与校验
//!
//! Token 线上格式：`base64url(JSON 载荷) + "." + base64url(HMAC-SHA256 签名)`，
//! 载荷字段为 `ts`（铸造时刻，毫秒）与 `nonce`（UUID v4，每次铸造唯一）。
//! 签名覆盖编码后的载荷段原文；校验顺序是先比对签名、后解码载荷。
//! 未配置密钥时签名器进入 Disabled 模式：不铸造 Token，校验一律 Skipped。

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use formgate_common::{EnforcementMode, SecurityConfig};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Token 长度上限（字节），超出直接按畸形拒绝，避免对超长输入做 HMAC
pub const MAX_TOKEN_LEN: usize = 4096;

/// Token 明文载荷
///
/// 铸造后不可变；签名绑定其序列化后的精确字节
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// 铸造时刻（Unix 毫秒）
    pub ts: u64,

    /// 一次性随机标识，用于重放检测
    pub nonce: String,
}

/// 校验通过的 Token 及其年龄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub payload: TokenPayload,
    /// `now - ts`，饱和减法（时钟回拨时为 0）
    pub age_ms: u64,
}

/// Token 拒绝原因
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// 分段数不对、超长、或签名验证通过后载荷无法解码
    #[error("malformed token")]
    Malformed,

    /// 签名段无法解码或与重新计算的 HMAC 不一致
    #[error("token signature mismatch")]
    BadSignature,
}

/// Token 校验结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenVerification {
    /// 未配置密钥，校验未执行（fail-open 模式）
    Skipped,
    /// 签名有效且载荷完整
    Valid(VerifiedToken),
    /// 拒绝
    Invalid(TokenRejection),
}

/// 表单 Token 签名器
///
/// 校验是纯函数：不改变任何状态，结果只取决于 Token、密钥与时钟
pub struct TokenSigner {
    secret: Option<Vec<u8>>,
}

impl TokenSigner {
    /// 从安全配置构造
    ///
    /// 缺失密钥时进入 Disabled 模式并记录一条 warn（显式的 fail-open）
    pub fn from_config(cfg: &SecurityConfig) -> Self {
        match cfg.form_token_secret() {
            Some(secret) => {
                debug!("form token enforcement enabled");
                Self {
                    secret: Some(secret.as_bytes().to_vec()),
                }
            }
            None => {
                warn!(
                    "form token enforcement disabled ({} not set); submissions will not be token-checked",
                    formgate_common::config::ENV_FORM_TOKEN_SECRET
                );
                Self { secret: None }
            }
        }
    }

    /// 用给定密钥构造（嵌入方/测试用）
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: Some(secret.into()),
        }
    }

    /// 当前生效模式
    pub fn mode(&self) -> EnforcementMode {
        if self.secret.is_some() {
            EnforcementMode::Enforced
        } else {
            EnforcementMode::Disabled
        }
    }

    /// 铸造一个新 Token
    ///
    /// Disabled 模式返回 None（页面照常渲染，只是不带 Token）
    pub fn mint(&self) -> Option<String> {
        self.mint_at(now_ms())
    }

    /// 以指定时钟铸造（测试用确定性入口）
    pub fn mint_at(&self, now_ms: u64) -> Option<String> {
        let secret = self.secret.as_ref()?;

        let payload = TokenPayload {
            ts: now_ms,
            nonce: Uuid::new_v4().to_string(),
        };
        let payload_json =
            serde_json::to_string(&payload).expect("token payload serialization is infallible");
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json.as_bytes());

        let sig = sign(secret, payload_b64.as_bytes());
        Some(format!("{}.{}", payload_b64, URL_SAFE_NO_PAD.encode(sig)))
    }

    /// 校验一个 Token
    pub fn verify(&self, token: &str) -> TokenVerification {
        self.verify_at(token, now_ms())
    }

    /// 以指定时钟校验（测试用确定性入口）
    pub fn verify_at(&self, token: &str, now_ms: u64) -> TokenVerification {
        let Some(secret) = self.secret.as_ref() else {
            return TokenVerification::Skipped;
        };

        if token.len() > MAX_TOKEN_LEN {
            return TokenVerification::Invalid(TokenRejection::Malformed);
        }

        let parts: Vec<&str> = token.split('.').collect();
        let (payload_b64, sig_b64) = match parts.as_slice() {
            [payload, sig] if !payload.is_empty() && !sig.is_empty() => (*payload, *sig),
            _ => return TokenVerification::Invalid(TokenRejection::Malformed),
        };

        // 签名先行：载荷解码只在签名有效后进行
        let Ok(sig) = URL_SAFE_NO_PAD.decode(sig_b64) else {
            return TokenVerification::Invalid(TokenRejection::BadSignature);
        };
        let mut mac =
            HmacSha256::new_from_slice(secret).expect("HMAC-SHA256 accepts any key length");
        mac.update(payload_b64.as_bytes());
        // 常量时间比较，防止逐字节计时侧信道
        if mac.verify_slice(&sig).is_err() {
            return TokenVerification::Invalid(TokenRejection::BadSignature);
        }

        let Ok(payload_bytes) = URL_SAFE_NO_PAD.decode(payload_b64) else {
            return TokenVerification::Invalid(TokenRejection::Malformed);
        };
        let Ok(payload) = serde_json::from_slice::<TokenPayload>(&payload_bytes) else {
            return TokenVerification::Invalid(TokenRejection::Malformed);
        };

        let age_ms = now_ms.saturating_sub(payload.ts);
        TokenVerification::Valid(VerifiedToken { payload, age_ms })
    }
}

fn sign(secret: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC-SHA256 accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// 生成新的表单密钥（运维初始化用）
///
/// 返回十六进制格式的 32 字节随机密钥
pub fn generate_form_secret() -> String {
    let mut key = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut key);
    hex::encode(key)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
