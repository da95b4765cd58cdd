//! 提交筛查流水线
//!
//! 按固定顺序执行各项防护检查：Token 校验 → Nonce 消费 → Token 年龄 →
//! 内容启发式 → 外部挑战校验。任何一步都可以独立拒绝，首个拒绝即终止。
//! 用户可见文案只有两种通用措辞，不回显具体失败的检查项——差异化的错误
//! 信息会帮助自动发送方针对性绕过防护。

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::challenge::{ChallengeOutcome, ChallengeVerifier};
use crate::heuristic::looks_like_url;
use crate::nonce::NonceStore;
use crate::token::{TokenRejection, TokenSigner, TokenVerification};

/// Nonce 与 Token 的默认生存期：1 小时
pub const DEFAULT_NONCE_TTL: Duration = Duration::from_secs(3600);

/// 启发式命中后的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentPolicy {
    /// 直接拒绝（默认；引导用户把链接填到专用字段）
    Reject,
    /// 接受但记录命中的字段，供人工复核
    Flag,
}

/// 筛查策略
#[derive(Debug, Clone)]
pub struct ScreenPolicy {
    /// Nonce 登记的 TTL
    pub nonce_ttl: Duration,
    /// Token 最大年龄，超过按过期拒绝
    pub max_token_age: Duration,
    /// Token 最小年龄（秒提机器人信号），默认不启用
    pub min_token_age: Option<Duration>,
    /// 启发式命中策略
    pub content_policy: ContentPolicy,
}

impl Default for ScreenPolicy {
    fn default() -> Self {
        Self {
            nonce_ttl: DEFAULT_NONCE_TTL,
            max_token_age: DEFAULT_NONCE_TTL,
            min_token_age: None,
            content_policy: ContentPolicy::Reject,
        }
    }
}

/// 一次表单提交
#[derive(Debug, Clone, Default)]
pub struct Submission {
    /// 隐藏字段中回传的表单 Token
    pub form_token: Option<String>,
    /// 客户端的挑战响应
    pub challenge_response: Option<String>,
    /// 参考用客户端 IP（见 `formgate_common::ip`）
    pub remote_ip: Option<String>,
    /// 自由文本字段：(字段名, 内容)
    pub fields: Vec<(String, String)>,
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_form_token(mut self, token: impl Into<String>) -> Self {
        self.form_token = Some(token.into());
        self
    }

    pub fn with_challenge_response(mut self, response: impl Into<String>) -> Self {
        self.challenge_response = Some(response.into());
        self
    }

    pub fn with_remote_ip(mut self, ip: impl Into<String>) -> Self {
        self.remote_ip = Some(ip.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

/// 拒绝原因（仅用于日志与内部统计，永不直接回显给用户）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MalformedToken,
    BadSignature,
    ReplayedNonce,
    ExpiredToken,
    SuspiciousContent,
    CaptchaFailed,
    CaptchaUnreachable,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::MalformedToken => "malformed-token",
            RejectReason::BadSignature => "bad-signature",
            RejectReason::ReplayedNonce => "replayed-nonce",
            RejectReason::ExpiredToken => "expired-token",
            RejectReason::SuspiciousContent => "suspicious-content",
            RejectReason::CaptchaFailed => "captcha-failed",
            RejectReason::CaptchaUnreachable => "captcha-unreachable",
        }
    }

    /// 通用用户文案：不区分具体失败的检查项
    pub fn user_message(self) -> &'static str {
        match self {
            RejectReason::CaptchaFailed | RejectReason::CaptchaUnreachable => {
                "Please complete the verification and try again."
            }
            _ => "Something went wrong. Please try again.",
        }
    }
}

/// 筛查裁决
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// 接受；`flags` 为启发式命中但按策略放行的字段名
    Accepted { flags: Vec<String> },
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }

    /// 拒绝时的用户文案；接受时为 None
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            Verdict::Accepted { .. } => None,
            Verdict::Rejected(reason) => Some(reason.user_message()),
        }
    }
}

/// 提交筛查器
///
/// Nonce 存储与挑战校验器都是显式注入的依赖：
/// 单实例部署用内存存储，多实例部署换分布式后端
pub struct SubmissionScreen {
    signer: TokenSigner,
    nonces: Arc<dyn NonceStore>,
    challenge: Arc<dyn ChallengeVerifier>,
    policy: ScreenPolicy,
}

impl SubmissionScreen {
    pub fn new(
        signer: TokenSigner,
        nonces: Arc<dyn NonceStore>,
        challenge: Arc<dyn ChallengeVerifier>,
    ) -> Self {
        Self {
            signer,
            nonces,
            challenge,
            policy: ScreenPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ScreenPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 为页面渲染铸造一个新 Token（Disabled 模式下为 None）
    pub fn mint_token(&self) -> Option<String> {
        self.signer.mint()
    }

    /// 筛查一次提交
    pub async fn screen(&self, submission: &Submission) -> Verdict {
        self.screen_at(submission, now_ms()).await
    }

    /// 以指定时钟筛查（测试用确定性入口；时钟只作用于 Token 年龄计算）
    pub async fn screen_at(&self, submission: &Submission, now_ms: u64) -> Verdict {
        // 1. Token 校验（未配置密钥时连同 Nonce/年龄检查一起跳过）
        let token_check = match submission.form_token.as_deref() {
            Some(token) => self.signer.verify_at(token, now_ms),
            None if self.signer.mode().is_enforced() => {
                debug!("submission carried no form token");
                return Verdict::Rejected(RejectReason::MalformedToken);
            }
            None => TokenVerification::Skipped,
        };

        match token_check {
            TokenVerification::Skipped => {}
            TokenVerification::Invalid(TokenRejection::Malformed) => {
                return Verdict::Rejected(RejectReason::MalformedToken);
            }
            TokenVerification::Invalid(TokenRejection::BadSignature) => {
                return Verdict::Rejected(RejectReason::BadSignature);
            }
            TokenVerification::Valid(verified) => {
                // 2. Nonce 一次性消费
                if !self
                    .nonces
                    .consume_once(&verified.payload.nonce, self.policy.nonce_ttl)
                {
                    return Verdict::Rejected(RejectReason::ReplayedNonce);
                }

                // 3. Token 年龄
                if verified.age_ms > self.policy.max_token_age.as_millis() as u64 {
                    return Verdict::Rejected(RejectReason::ExpiredToken);
                }
                if let Some(min_age) = self.policy.min_token_age {
                    if verified.age_ms < min_age.as_millis() as u64 {
                        debug!(age_ms = verified.age_ms, "submission faster than minimum age");
                        return Verdict::Rejected(RejectReason::SuspiciousContent);
                    }
                }
            }
        }

        // 4. 内容启发式
        let mut flags = Vec::new();
        for (name, value) in &submission.fields {
            if looks_like_url(value) {
                match self.policy.content_policy {
                    ContentPolicy::Reject => {
                        warn!(field = %name, "url-like content in text field");
                        return Verdict::Rejected(RejectReason::SuspiciousContent);
                    }
                    ContentPolicy::Flag => flags.push(name.clone()),
                }
            }
        }

        // 5. 外部挑战校验（唯一的网络挂起点）
        match self
            .challenge
            .verify(
                submission.challenge_response.as_deref(),
                submission.remote_ip.as_deref(),
            )
            .await
        {
            ChallengeOutcome::Skipped | ChallengeOutcome::Passed => {}
            ChallengeOutcome::Failed => {
                return Verdict::Rejected(RejectReason::CaptchaFailed);
            }
            ChallengeOutcome::Unreachable => {
                warn!("challenge service unreachable");
                return Verdict::Rejected(RejectReason::CaptchaUnreachable);
            }
        }

        Verdict::Accepted { flags }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::NoopChallengeVerifier;
    use crate::nonce::MemoryNonceStore;
    use crate::token::TokenSigner;
    use async_trait::async_trait;

    struct FixedChallengeVerifier {
        outcome: ChallengeOutcome,
    }

    #[async_trait]
    impl ChallengeVerifier for FixedChallengeVerifier {
        async fn verify(
            &self,
            _response: Option<&str>,
            _remote_ip: Option<&str>,
        ) -> ChallengeOutcome {
            self.outcome
        }
    }

    fn screen_with(outcome: ChallengeOutcome) -> SubmissionScreen {
        SubmissionScreen::new(
            TokenSigner::new(b"pipeline-secret".to_vec()),
            Arc::new(MemoryNonceStore::new()),
            Arc::new(FixedChallengeVerifier { outcome }),
        )
    }

    fn screen() -> SubmissionScreen {
        screen_with(ChallengeOutcome::Skipped)
    }

    #[tokio::test]
    async fn test_fresh_submission_accepted() {
        let screen = screen();
        let token = screen.mint_token().unwrap();
        let submission = Submission::new()
            .with_form_token(token)
            .with_field("message", "hello, I would like a quote");

        assert_eq!(
            screen.screen(&submission).await,
            Verdict::Accepted { flags: vec![] }
        );
    }

    #[tokio::test]
    async fn test_missing_token_rejected_when_enforced() {
        let screen = screen();
        let submission = Submission::new().with_field("message", "hi");

        assert_eq!(
            screen.screen(&submission).await,
            Verdict::Rejected(RejectReason::MalformedToken)
        );
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let screen = screen();
        let submission = Submission::new().with_form_token("garbage");

        assert_eq!(
            screen.screen(&submission).await,
            Verdict::Rejected(RejectReason::MalformedToken)
        );
    }

    #[tokio::test]
    async fn test_replayed_token_rejected_at_nonce_step() {
        let screen = screen();
        let token = screen.mint_token().unwrap();
        let submission = Submission::new().with_form_token(token);

        assert!(screen.screen(&submission).await.is_accepted());
        assert_eq!(
            screen.screen(&submission).await,
            Verdict::Rejected(RejectReason::ReplayedNonce)
        );
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let screen = screen();
        let token = screen.mint_token().unwrap();
        let submission = Submission::new().with_form_token(token);

        let beyond_max = now_ms() + DEFAULT_NONCE_TTL.as_millis() as u64 + 1_000;
        assert_eq!(
            screen.screen_at(&submission, beyond_max).await,
            Verdict::Rejected(RejectReason::ExpiredToken)
        );
    }

    #[tokio::test]
    async fn test_min_age_rejects_instant_submission() {
        let screen = screen().with_policy(ScreenPolicy {
            min_token_age: Some(Duration::from_secs(2)),
            ..ScreenPolicy::default()
        });
        let token = screen.mint_token().unwrap();
        let submission = Submission::new().with_form_token(token);

        assert_eq!(
            screen.screen(&submission).await,
            Verdict::Rejected(RejectReason::SuspiciousContent)
        );
    }

    #[tokio::test]
    async fn test_url_content_rejected_despite_valid_token() {
        let screen = screen();
        let token = screen.mint_token().unwrap();
        let submission = Submission::new()
            .with_form_token(token)
            .with_field("name", "Alice")
            .with_field("message", "check out http://spamsite.example");

        assert_eq!(
            screen.screen(&submission).await,
            Verdict::Rejected(RejectReason::SuspiciousContent)
        );
    }

    #[tokio::test]
    async fn test_flag_policy_accepts_and_records_fields() {
        let screen = screen().with_policy(ScreenPolicy {
            content_policy: ContentPolicy::Flag,
            ..ScreenPolicy::default()
        });
        let token = screen.mint_token().unwrap();
        let submission = Submission::new()
            .with_form_token(token)
            .with_field("name", "Alice")
            .with_field("message", "see www.example.com");

        assert_eq!(
            screen.screen(&submission).await,
            Verdict::Accepted {
                flags: vec!["message".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_challenge_failed_rejected() {
        let screen = screen_with(ChallengeOutcome::Failed);
        let token = screen.mint_token().unwrap();
        let submission = Submission::new().with_form_token(token);

        assert_eq!(
            screen.screen(&submission).await,
            Verdict::Rejected(RejectReason::CaptchaFailed)
        );
    }

    #[tokio::test]
    async fn test_challenge_unreachable_rejected() {
        let screen = screen_with(ChallengeOutcome::Unreachable);
        let token = screen.mint_token().unwrap();
        let submission = Submission::new().with_form_token(token);

        assert_eq!(
            screen.screen(&submission).await,
            Verdict::Rejected(RejectReason::CaptchaUnreachable)
        );
    }

    #[tokio::test]
    async fn test_disabled_signer_accepts_without_token() {
        let screen = SubmissionScreen::new(
            TokenSigner::from_config(&formgate_common::SecurityConfig::disabled()),
            Arc::new(MemoryNonceStore::new()),
            Arc::new(NoopChallengeVerifier),
        );
        let submission = Submission::new().with_field("message", "hello");

        assert!(screen.mint_token().is_none());
        assert!(screen.screen(&submission).await.is_accepted());
    }

    #[tokio::test]
    async fn test_heuristic_still_applies_when_signer_disabled() {
        let screen = SubmissionScreen::new(
            TokenSigner::from_config(&formgate_common::SecurityConfig::disabled()),
            Arc::new(MemoryNonceStore::new()),
            Arc::new(NoopChallengeVerifier),
        );
        let submission = Submission::new().with_field("message", "buy at www.spam.example");

        assert_eq!(
            screen.screen(&submission).await,
            Verdict::Rejected(RejectReason::SuspiciousContent)
        );
    }

    #[test]
    fn test_user_messages_are_generic() {
        // Token/Nonce/内容类失败共用同一条文案，CAPTCHA 类共用另一条；
        // 任何一条都不点名具体检查项
        let retry = RejectReason::MalformedToken.user_message();
        assert_eq!(RejectReason::BadSignature.user_message(), retry);
        assert_eq!(RejectReason::ReplayedNonce.user_message(), retry);
        assert_eq!(RejectReason::ExpiredToken.user_message(), retry);
        assert_eq!(RejectReason::SuspiciousContent.user_message(), retry);

        let verify = RejectReason::CaptchaFailed.user_message();
        assert_eq!(RejectReason::CaptchaUnreachable.user_message(), verify);
        assert_ne!(retry, verify);

        assert_eq!(Verdict::Accepted { flags: vec![] }.user_message(), None);
    }
}
