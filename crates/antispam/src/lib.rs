//! 表单反垃圾核心库
//!
//! 提供联系表单提交的防护能力：
//! - 防篡改、带时间戳的 HMAC 签名表单 Token（`token`）
//! - 一次性 Nonce 存储，拒绝重放提交（`nonce`）
//! - 自由文本字段的 URL 内容启发式检查（`heuristic`）
//! - 外部 CAPTCHA 校验的协作方契约（`challenge`）
//! - 按序执行各项检查并产出接受/拒绝裁决的筛查流水线（`pipeline`）
//!
//! 所有预期内的失败（拒绝裁决、校验不通过）都是返回值而非异常；
//! 用户可见的拒绝文案是通用措辞，不泄露具体失败的检查项。

pub mod challenge;
pub mod heuristic;
pub mod nonce;
pub mod pipeline;
pub mod token;

// Re-export commonly used types for convenience
pub use challenge::{ChallengeOutcome, ChallengeVerifier, NoopChallengeVerifier};
pub use heuristic::looks_like_url;
pub use nonce::{MemoryNonceStore, NonceStore, DEFAULT_MAX_TRACKED_NONCES};
pub use pipeline::{
    ContentPolicy, RejectReason, ScreenPolicy, Submission, SubmissionScreen, Verdict,
};
pub use token::{
    generate_form_secret, TokenPayload, TokenRejection, TokenSigner, TokenVerification,
    VerifiedToken, MAX_TOKEN_LEN,
};
