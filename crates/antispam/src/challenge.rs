//! 外部挑战校验的协作方契约
//!
//! CAPTCHA 校验是流水线里唯一会阻塞在网络 I/O 上的一步，因此以 async trait
//! 注入。实现方对所有失败模式负责归一化：任何网络错误、超时、畸形响应
//! 都必须折叠进 [`ChallengeOutcome`]，永不向调用方抛错。

use async_trait::async_trait;

/// 挑战校验结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// 未配置挑战服务，校验未执行（fail-open 模式）
    Skipped,
    /// 服务确认通过
    Passed,
    /// 服务明确判定失败（success=false 或客户端未提交响应）
    Failed,
    /// 服务不可达：网络错误、超时、非成功状态码、畸形响应体
    Unreachable,
}

impl ChallengeOutcome {
    /// 折叠为布尔结果：Skipped/Passed 视为通过
    pub fn as_bool(self) -> bool {
        matches!(self, ChallengeOutcome::Skipped | ChallengeOutcome::Passed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChallengeOutcome::Skipped => "skipped",
            ChallengeOutcome::Passed => "passed",
            ChallengeOutcome::Failed => "failed",
            ChallengeOutcome::Unreachable => "unreachable",
        }
    }
}

/// 外部挑战校验器
#[async_trait]
pub trait ChallengeVerifier: Send + Sync {
    /// 校验客户端提交的挑战响应
    ///
    /// `remote_ip` 是可选的参考值（见 `formgate_common::ip`），
    /// 实现可将其作为提示传给挑战服务
    async fn verify(&self, response: Option<&str>, remote_ip: Option<&str>) -> ChallengeOutcome;
}

/// 永远跳过校验的实现（未启用 CAPTCHA 的部署和测试）
pub struct NoopChallengeVerifier;

#[async_trait]
impl ChallengeVerifier for NoopChallengeVerifier {
    async fn verify(&self, _response: Option<&str>, _remote_ip: Option<&str>) -> ChallengeOutcome {
        ChallengeOutcome::Skipped
    }
}
