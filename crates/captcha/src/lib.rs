//! CAPTCHA 校验适配器
//!
//! 实现 `antispam::ChallengeVerifier`：向第三方挑战服务的 siteverify 端点
//! 发送带超时的表单编码 POST，并把所有失败模式归一化为校验结果。
//! 未配置密钥对时一律跳过校验（显式的 fail-open，构造时记录 warn）。

mod verifier;

pub use verifier::HttpChallengeVerifier;
