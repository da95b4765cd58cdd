//! 内容启发式检查
//!
//! 低置信度信号：命中不等于垃圾，只是给调用方的一个权重输入。
//! 误报可接受（比如正文里讨论 "https://" 这个词本身）。

use once_cell::sync::Lazy;
use regex::Regex;

// 只看前缀出现与否，不校验后续内容（"www." 结尾也算命中）
static URL_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)https?://|www\.").expect("static pattern is valid"));

/// 文本是否疑似包含链接
///
/// 不区分大小写地检测 `http://`、`https://` 或 `www.`。
/// 纯函数、永不 panic。
pub fn looks_like_url(text: &str) -> bool {
    URL_LIKE.is_match(text)
}
