//! 客户端 IP 提取
//!
//! 从反向代理转发头中尽力提取客户端 IP。该值仅作参考（转发头可被客户端伪造），
//! 只能用于粗粒度限流键或 CAPTCHA 校验的 remoteip 提示，不得用于安全决策。

/// 按名称查询请求头的最小抽象
///
/// 嵌入方为自己框架的 header map 实现该 trait 即可接入；名称匹配不区分大小写
pub trait HeaderLookup {
    fn header(&self, name: &str) -> Option<&str>;
}

impl HeaderLookup for std::collections::HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.get(name) {
            return Some(value.as_str());
        }
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// 提取客户端 IP
///
/// 优先取 `x-forwarded-for` 的第一个逗号分隔项（反向代理约定中的原始客户端），
/// 去除首尾空白；否则回退到 `x-real-ip`。两者都缺失或为空白时返回 None。
/// 永不 panic。
pub fn client_ip<H: HeaderLookup + ?Sized>(headers: &H) -> Option<String> {
    if let Some(forwarded) = headers.header("x-forwarded-for") {
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }

    headers
        .header("x-real-ip")
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}
