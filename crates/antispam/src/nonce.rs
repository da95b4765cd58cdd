//! 一次性 Nonce 存储
//!
//! 记录已消费的 Token Nonce 以拒绝重放。存储是进程级内存结构，不做持久化：
//! 进程重启会静默重置重放保护（可接受——防的是捕获 Token 后的快速自动重提，
//! 不是长期重放）。跨进程部署需要注入带原子 compare-and-set 的分布式实现。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

/// 存储条目数上限的默认值，超过后触发过期清理
pub const DEFAULT_MAX_TRACKED_NONCES: usize = 10_000;

/// 一次性消费能力
///
/// 显式注入的依赖：流水线只通过该 trait 使用 Nonce 存储，
/// 单实例部署用 [`MemoryNonceStore`]，多实例换分布式后端即可
pub trait NonceStore: Send + Sync {
    /// 尝试首次消费一个 Nonce
    ///
    /// 返回 true 表示首次使用（已登记，expiry = now + ttl）；
    /// 返回 false 表示该 Nonce 在 TTL 窗口内已被消费（重放）。
    /// 同一 Nonce 的并发消费中至多一个调用方得到 true。
    fn consume_once(&self, nonce: &str, ttl: Duration) -> bool;
}

/// 进程内 Nonce 存储
///
/// `Mutex<HashMap>` 保证查-写原子性；插入后超过条目上限时
/// 机会性地清理所有已过期条目，防止无界增长
pub struct MemoryNonceStore {
    entries: Mutex<HashMap<String, u64>>,
    max_entries: usize,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_TRACKED_NONCES)
    }

    /// 指定条目上限构造
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
        }
    }

    /// 以指定时钟消费（测试用确定性入口）
    pub fn consume_once_at(&self, nonce: &str, ttl: Duration, now_ms: u64) -> bool {
        let mut entries = self.entries.lock().expect("nonce store poisoned");

        if let Some(&expires_at) = entries.get(nonce) {
            if expires_at > now_ms {
                debug!(nonce, "nonce replay detected");
                return false;
            }
        }

        let expires_at = now_ms.saturating_add(ttl.as_millis() as u64);
        entries.insert(nonce.to_string(), expires_at);

        if entries.len() > self.max_entries {
            let before = entries.len();
            entries.retain(|_, &mut expires_at| expires_at > now_ms);
            debug!(
                removed = before - entries.len(),
                remaining = entries.len(),
                "expired nonce entries evicted"
            );
        }

        true
    }

    /// 当前跟踪的条目数（含未清理的过期条目）
    pub fn len(&self) -> usize {
        self.entries.lock().expect("nonce store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryNonceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceStore for MemoryNonceStore {
    fn consume_once(&self, nonce: &str, ttl: Duration) -> bool {
        self.consume_once_at(nonce, ttl, now_ms())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
