//! 设备指纹计算
//!
//! 对 User-Agent、远端地址和连接时间做 SHA-256 得到稳定的设备指纹。
//! 作为显式构造、显式传递的协作对象使用，不提供全局单例。

use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use ring::digest;

/// 设备指纹计算器
#[derive(Debug, Clone, Default)]
pub struct FingerprintHasher;

impl FingerprintHasher {
    pub fn new() -> Self {
        Self
    }

    /// 计算设备指纹
    pub fn fingerprint(
        &self,
        user_agent: &str,
        remote_addr: &str,
        connected_at: DateTime<Utc>,
    ) -> String {
        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(user_agent.as_bytes());
        ctx.update(b"|");
        ctx.update(remote_addr.as_bytes());
        ctx.update(b"|");
        ctx.update(connected_at.timestamp_millis().to_be_bytes().as_ref());
        let digest = ctx.finish();
        HEXLOWER.encode(digest.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_same_inputs() {
        let hasher = FingerprintHasher::new();
        let at = Utc::now();
        let a = hasher.fingerprint("Mozilla/5.0", "10.0.0.1:443", at);
        let b = hasher.fingerprint("Mozilla/5.0", "10.0.0.1:443", at);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_differs_per_input() {
        let hasher = FingerprintHasher::new();
        let at = Utc::now();
        let a = hasher.fingerprint("Mozilla/5.0", "10.0.0.1:443", at);
        let b = hasher.fingerprint("Mozilla/5.0", "10.0.0.2:443", at);
        let c = hasher.fingerprint("curl/8.0", "10.0.0.1:443", at);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
