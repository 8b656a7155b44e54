use axum::http::HeaderMap;
use std::net::SocketAddr;

use crate::cache::Cache;

/// Fixed-window profile for one rate-limited action.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitProfile {
    pub action: &'static str,
    pub max_requests: i64,
    pub window_secs: u64,
    pub block_secs: u64,
}

pub const LOGIN_PROFILE: RateLimitProfile = RateLimitProfile {
    action: "login",
    max_requests: 5,
    window_secs: 60,
    block_secs: 300,
};

pub const REGISTER_PROFILE: RateLimitProfile = RateLimitProfile {
    action: "register",
    max_requests: 3,
    window_secs: 60,
    block_secs: 600,
};

pub const PASSWORD_RESET_PROFILE: RateLimitProfile = RateLimitProfile {
    action: "password_reset",
    max_requests: 3,
    window_secs: 60,
    block_secs: 600,
};

/// Fixed-window counter with a block-list, both kept in the cache. The
/// counter increment is atomic on a single replica only; racing callers may
/// each be allowed, which the threat model accepts.
#[derive(Clone)]
pub struct RateLimitService {
    cache: Cache,
}

impl RateLimitService {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    fn counter_key(identifier: &str, action: &str) -> String {
        format!("rate_limit:{action}:{identifier}")
    }

    fn block_key(identifier: &str, action: &str) -> String {
        format!("rate_limit_block:{action}:{identifier}")
    }

    /// Ok(remaining) when the attempt is allowed, Err(retry_after_secs) when
    /// the identifier is blocked or just exceeded the window.
    pub async fn check(
        &self,
        identifier: &str,
        profile: RateLimitProfile,
    ) -> Result<i64, u64> {
        let block_key = Self::block_key(identifier, profile.action);
        let block_ttl = self.cache.ttl(&block_key).await;
        if block_ttl > 0 {
            return Err(block_ttl as u64);
        }

        let counter_key = Self::counter_key(identifier, profile.action);
        match self.cache.get(&counter_key).await {
            None => {
                // First attempt in a fresh window.
                self.cache
                    .set(&counter_key, "1", Some(profile.window_secs))
                    .await;
                Ok(profile.max_requests - 1)
            }
            Some(raw) => {
                let count = raw.parse::<i64>().unwrap_or(0);
                if count >= profile.max_requests {
                    self.cache
                        .set(&block_key, "1", Some(profile.block_secs))
                        .await;
                    self.cache.delete(&counter_key).await;
                    Err(profile.block_secs)
                } else {
                    self.cache.increment(&counter_key, 1).await;
                    Ok(profile.max_requests - count - 1)
                }
            }
        }
    }

    /// Clears both the counter and the block. Called after a successful
    /// login so a legitimate user is not penalized for earlier typos.
    pub async fn reset(&self, identifier: &str, action: &str) {
        self.cache
            .delete(&Self::counter_key(identifier, action))
            .await;
        self.cache.delete(&Self::block_key(identifier, action)).await;
    }
}

/// Rate-limit identifier for an inbound request: the first entry of
/// `X-Forwarded-For` when present, else the direct peer address.
pub fn client_identifier(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
