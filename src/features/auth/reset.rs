use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::Cache;

pub const RESET_TOKEN_TTL_SECS: u64 = 30 * 60;
const RESET_TOKEN_LENGTH: usize = 48;

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetTokenData {
    pub user_id: Uuid,
    pub email: String,
    pub issued_at: DateTime<Utc>,
}

/// One-time password-reset tokens, held only in the cache. At most one token
/// is live per user: issuing a new one deletes the previous entry.
#[derive(Clone)]
pub struct PasswordResetService {
    cache: Cache,
}

impl PasswordResetService {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    fn token_key(token: &str) -> String {
        format!("pwreset:{token}")
    }

    fn user_key(user_id: Uuid) -> String {
        format!("pwreset-user:{user_id}")
    }

    pub fn generate_token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RESET_TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    pub async fn create_token(&self, user_id: Uuid, email: &str) -> String {
        if let Some(previous) = self.cache.get(&Self::user_key(user_id)).await {
            self.cache.delete(&Self::token_key(&previous)).await;
        }

        let token = Self::generate_token();
        let data = ResetTokenData {
            user_id,
            email: email.to_string(),
            issued_at: Utc::now(),
        };
        self.cache
            .set_json(&Self::token_key(&token), &data, Some(RESET_TOKEN_TTL_SECS))
            .await;
        self.cache
            .set(&Self::user_key(user_id), &token, Some(RESET_TOKEN_TTL_SECS))
            .await;

        token
    }

    pub async fn lookup(&self, token: &str) -> Option<ResetTokenData> {
        self.cache.get_json(&Self::token_key(token)).await
    }

    /// Single-use consumption: removes both the token entry and the per-user
    /// pointer.
    pub async fn consume(&self, token: &str, user_id: Uuid) {
        self.cache.delete(&Self::token_key(token)).await;
        self.cache.delete(&Self::user_key(user_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_long_url_safe_and_distinct() {
        let first = PasswordResetService::generate_token();
        let second = PasswordResetService::generate_token();

        assert_eq!(first.len(), RESET_TOKEN_LENGTH);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(first, second);
    }
}
