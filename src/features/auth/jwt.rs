use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{user_cache_key, Cache};
use crate::config::Config;
use crate::error::ApiError;
use crate::features::auth::models::TokenPair;

pub const ACCESS_TOKEN_TYPE: &str = "access";
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

/// Issues and validates the HS256 token pair and owns the server-side
/// refresh binding: the cache names the single refresh token currently live
/// for each user, and rotation replaces it.
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    access_expiry_secs: i64,
    refresh_expiry_secs: i64,
    cache: Cache,
}

impl TokenService {
    pub fn new(config: &Config, cache: Cache) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            access_expiry_secs: config.access_token_expiry_secs(),
            refresh_expiry_secs: config.refresh_token_expiry_secs(),
            cache,
        }
    }

    fn issue(&self, user_id: Uuid, token_type: &str, expiry_secs: i64) -> Result<String, ApiError> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: user_id.to_string(),
            exp: (now + Duration::seconds(expiry_secs)).timestamp(),
            iat: now.timestamp(),
            token_type: token_type.to_string(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::Token(e.to_string()))
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String, ApiError> {
        self.issue(user_id, ACCESS_TOKEN_TYPE, self.access_expiry_secs)
    }

    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<String, ApiError> {
        self.issue(user_id, REFRESH_TOKEN_TYPE, self.refresh_expiry_secs)
    }

    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, ApiError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user_id)?,
            refresh_token: self.issue_refresh_token(user_id)?,
            expires_in: self.access_expiry_secs,
        })
    }

    pub fn decode(&self, token: &str) -> Result<TokenClaims, ApiError> {
        decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| ApiError::InvalidCredentials("Invalid token".to_string()))
    }

    /// Decode and require a specific token type; an access token presented
    /// where a refresh token is expected (or vice versa) is rejected.
    pub fn decode_typed(&self, token: &str, expected_type: &str) -> Result<TokenClaims, ApiError> {
        let claims = self.decode(token)?;
        if claims.token_type != expected_type {
            return Err(ApiError::InvalidCredentials("Invalid token type".to_string()));
        }
        Ok(claims)
    }

    pub async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> bool {
        self.cache
            .set(
                &user_cache_key(&user_id.to_string(), "refresh_token"),
                token,
                Some(self.refresh_expiry_secs as u64),
            )
            .await
    }

    pub async fn validate_refresh_token(&self, user_id: Uuid, token: &str) -> bool {
        match self
            .cache
            .get(&user_cache_key(&user_id.to_string(), "refresh_token"))
            .await
        {
            Some(stored) => stored == token,
            None => false,
        }
    }

    /// Drops the binding, invalidating every outstanding refresh token for
    /// the user at once.
    pub async fn invalidate_refresh_token(&self, user_id: Uuid) -> bool {
        self.cache
            .delete(&user_cache_key(&user_id.to_string(), "refresh_token"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_service() -> TokenService {
        TokenService {
            secret: "0123456789abcdef0123456789abcdef".to_string(),
            access_expiry_secs: 1800,
            refresh_expiry_secs: 604_800,
            cache: Cache::disabled(),
        }
    }

    #[test]
    fn access_token_round_trip() {
        let service = test_service();
        let user_id = Uuid::new_v4();

        let token = service.issue_access_token(user_id).unwrap();
        let claims = service.decode_typed(&token, ACCESS_TOKEN_TYPE).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.token_type, ACCESS_TOKEN_TYPE);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn refresh_token_round_trip() {
        let service = test_service();
        let user_id = Uuid::new_v4();

        let token = service.issue_refresh_token(user_id).unwrap();
        let claims = service.decode_typed(&token, REFRESH_TOKEN_TYPE).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.token_type, REFRESH_TOKEN_TYPE);
    }

    #[test]
    fn wrong_token_type_is_rejected() {
        let service = test_service();
        let user_id = Uuid::new_v4();

        let access = service.issue_access_token(user_id).unwrap();
        assert!(service.decode_typed(&access, REFRESH_TOKEN_TYPE).is_err());

        let refresh = service.issue_refresh_token(user_id).unwrap();
        assert!(service.decode_typed(&refresh, ACCESS_TOKEN_TYPE).is_err());
    }

    #[test]
    fn expired_and_garbage_tokens_are_rejected() {
        let service = test_service();
        let user_id = Uuid::new_v4();

        // Past the decoder's leeway window.
        let expired = service.issue(user_id, ACCESS_TOKEN_TYPE, -120).unwrap();
        assert!(service.decode(&expired).is_err());

        assert!(service.decode("not.a.token").is_err());
        assert!(service.decode("").is_err());
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let service = test_service();
        let other = TokenService {
            secret: "ffffffffffffffffffffffffffffffff".to_string(),
            ..test_service()
        };

        let token = service.issue_access_token(Uuid::new_v4()).unwrap();
        assert!(other.decode(&token).is_err());
    }
}
