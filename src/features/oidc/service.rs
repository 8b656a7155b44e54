use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use rand::{distributions::Alphanumeric, Rng};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::cache::Cache;
use crate::config::Config;
use crate::error::ApiError;
use crate::features::auth::jwt::TokenService;
use crate::features::auth::models::{User, AUTH_PROVIDER_LOCAL, AUTH_PROVIDER_OIDC};
use crate::features::oidc::models::{
    IdTokenClaims, Jwks, ProviderMetadata, StateData, TokenExchangeResponse,
};

pub const OIDC_STATE_TTL_SECS: u64 = 300;
const STATE_TOKEN_LENGTH: usize = 43;
pub const OIDC_SCOPES: &str = "openid email profile";

/// OIDC authorization-code client. Provider metadata and the JWKS document
/// are fetched lazily and memoized for the process lifetime.
#[derive(Clone)]
pub struct OidcService {
    http: reqwest::Client,
    config: Config,
    cache: Cache,
    tokens: TokenService,
    metadata: Arc<OnceCell<ProviderMetadata>>,
    jwks: Arc<OnceCell<Jwks>>,
}

impl OidcService {
    pub fn new(config: Config, cache: Cache, tokens: TokenService) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            cache,
            tokens,
            metadata: Arc::new(OnceCell::new()),
            jwks: Arc::new(OnceCell::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.oidc_configured()
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    fn client_id(&self) -> Result<&str, ApiError> {
        self.config
            .oidc_client_id
            .as_deref()
            .ok_or(ApiError::NotConfigured("OIDC"))
    }

    fn client_secret(&self) -> Result<&str, ApiError> {
        self.config
            .oidc_client_secret
            .as_deref()
            .ok_or(ApiError::NotConfigured("OIDC"))
    }

    fn redirect_uri(&self) -> Result<&str, ApiError> {
        self.config
            .oidc_redirect_uri
            .as_deref()
            .ok_or(ApiError::NotConfigured("OIDC"))
    }

    fn issuer_url(&self) -> Result<&str, ApiError> {
        self.config
            .oidc_issuer_url
            .as_deref()
            .ok_or(ApiError::NotConfigured("OIDC"))
    }

    pub fn random_token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    pub async fn provider_metadata(&self) -> Result<&ProviderMetadata, ApiError> {
        let issuer = self.issuer_url()?.trim_end_matches('/').to_string();
        let http = self.http.clone();
        self.metadata
            .get_or_try_init(|| async move {
                let url = format!("{issuer}/.well-known/openid-configuration");
                let response = http
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| ApiError::OidcUpstream(e.to_string()))?
                    .error_for_status()
                    .map_err(|e| ApiError::OidcUpstream(e.to_string()))?;
                response
                    .json::<ProviderMetadata>()
                    .await
                    .map_err(|e| ApiError::OidcUpstream(e.to_string()))
            })
            .await
    }

    async fn jwks(&self) -> Result<&Jwks, ApiError> {
        let jwks_uri = self.provider_metadata().await?.jwks_uri.clone();
        let http = self.http.clone();
        self.jwks
            .get_or_try_init(|| async move {
                let response = http
                    .get(&jwks_uri)
                    .send()
                    .await
                    .map_err(|e| ApiError::OidcUpstream(e.to_string()))?
                    .error_for_status()
                    .map_err(|e| ApiError::OidcUpstream(e.to_string()))?;
                response
                    .json::<Jwks>()
                    .await
                    .map_err(|e| ApiError::OidcUpstream(e.to_string()))
            })
            .await
    }

    fn state_key(state: &str) -> String {
        format!("oidc:state:{state}")
    }

    pub async fn store_state(&self, state: &str, nonce: &str) {
        self.cache
            .set_json(
                &Self::state_key(state),
                &StateData {
                    nonce: nonce.to_string(),
                },
                Some(OIDC_STATE_TTL_SECS),
            )
            .await;
    }

    /// Consume-on-read: a state value authorizes exactly one callback.
    pub async fn take_state(&self, state: &str) -> Option<StateData> {
        let key = Self::state_key(state);
        let data = self.cache.get_json::<StateData>(&key).await?;
        self.cache.delete(&key).await;
        Some(data)
    }

    pub async fn authorization_url(&self, state: &str, nonce: &str) -> Result<String, ApiError> {
        let metadata = self.provider_metadata().await?;
        let mut url = url::Url::parse(&metadata.authorization_endpoint)
            .map_err(|e| ApiError::OidcUpstream(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("client_id", self.client_id()?)
            .append_pair("redirect_uri", self.redirect_uri()?)
            .append_pair("response_type", "code")
            .append_pair("scope", OIDC_SCOPES)
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        Ok(url.to_string())
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenExchangeResponse, ApiError> {
        let token_endpoint = self.provider_metadata().await?.token_endpoint.clone();
        let response = self
            .http
            .post(&token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri()?),
                ("client_id", self.client_id()?),
                ("client_secret", self.client_secret()?),
            ])
            .send()
            .await
            .map_err(|e| ApiError::OidcUpstream(e.to_string()))?
            .error_for_status()
            .map_err(|e| ApiError::OidcUpstream(e.to_string()))?;

        response
            .json::<TokenExchangeResponse>()
            .await
            .map_err(|e| ApiError::OidcUpstream(e.to_string()))
    }

    /// Verify the ID token against the issuer's JWKS: signature, `aud`,
    /// `iss`, `exp`, then the nonce bound to the login attempt.
    pub async fn verify_id_token(
        &self,
        id_token: &str,
        expected_nonce: &str,
    ) -> Result<IdTokenClaims, ApiError> {
        let header =
            decode_header(id_token).map_err(|e| ApiError::OidcUpstream(e.to_string()))?;

        let jwks = self.jwks().await?;
        let jwk = match &header.kid {
            Some(kid) => jwks
                .keys
                .iter()
                .find(|key| key.kid.as_deref() == Some(kid.as_str())),
            None => jwks.keys.first(),
        }
        .ok_or_else(|| ApiError::OidcUpstream("no matching key in JWKS".to_string()))?;

        let (n, e) = match (&jwk.n, &jwk.e) {
            (Some(n), Some(e)) => (n, e),
            _ => {
                return Err(ApiError::OidcUpstream(
                    "JWKS key is missing RSA components".to_string(),
                ))
            }
        };
        let key = DecodingKey::from_rsa_components(n, e)
            .map_err(|e| ApiError::OidcUpstream(e.to_string()))?;

        let issuer = self.provider_metadata().await?.issuer.clone();
        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[self.client_id()?]);
        validation.set_issuer(&[issuer]);

        let claims = decode::<IdTokenClaims>(id_token, &key, &validation)
            .map_err(|e| ApiError::OidcUpstream(format!("ID token validation failed: {e}")))?
            .claims;

        if claims.nonce.as_deref() != Some(expected_nonce) {
            return Err(ApiError::OidcUpstream(
                "Invalid nonce in ID token".to_string(),
            ));
        }

        Ok(claims)
    }

    /// Account resolution: an existing federated identity wins; a local
    /// account with the same email is linked; an email already bound to a
    /// different federated identity is a conflict; otherwise a fresh account
    /// is created under a generated unique username.
    pub async fn resolve_user(
        &self,
        pool: &PgPool,
        claims: &IdTokenClaims,
    ) -> Result<User, ApiError> {
        let email = claims.email.as_deref().ok_or_else(|| {
            ApiError::Domain("OIDC provider did not return email address".to_string())
        })?;

        let existing = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE oidc_subject = $1 AND oidc_issuer = $2",
        )
        .bind(&claims.sub)
        .bind(&claims.iss)
        .fetch_optional(pool)
        .await?;
        if let Some(user) = existing {
            return Ok(user);
        }

        let by_email = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(pool)
            .await?;

        if let Some(user) = by_email {
            if user.auth_provider == AUTH_PROVIDER_LOCAL {
                // Linking hands the account to the provider entirely; only
                // local accounts carry a password hash.
                let linked = sqlx::query_as::<_, User>(
                    r#"
                    UPDATE users
                    SET oidc_subject = $1, oidc_issuer = $2, auth_provider = $3,
                        password_hash = NULL, is_verified = TRUE, updated_at = now()
                    WHERE id = $4
                    RETURNING *
                    "#,
                )
                .bind(&claims.sub)
                .bind(&claims.iss)
                .bind(AUTH_PROVIDER_OIDC)
                .bind(user.id)
                .fetch_one(pool)
                .await?;
                tracing::info!(user_id = %linked.id, "linked local account to OIDC identity");
                return Ok(linked);
            }
            return Err(ApiError::Domain(
                "Email already associated with another account".to_string(),
            ));
        }

        let base_username = generate_username(claims, email);
        let mut username = base_username.clone();
        let mut counter = 1;
        loop {
            let taken = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)",
            )
            .bind(&username)
            .fetch_one(pool)
            .await?;
            if !taken {
                break;
            }
            username = format!("{base_username}{counter}");
            counter += 1;
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                id, email, username, password_hash, auth_provider,
                oidc_subject, oidc_issuer, is_active, is_verified
            ) VALUES ($1, $2, $3, NULL, $4, $5, $6, TRUE, TRUE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(&username)
        .bind(AUTH_PROVIDER_OIDC)
        .bind(&claims.sub)
        .bind(&claims.iss)
        .fetch_one(pool)
        .await?;

        tracing::info!(user_id = %user.id, username = %user.username, "created user from OIDC identity");
        Ok(user)
    }
}

/// Username preference order: preferred_username, name, given+family name,
/// email prefix. Spaces and dots collapse to underscores.
pub fn generate_username(claims: &IdTokenClaims, email: &str) -> String {
    if let Some(preferred) = claims.preferred_username.as_deref() {
        if !preferred.is_empty() {
            return preferred.to_lowercase().replace(' ', "_");
        }
    }
    if let Some(name) = claims.name.as_deref() {
        if !name.is_empty() {
            return name.to_lowercase().replace(' ', "_");
        }
    }
    if let Some(given) = claims.given_name.as_deref() {
        if !given.is_empty() {
            let mut username = given.to_lowercase();
            if let Some(family) = claims.family_name.as_deref() {
                if !family.is_empty() {
                    username.push('_');
                    username.push_str(&family.to_lowercase());
                }
            }
            return username.replace(' ', "_");
        }
    }
    email
        .split('@')
        .next()
        .unwrap_or("user")
        .to_lowercase()
        .replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(
        preferred_username: Option<&str>,
        name: Option<&str>,
        given_name: Option<&str>,
        family_name: Option<&str>,
    ) -> IdTokenClaims {
        IdTokenClaims {
            sub: "subject".to_string(),
            iss: "https://idp.example.com".to_string(),
            email: Some("jane.doe@example.com".to_string()),
            email_verified: Some(true),
            name: name.map(String::from),
            preferred_username: preferred_username.map(String::from),
            given_name: given_name.map(String::from),
            family_name: family_name.map(String::from),
            nonce: None,
        }
    }

    #[test]
    fn preferred_username_wins() {
        let claims = claims(Some("Jane Doe"), Some("Other Name"), None, None);
        assert_eq!(generate_username(&claims, "jane.doe@example.com"), "jane_doe");
    }

    #[test]
    fn name_then_given_family_then_email_prefix() {
        let by_name = claims(None, Some("Jane Doe"), None, None);
        assert_eq!(generate_username(&by_name, "jane.doe@example.com"), "jane_doe");

        let by_given = claims(None, None, Some("Jane"), Some("Doe"));
        assert_eq!(generate_username(&by_given, "jane.doe@example.com"), "jane_doe");

        let by_email = claims(None, None, None, None);
        assert_eq!(
            generate_username(&by_email, "jane.doe@example.com"),
            "jane_doe"
        );
    }

    #[test]
    fn state_tokens_are_url_safe() {
        let token = OidcService::random_token();
        assert_eq!(token.len(), STATE_TOKEN_LENGTH);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
