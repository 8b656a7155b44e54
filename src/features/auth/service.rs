use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ApiError;
use crate::features::auth::jwt::{TokenService, REFRESH_TOKEN_TYPE};
use crate::features::auth::models::{
    LoginRequest, RegisterRequest, TokenPair, User, AUTH_PROVIDER_LOCAL,
};
use crate::features::auth::password::{hash_password, needs_rehash, verify_password};
use crate::features::auth::reset::PasswordResetService;
use crate::utils::email;

#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    tokens: TokenService,
    reset: PasswordResetService,
}

impl AuthService {
    pub fn new(pool: PgPool, tokens: TokenService, reset: PasswordResetService) -> Self {
        Self {
            pool,
            tokens,
            reset,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<User, ApiError> {
        let email_taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)",
        )
        .bind(&request.email)
        .fetch_one(&self.pool)
        .await?;
        if email_taken {
            return Err(ApiError::Domain("Email already registered".to_string()));
        }

        let username_taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)",
        )
        .bind(&request.username)
        .fetch_one(&self.pool)
        .await?;
        if username_taken {
            return Err(ApiError::Domain("Username already taken".to_string()));
        }

        let password_hash = hash_password(&request.password)?;
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, username, password_hash, auth_provider, is_active, is_verified)
            VALUES ($1, $2, $3, $4, $5, TRUE, FALSE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.email)
        .bind(&request.username)
        .bind(&password_hash)
        .bind(AUTH_PROVIDER_LOCAL)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = %user.id, email = %user.email, "user registered");
        Ok(user)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<(User, TokenPair), ApiError> {
        let user = self
            .find_by_email(&request.email)
            .await?
            .ok_or_else(ApiError::invalid_credentials)?;

        if !user.is_active {
            return Err(ApiError::Forbidden("Account is deactivated".to_string()));
        }

        let password_hash = user
            .password_hash
            .as_deref()
            .ok_or_else(|| ApiError::Domain("Please use SSO to login".to_string()))?;

        if !verify_password(&request.password, password_hash) {
            return Err(ApiError::invalid_credentials());
        }

        // Transparent cost upgrade for hashes created under an older target.
        if needs_rehash(password_hash) {
            let upgraded = hash_password(&request.password)?;
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
                .bind(&upgraded)
                .bind(user.id)
                .execute(&self.pool)
                .await?;
        }

        sqlx::query("UPDATE users SET last_login_at = $1, updated_at = now() WHERE id = $2")
            .bind(Utc::now())
            .bind(user.id)
            .execute(&self.pool)
            .await?;

        let pair = self.tokens.issue_pair(user.id)?;
        self.tokens
            .store_refresh_token(user.id, &pair.refresh_token)
            .await;

        tracing::info!(user_id = %user.id, "user logged in");
        Ok((user, pair))
    }

    /// Rotate a refresh token: the presented token must decode, be of refresh
    /// type, and match the currently bound token. On success a fresh pair is
    /// issued and the binding is replaced, revoking the presented token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<(User, TokenPair), ApiError> {
        let claims = self.tokens.decode_typed(refresh_token, REFRESH_TOKEN_TYPE)?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ApiError::InvalidCredentials("Invalid token payload".to_string()))?;

        if !self.tokens.validate_refresh_token(user_id, refresh_token).await {
            return Err(ApiError::TokenRevoked);
        }

        let user = self.find_by_id(user_id).await?.filter(|u| u.is_active).ok_or_else(|| {
            ApiError::InvalidCredentials("User not found or inactive".to_string())
        })?;

        let pair = self.tokens.issue_pair(user.id)?;
        self.tokens
            .store_refresh_token(user.id, &pair.refresh_token)
            .await;

        Ok((user, pair))
    }

    pub async fn logout(&self, user_id: Uuid) {
        self.tokens.invalidate_refresh_token(user_id).await;
        tracing::info!(user_id = %user_id, "user logged out");
    }

    pub async fn change_password(
        &self,
        user: &User,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let password_hash = user.password_hash.as_deref().ok_or_else(|| {
            ApiError::Domain("Cannot change password for SSO users".to_string())
        })?;

        if !verify_password(current_password, password_hash) {
            return Err(ApiError::Domain("Current password is incorrect".to_string()));
        }

        let new_hash = hash_password(new_password)?;
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
            .bind(&new_hash)
            .bind(user.id)
            .execute(&self.pool)
            .await?;

        // Force re-login everywhere.
        self.tokens.invalidate_refresh_token(user.id).await;

        tracing::info!(user_id = %user.id, "password changed");
        Ok(())
    }

    /// Issues a reset token when the email belongs to an active local
    /// account. Always returns Ok so the caller cannot learn whether the
    /// email exists.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ApiError> {
        let user = match self.find_by_email(email).await? {
            Some(user) if user.is_active && user.password_hash.is_some() => user,
            _ => return Ok(()),
        };

        let token = self.reset.create_token(user.id, &user.email).await;
        let _ = email::send_password_reset_email(&user.email, &user.username, &token);

        tracing::info!(user_id = %user.id, "password reset requested");
        Ok(())
    }

    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let data = self
            .reset
            .lookup(token)
            .await
            .ok_or_else(|| ApiError::Domain("Invalid or expired reset token".to_string()))?;

        let user = self
            .find_by_id(data.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ApiError::Domain("User not found or inactive".to_string()))?;

        let new_hash = hash_password(new_password)?;
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
            .bind(&new_hash)
            .bind(user.id)
            .execute(&self.pool)
            .await?;

        self.reset.consume(token, user.id).await;
        self.tokens.invalidate_refresh_token(user.id).await;

        tracing::info!(user_id = %user.id, "password reset completed");
        Ok(())
    }
}
