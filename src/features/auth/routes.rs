use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use std::net::SocketAddr;
use tower_cookies::{Cookie, Cookies};
use validator::Validate;

use crate::config::Config;
use crate::error::ApiError;
use crate::features::auth::models::{
    LoginRequest, MessageResponse, PasswordChangeRequest, PasswordResetConfirmRequest,
    PasswordResetRequest, RefreshTokenRequest, RegisterRequest, TokenPair, TokenResponse,
    UserResponse,
};
use crate::features::rate_limit::{
    client_identifier, LOGIN_PROFILE, PASSWORD_RESET_PROFILE, REGISTER_PROFILE,
};
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// The refresh cookie is scoped to the auth router so it never travels with
/// ordinary API calls.
const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";

pub fn public_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/refresh", post(refresh_handler))
        .route("/password/reset", post(password_reset_request_handler))
        .route("/password/reset/confirm", post(password_reset_confirm_handler))
}

pub fn protected_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout_handler))
        .route("/me", get(me_handler))
        .route("/change-password", post(change_password_handler))
}

pub(crate) fn set_auth_cookies(cookies: &Cookies, config: &Config, pair: &TokenPair) {
    let mut access = Cookie::build((ACCESS_TOKEN_COOKIE, pair.access_token.clone()))
        .http_only(true)
        .path("/")
        .secure(config.cookie_secure)
        .same_site(config.cookie_samesite())
        .max_age(tower_cookies::cookie::time::Duration::seconds(
            config.access_token_expiry_secs(),
        ));
    if let Some(domain) = &config.cookie_domain {
        access = access.domain(domain.clone());
    }
    cookies.add(access.build());

    let mut refresh = Cookie::build((REFRESH_TOKEN_COOKIE, pair.refresh_token.clone()))
        .http_only(true)
        .path(REFRESH_COOKIE_PATH)
        .secure(config.cookie_secure)
        .same_site(config.cookie_samesite())
        .max_age(tower_cookies::cookie::time::Duration::seconds(
            config.refresh_token_expiry_secs(),
        ));
    if let Some(domain) = &config.cookie_domain {
        refresh = refresh.domain(domain.clone());
    }
    cookies.add(refresh.build());
}

fn clear_auth_cookies(cookies: &Cookies, config: &Config) {
    let mut access = Cookie::new(ACCESS_TOKEN_COOKIE, "");
    access.set_path("/");
    access.set_max_age(tower_cookies::cookie::time::Duration::seconds(0));
    if let Some(domain) = &config.cookie_domain {
        access.set_domain(domain.clone());
    }
    cookies.add(access);

    let mut refresh = Cookie::new(REFRESH_TOKEN_COOKIE, "");
    refresh.set_path(REFRESH_COOKIE_PATH);
    refresh.set_max_age(tower_cookies::cookie::time::Duration::seconds(0));
    if let Some(domain) = &config.cookie_domain {
        refresh.set_domain(domain.clone());
    }
    cookies.add(refresh);
}

async fn register_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let identifier = client_identifier(&headers, peer.map(|ConnectInfo(addr)| addr));
    state
        .rate_limits
        .check(&identifier, REGISTER_PROFILE)
        .await
        .map_err(ApiError::RateLimited)?;

    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let user = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn login_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    cookies: Cookies,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let identifier = client_identifier(&headers, peer.map(|ConnectInfo(addr)| addr));
    state
        .rate_limits
        .check(&identifier, LOGIN_PROFILE)
        .await
        .map_err(ApiError::RateLimited)?;

    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let (_user, pair) = state.auth.login(request).await?;

    state
        .rate_limits
        .reset(&identifier, LOGIN_PROFILE.action)
        .await;

    set_auth_cookies(&cookies, &state.config, &pair);
    Ok(Json(pair.into()))
}

async fn refresh_handler(
    State(state): State<AppState>,
    cookies: Cookies,
    body: Option<Json<RefreshTokenRequest>>,
) -> Result<Json<TokenResponse>, ApiError> {
    let refresh_token = cookies
        .get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or(body.map(|Json(request)| request.refresh_token))
        .ok_or_else(|| ApiError::InvalidCredentials("No refresh token provided".to_string()))?;

    let (_user, pair) = state.auth.refresh(&refresh_token).await?;

    set_auth_cookies(&cookies, &state.config, &pair);
    Ok(Json(pair.into()))
}

async fn logout_handler(
    State(state): State<AppState>,
    cookies: Cookies,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.auth.logout(user.id).await;
    clear_auth_cookies(&cookies, &state.config);
    Ok(Json(MessageResponse::new("Successfully logged out")))
}

async fn me_handler(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<UserResponse> {
    Json(user.into())
}

async fn change_password_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<PasswordChangeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    state
        .auth
        .change_password(&user, &request.current_password, &request.new_password)
        .await?;

    Ok(Json(MessageResponse::new("Password changed successfully")))
}

async fn password_reset_request_handler(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<PasswordResetRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let identifier = client_identifier(&headers, peer.map(|ConnectInfo(addr)| addr));
    state
        .rate_limits
        .check(&identifier, PASSWORD_RESET_PROFILE)
        .await
        .map_err(ApiError::RateLimited)?;

    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    state.auth.request_password_reset(&request.email).await?;

    // The response is identical whether or not the account exists.
    Ok(Json(MessageResponse::new(
        "If the email exists, a password reset link has been sent",
    )))
}

async fn password_reset_confirm_handler(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetConfirmRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    state
        .auth
        .confirm_password_reset(&request.token, &request.new_password)
        .await?;

    Ok(Json(MessageResponse::new(
        "Password has been reset successfully",
    )))
}
