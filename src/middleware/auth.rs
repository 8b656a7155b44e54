use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::error::ApiError;
use crate::features::auth::jwt::ACCESS_TOKEN_TYPE;
use crate::features::auth::models::User;
use crate::features::auth::routes::ACCESS_TOKEN_COOKIE;
use crate::state::AppState;

/// The authenticated principal, inserted as a request extension by
/// `auth_middleware`.
#[derive(Clone)]
pub struct CurrentUser(pub User);

fn bearer_token(cookies: &Cookies, request: &Request) -> Option<String> {
    // Browser clients carry the token in an HTTP-only cookie; API clients
    // fall back to the Authorization header.
    if let Some(cookie) = cookies.get(ACCESS_TOKEN_COOKIE) {
        return Some(cookie.value().to_string());
    }
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

/// Resolve the principal for a request: extract the bearer credential,
/// validate it as an access token, load the user, and reject inactive
/// accounts.
pub async fn resolve_user(
    state: &AppState,
    cookies: &Cookies,
    request: &Request,
) -> Result<User, ApiError> {
    let token = bearer_token(cookies, request)
        .ok_or_else(|| ApiError::InvalidCredentials("Not authenticated".to_string()))?;

    let claims = state.auth.tokens().decode_typed(&token, ACCESS_TOKEN_TYPE)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| ApiError::InvalidCredentials("Invalid token payload".to_string()))?;

    let user = state
        .auth
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::InvalidCredentials("User not found".to_string()))?;

    if !user.is_active {
        return Err(ApiError::Forbidden("Inactive user".to_string()));
    }

    Ok(user)
}

/// Non-failing variant of the gate: yields the principal when the request
/// carries a valid credential for an active user, None otherwise.
pub async fn authenticate(
    state: &AppState,
    cookies: &Cookies,
    request: &Request,
) -> Option<User> {
    resolve_user(state, cookies, request).await.ok()
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = resolve_user(&state, &cookies, &request).await?;
    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}
