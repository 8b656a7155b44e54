use axum::extract::{Query, State};
use axum::http::{header::LOCATION, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::error::ApiError;
use crate::features::auth::models::TokenResponse;
use crate::features::oidc::models::CallbackParams;
use crate::features::oidc::service::OidcService;
use crate::state::AppState;

pub fn oidc_routes() -> Router<AppState> {
    Router::new()
        .route("/authorize", get(authorize_handler))
        .route("/callback", get(callback_handler))
}

async fn authorize_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    if !state.oidc.enabled() {
        return Err(ApiError::NotConfigured("OIDC authentication"));
    }

    let login_state = OidcService::random_token();
    let nonce = OidcService::random_token();
    state.oidc.store_state(&login_state, &nonce).await;

    let url = state.oidc.authorization_url(&login_state, &nonce).await?;
    let location = HeaderValue::from_str(&url)
        .map_err(|e| ApiError::OidcUpstream(e.to_string()))?;

    Ok((StatusCode::FOUND, [(LOCATION, location)]).into_response())
}

async fn callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<TokenResponse>, ApiError> {
    if !state.oidc.enabled() {
        return Err(ApiError::NotConfigured("OIDC authentication"));
    }

    let state_data = state
        .oidc
        .take_state(&params.state)
        .await
        .ok_or_else(|| ApiError::Domain("Invalid or expired state parameter".to_string()))?;

    let exchange = state.oidc.exchange_code(&params.code).await?;
    let id_token = exchange
        .id_token
        .ok_or_else(|| ApiError::OidcUpstream("No ID token in response".to_string()))?;

    let claims = state
        .oidc
        .verify_id_token(&id_token, &state_data.nonce)
        .await?;

    let user = state.oidc.resolve_user(&state.pool, &claims).await?;

    sqlx::query("UPDATE users SET last_login_at = $1, updated_at = now() WHERE id = $2")
        .bind(Utc::now())
        .bind(user.id)
        .execute(&state.pool)
        .await?;

    let pair = state.oidc.tokens().issue_pair(user.id)?;
    state
        .oidc
        .tokens()
        .store_refresh_token(user.id, &pair.refresh_token)
        .await;

    tracing::info!(user_id = %user.id, "OIDC login completed");
    Ok(Json(pair.into()))
}
