use axum::routing::get;
use axum::Router;

use crate::features;
use crate::middleware;
use crate::state::AppState;

/// Assemble the full HTTP surface over a built state. The caller adds the
/// listener (and peer-address plumbing) on top.
pub fn build_router(state: AppState) -> Router {
    let auth_layer = || {
        axum::middleware::from_fn_with_state::<_, AppState, (axum::extract::State<AppState>, tower_cookies::Cookies, axum::extract::Request)>(state.clone(), middleware::auth::auth_middleware)
    };

    let cors_origins: Vec<axum::http::HeaderValue> = state
        .config
        .cors_origin_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let api_v1 = Router::new()
        .nest(
            "/auth",
            Router::new()
                .merge(features::auth::routes::public_auth_routes())
                .merge(features::auth::routes::protected_auth_routes().layer(auth_layer())),
        )
        .nest("/oidc", features::oidc::routes::oidc_routes())
        .nest(
            "/roles",
            features::rbac::routes::role_routes().layer(auth_layer()),
        )
        .nest(
            "/permissions",
            features::rbac::routes::permission_routes().layer(auth_layer()),
        )
        .nest(
            "/users",
            features::users::routes::user_routes().layer(auth_layer()),
        )
        .nest(
            "/documents",
            features::documents::routes::document_routes().layer(auth_layer()),
        )
        .nest(
            "/search",
            features::search::routes::search_routes().layer(auth_layer()),
        );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1)
        .with_state(state)
        .layer(tower_cookies::CookieManagerLayer::new())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::AllowOrigin::list(cors_origins))
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::COOKIE,
                    axum::http::header::ACCEPT,
                ])
                .allow_credentials(true),
        )
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "OK",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
