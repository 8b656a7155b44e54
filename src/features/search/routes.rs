use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use validator::Validate;

use crate::error::ApiError;
use crate::features::rbac::models::Scope;
use crate::features::search::models::{
    SearchRequest, SearchResponse, SearchSuggestionsResponse, SuggestionsQuery,
};
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;

pub fn search_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(search_handler))
        .route("/suggestions", get(suggestions_handler))
}

async fn search_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    // Principals without documents:read:all only ever search their own
    // corpus; a caller-supplied owner filter cannot widen that.
    let can_read_all = state
        .rbac
        .has_permission(user.id, "documents", "read", Scope::All)
        .await?;

    let mut filters = request.filters.clone().unwrap_or_default();
    if !can_read_all {
        filters.owner_id = Some(user.id);
    }

    let (items, total) = state
        .search
        .search(
            &request.query,
            request.mode,
            Some(&filters),
            request.page,
            request.page_size,
        )
        .await?;

    let page = request.page.max(1);
    let page_size = request.page_size.clamp(1, 100);
    let pages = if total > 0 {
        (total + page_size - 1) / page_size
    } else {
        1
    };

    Ok(Json(SearchResponse {
        items,
        total,
        page,
        page_size,
        pages,
        query: request.query,
        mode: request.mode,
    }))
}

async fn suggestions_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<SuggestionsQuery>,
) -> Result<Json<SearchSuggestionsResponse>, ApiError> {
    if query.q.is_empty() || query.q.len() > 100 {
        return Err(ApiError::Validation(
            "Query prefix must be 1-100 characters".to_string(),
        ));
    }

    let can_read_all = state
        .rbac
        .has_permission(user.id, "documents", "read", Scope::All)
        .await?;
    let owner_id = if can_read_all { None } else { Some(user.id) };

    let suggestions = state
        .search
        .suggest(&query.q, query.limit, owner_id)
        .await?;

    Ok(Json(SearchSuggestionsResponse {
        suggestions,
        query: query.q,
    }))
}
