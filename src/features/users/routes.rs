use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::error::ApiError;
use crate::features::audit::AuditContext;
use crate::features::auth::models::MessageResponse;
use crate::features::rbac::models::Scope;
use crate::features::users::models::{
    BulkRoleAssignRequest, UserListQuery, UserListResponse, UserRoleAssignRequest,
    UserRolesResponse,
};
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users_handler))
        .route(
            "/:user_id/roles",
            get(get_user_roles_handler).post(assign_role_handler),
        )
        .route("/:user_id/roles/:role_id", delete(remove_role_handler))
        .route("/bulk/roles", post(bulk_assign_role_handler))
}

async fn list_users_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    state
        .rbac
        .require_permission(user.id, "users", "read", Scope::All)
        .await?;

    let response = state
        .users
        .list_users(query.page, query.page_size, query.search.as_deref())
        .await?;
    Ok(Json(response))
}

async fn get_user_roles_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserRolesResponse>, ApiError> {
    state
        .rbac
        .require_permission(user.id, "users", "read", Scope::All)
        .await?;

    if state.users.get_user(user_id).await?.is_none() {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    let roles = state.users.user_roles(user_id).await?;
    Ok(Json(UserRolesResponse { user_id, roles }))
}

async fn assign_role_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(user_id): Path<Uuid>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<UserRoleAssignRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .rbac
        .require_permission(user.id, "users", "update", Scope::All)
        .await?;

    let ctx = AuditContext::from_request(user.id, &headers, peer.map(|ConnectInfo(addr)| addr));
    state
        .rbac
        .assign_role_to_user(user_id, request.role_id, Some(user.id), &ctx)
        .await?;

    Ok(Json(MessageResponse::new("Role assigned successfully")))
}

async fn remove_role_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((user_id, role_id)): Path<(Uuid, Uuid)>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .rbac
        .require_permission(user.id, "users", "update", Scope::All)
        .await?;

    let ctx = AuditContext::from_request(user.id, &headers, peer.map(|ConnectInfo(addr)| addr));
    state
        .rbac
        .remove_role_from_user(user_id, role_id, &ctx)
        .await?;

    Ok(Json(MessageResponse::new("Role removed successfully")))
}

async fn bulk_assign_role_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<BulkRoleAssignRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .rbac
        .require_permission(user.id, "users", "update", Scope::All)
        .await?;

    let ctx = AuditContext::from_request(user.id, &headers, peer.map(|ConnectInfo(addr)| addr));
    let outcome = state
        .rbac
        .bulk_assign_role(&request.user_ids, request.role_id, Some(user.id), &ctx)
        .await?;

    Ok(Json(MessageResponse::new(format!(
        "Role assigned to {} users ({} skipped)",
        outcome.assigned, outcome.skipped
    ))))
}
