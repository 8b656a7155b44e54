use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use std::net::SocketAddr;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::features::audit::AuditContext;
use crate::features::auth::models::MessageResponse;
use crate::features::rbac::models::{
    PermissionAssignRequest, PermissionListResponse, RoleCreateRequest, RoleListResponse,
    RoleResponse, RoleUpdateRequest, Scope,
};
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;

pub fn role_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_roles_handler).post(create_role_handler))
        .route(
            "/:role_id",
            get(get_role_handler)
                .put(update_role_handler)
                .delete(delete_role_handler),
        )
        .route("/:role_id/permissions", post(attach_permissions_handler))
        .route(
            "/:role_id/permissions/:permission_id",
            delete(detach_permission_handler),
        )
}

pub fn permission_routes() -> Router<AppState> {
    Router::new().route("/", get(list_permissions_handler))
}

async fn list_roles_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<RoleListResponse>, ApiError> {
    state
        .rbac
        .require_permission(user.id, "roles", "read", Scope::All)
        .await?;

    let items = state.rbac.list_roles().await?;
    let total = items.len();
    Ok(Json(RoleListResponse { items, total }))
}

async fn create_role_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<RoleCreateRequest>,
) -> Result<(StatusCode, Json<RoleResponse>), ApiError> {
    state
        .rbac
        .require_permission(user.id, "roles", "create", Scope::All)
        .await?;

    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let ctx = AuditContext::from_request(user.id, &headers, peer.map(|ConnectInfo(addr)| addr));
    let role = state.rbac.create_role(request, &ctx).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

async fn get_role_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(role_id): Path<Uuid>,
) -> Result<Json<RoleResponse>, ApiError> {
    state
        .rbac
        .require_permission(user.id, "roles", "read", Scope::All)
        .await?;

    let role = state.rbac.get_role_response(role_id).await?;
    Ok(Json(role))
}

async fn update_role_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(role_id): Path<Uuid>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<RoleUpdateRequest>,
) -> Result<Json<RoleResponse>, ApiError> {
    state
        .rbac
        .require_permission(user.id, "roles", "update", Scope::All)
        .await?;

    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let ctx = AuditContext::from_request(user.id, &headers, peer.map(|ConnectInfo(addr)| addr));
    let role = state.rbac.update_role(role_id, request, &ctx).await?;
    Ok(Json(role))
}

async fn delete_role_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(role_id): Path<Uuid>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .rbac
        .require_permission(user.id, "roles", "delete", Scope::All)
        .await?;

    let ctx = AuditContext::from_request(user.id, &headers, peer.map(|ConnectInfo(addr)| addr));
    state.rbac.delete_role(role_id, &ctx).await?;
    Ok(Json(MessageResponse::new("Role deleted successfully")))
}

async fn attach_permissions_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(role_id): Path<Uuid>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<PermissionAssignRequest>,
) -> Result<Json<RoleResponse>, ApiError> {
    state
        .rbac
        .require_permission(user.id, "roles", "update", Scope::All)
        .await?;

    let ctx = AuditContext::from_request(user.id, &headers, peer.map(|ConnectInfo(addr)| addr));
    let role = state
        .rbac
        .attach_permissions(role_id, &request.permission_ids, &ctx)
        .await?;
    Ok(Json(role))
}

async fn detach_permission_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((role_id, permission_id)): Path<(Uuid, Uuid)>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .rbac
        .require_permission(user.id, "roles", "update", Scope::All)
        .await?;

    let ctx = AuditContext::from_request(user.id, &headers, peer.map(|ConnectInfo(addr)| addr));
    state
        .rbac
        .detach_permission(role_id, permission_id, &ctx)
        .await?;
    Ok(Json(MessageResponse::new(
        "Permission removed from role successfully",
    )))
}

async fn list_permissions_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<PermissionListResponse>, ApiError> {
    state
        .rbac
        .require_permission(user.id, "permissions", "read", Scope::All)
        .await?;

    let items = state.rbac.list_permissions().await?;
    let total = items.len();
    Ok(Json(PermissionListResponse { items, total }))
}
