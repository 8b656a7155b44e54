use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::features::auth::models::MessageResponse;
use crate::features::documents::models::{
    DocumentCreateRequest, DocumentListQuery, DocumentListResponse, DocumentResponse,
    DocumentUpdateRequest,
};
use crate::features::rbac::models::Scope;
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;

pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_documents_handler).post(create_document_handler))
        .route(
            "/:document_id",
            get(get_document_handler)
                .put(update_document_handler)
                .delete(delete_document_handler),
        )
}

async fn list_documents_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<DocumentListQuery>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let can_read_all = state
        .rbac
        .has_permission(user.id, "documents", "read", Scope::All)
        .await?;
    let owner_id = if can_read_all { None } else { Some(user.id) };

    let (items, total) = state
        .documents
        .list(owner_id, query.page, query.page_size)
        .await?;

    let page_size = query.page_size.clamp(1, 100);
    let pages = if total > 0 {
        (total + page_size - 1) / page_size
    } else {
        1
    };

    Ok(Json(DocumentListResponse {
        items,
        total,
        page: query.page.max(1),
        page_size,
        pages,
    }))
}

async fn create_document_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<DocumentCreateRequest>,
) -> Result<(StatusCode, Json<DocumentResponse>), ApiError> {
    state
        .rbac
        .require_permission(user.id, "documents", "create", Scope::Own)
        .await?;

    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let document = state.documents.create(user.id, &request).await?;
    let response = state
        .documents
        .get_with_owner(document.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_document_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let document = state
        .documents
        .get_with_owner(document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

    let can_read_all = state
        .rbac
        .has_permission(user.id, "documents", "read", Scope::All)
        .await?;
    if !can_read_all && document.owner_id != user.id {
        return Err(ApiError::Forbidden(
            "You don't have permission to access this document".to_string(),
        ));
    }

    Ok(Json(document))
}

async fn update_document_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(document_id): Path<Uuid>,
    Json(request): Json<DocumentUpdateRequest>,
) -> Result<Json<DocumentResponse>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let document = state
        .documents
        .get(document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

    let can_update_all = state
        .rbac
        .has_permission(user.id, "documents", "update", Scope::All)
        .await?;
    if !can_update_all && document.owner_id != user.id {
        return Err(ApiError::Forbidden(
            "You don't have permission to update this document".to_string(),
        ));
    }

    state.documents.update(&document, &request).await?;
    let response = state
        .documents
        .get_with_owner(document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

    Ok(Json(response))
}

async fn delete_document_handler(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let document = state
        .documents
        .get(document_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

    let can_delete_all = state
        .rbac
        .has_permission(user.id, "documents", "delete", Scope::All)
        .await?;
    if !can_delete_all && document.owner_id != user.id {
        return Err(ApiError::Forbidden(
            "You don't have permission to delete this document".to_string(),
        ));
    }

    state.documents.delete(document_id).await?;
    Ok(Json(MessageResponse::new("Document deleted successfully")))
}
