use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub meta: JsonValue,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OwnerBrief {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub meta: JsonValue,
    pub owner_id: Uuid,
    pub owner: Option<OwnerBrief>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentResponse {
    pub fn from_parts(document: Document, owner: Option<OwnerBrief>) -> Self {
        Self {
            id: document.id,
            title: document.title,
            content: document.content,
            meta: document.meta,
            owner_id: document.owner_id,
            owner,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

fn default_meta() -> JsonValue {
    serde_json::json!({})
}

#[derive(Debug, Deserialize, Validate)]
pub struct DocumentCreateRequest {
    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: String,

    pub content: Option<String>,

    #[serde(default = "default_meta")]
    pub meta: JsonValue,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DocumentUpdateRequest {
    #[validate(length(min = 1, max = 500, message = "Title must be 1-500 characters"))]
    pub title: Option<String>,

    pub content: Option<String>,

    pub meta: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
pub struct DocumentListResponse {
    pub items: Vec<DocumentResponse>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub pages: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct DocumentListQuery {
    #[serde(default = "default_page")]
    pub page: i64,

    #[serde(default = "default_page_size")]
    pub page_size: i64,
}
