use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::features::rbac::models::RoleBrief;

#[derive(Debug, Serialize)]
pub struct UserListItem {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub roles: Vec<RoleBrief>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub items: Vec<UserListItem>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct UserRolesResponse {
    pub user_id: Uuid,
    pub roles: Vec<RoleBrief>,
}

#[derive(Debug, Deserialize)]
pub struct UserRoleAssignRequest {
    pub role_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct BulkRoleAssignRequest {
    pub user_ids: Vec<Uuid>,
    pub role_id: Uuid,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    #[serde(default = "default_page")]
    pub page: i64,

    #[serde(default = "default_page_size")]
    pub page_size: i64,

    pub search: Option<String>,
}
