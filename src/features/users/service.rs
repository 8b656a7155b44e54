use sqlx::{PgPool, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::ApiError;
use crate::features::auth::models::User;
use crate::features::rbac::models::RoleBrief;
use crate::features::rbac::service::RbacService;
use crate::features::users::models::{UserListItem, UserListResponse};

#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
    rbac: RbacService,
}

impl UserService {
    pub fn new(pool: PgPool, rbac: RbacService) -> Self {
        Self { pool, rbac }
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn user_roles(&self, user_id: Uuid) -> Result<Vec<RoleBrief>, ApiError> {
        self.rbac.get_user_roles(user_id).await
    }

    /// Paginated user listing with an optional email/username substring
    /// filter. Role sets are attached with one batched follow-up query.
    pub async fn list_users(
        &self,
        page: i64,
        page_size: i64,
        search: Option<&str>,
    ) -> Result<UserListResponse, ApiError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let pattern = search.map(|s| format!("%{s}%"));

        let mut count_query = QueryBuilder::new("SELECT COUNT(*) FROM users");
        if let Some(pattern) = &pattern {
            count_query
                .push(" WHERE email ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR username ILIKE ")
                .push_bind(pattern.clone());
        }
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut list_query = QueryBuilder::new("SELECT * FROM users");
        if let Some(pattern) = &pattern {
            list_query
                .push(" WHERE email ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR username ILIKE ")
                .push_bind(pattern.clone());
        }
        list_query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(page_size)
            .push(" OFFSET ")
            .push_bind((page - 1) * page_size);

        let users: Vec<User> = list_query
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        let user_ids: Vec<Uuid> = users.iter().map(|user| user.id).collect();

        #[derive(sqlx::FromRow)]
        struct UserRoleRow {
            user_id: Uuid,
            id: Uuid,
            name: String,
            description: Option<String>,
            is_system: bool,
        }

        let role_rows = sqlx::query_as::<_, UserRoleRow>(
            r#"
            SELECT ur.user_id, r.id, r.name, r.description, r.is_system
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = ANY($1)
            ORDER BY r.name
            "#,
        )
        .bind(&user_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut roles_by_user: HashMap<Uuid, Vec<RoleBrief>> = HashMap::new();
        for row in role_rows {
            roles_by_user.entry(row.user_id).or_default().push(RoleBrief {
                id: row.id,
                name: row.name,
                description: row.description,
                is_system: row.is_system,
            });
        }

        let items = users
            .into_iter()
            .map(|user| UserListItem {
                roles: roles_by_user.remove(&user.id).unwrap_or_default(),
                id: user.id,
                email: user.email,
                username: user.username,
                is_active: user.is_active,
                is_verified: user.is_verified,
                created_at: user.created_at,
            })
            .collect();

        let total_pages = if total > 0 {
            (total + page_size - 1) / page_size
        } else {
            1
        };

        Ok(UserListResponse {
            items,
            total,
            page,
            page_size,
            total_pages,
        })
    }
}
