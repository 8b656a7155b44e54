use std::collections::HashMap;
use uuid::Uuid;

use crate::error::ApiError;
use crate::features::audit::{AuditContext, AuditService};
use crate::features::rbac::models::{
    Permission, Role, RoleCreateRequest, RoleResponse, RoleUpdateRequest,
};
use crate::features::rbac::service::RbacService;

/// Outcome of a bulk role assignment.
#[derive(Debug)]
pub struct BulkAssignOutcome {
    pub assigned: usize,
    pub skipped: usize,
}

/// Role and permission catalogue operations. Every mutation runs in one
/// transaction together with its audit row; cache invalidation follows the
/// commit and is best-effort.
impl RbacService {
    pub async fn get_role(&self, role_id: Uuid) -> Result<Option<Role>, ApiError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    pub async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>, ApiError> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    pub async fn role_permissions(&self, role_id: Uuid) -> Result<Vec<Permission>, ApiError> {
        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.*
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            ORDER BY p.resource, p.action
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    pub async fn get_role_response(&self, role_id: Uuid) -> Result<RoleResponse, ApiError> {
        let role = self
            .get_role(role_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Role not found".to_string()))?;
        let permissions = self.role_permissions(role_id).await?;
        Ok(RoleResponse::from_parts(role, permissions))
    }

    /// All roles with their permission sets, loaded with one follow-up
    /// batched query rather than one query per role.
    pub async fn list_roles(&self) -> Result<Vec<RoleResponse>, ApiError> {
        let roles = sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        #[derive(sqlx::FromRow)]
        struct RolePermissionRow {
            role_id: Uuid,
            id: Uuid,
            resource: String,
            action: String,
            scope: String,
            description: Option<String>,
        }

        let rows = sqlx::query_as::<_, RolePermissionRow>(
            r#"
            SELECT rp.role_id, p.id, p.resource, p.action, p.scope, p.description
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            ORDER BY p.resource, p.action
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_role: HashMap<Uuid, Vec<Permission>> = HashMap::new();
        for row in rows {
            by_role.entry(row.role_id).or_default().push(Permission {
                id: row.id,
                resource: row.resource,
                action: row.action,
                scope: row.scope,
                description: row.description,
            });
        }

        Ok(roles
            .into_iter()
            .map(|role| {
                let permissions = by_role.remove(&role.id).unwrap_or_default();
                RoleResponse::from_parts(role, permissions)
            })
            .collect())
    }

    pub async fn create_role(
        &self,
        request: RoleCreateRequest,
        ctx: &AuditContext,
    ) -> Result<RoleResponse, ApiError> {
        if self.get_role_by_name(&request.name).await?.is_some() {
            return Err(ApiError::Domain(
                "Role with this name already exists".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let role = sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (id, name, description, is_system)
            VALUES ($1, $2, $3, FALSE)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.description)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::log_role_created(&mut tx, ctx, role.id, &role.name).await?;
        tx.commit().await?;

        tracing::info!(role_id = %role.id, name = %role.name, "role created");
        Ok(RoleResponse::from_parts(role, Vec::new()))
    }

    pub async fn update_role(
        &self,
        role_id: Uuid,
        request: RoleUpdateRequest,
        ctx: &AuditContext,
    ) -> Result<RoleResponse, ApiError> {
        let role = self
            .get_role(role_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Role not found".to_string()))?;

        if let Some(new_name) = &request.name {
            if new_name != &role.name && self.get_role_by_name(new_name).await?.is_some() {
                return Err(ApiError::Domain(
                    "Role with this name already exists".to_string(),
                ));
            }
        }

        let name = request.name.clone().unwrap_or_else(|| role.name.clone());
        let description = request.description.clone().or_else(|| role.description.clone());

        let mut changes = serde_json::Map::new();
        if name != role.name {
            changes.insert(
                "name".to_string(),
                serde_json::json!({ "old": role.name, "new": name }),
            );
        }
        if description != role.description {
            changes.insert(
                "description".to_string(),
                serde_json::json!({ "old": role.description, "new": description }),
            );
        }

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query_as::<_, Role>(
            r#"
            UPDATE roles SET name = $1, description = $2, updated_at = now()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(&name)
        .bind(&description)
        .bind(role_id)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::log_role_updated(&mut tx, ctx, role_id, changes.into()).await?;
        tx.commit().await?;

        self.invalidate_role_cache(role_id).await?;

        let permissions = self.role_permissions(role_id).await?;
        Ok(RoleResponse::from_parts(updated, permissions))
    }

    pub async fn delete_role(&self, role_id: Uuid, ctx: &AuditContext) -> Result<(), ApiError> {
        let role = self
            .get_role(role_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Role not found".to_string()))?;

        if role.is_system {
            return Err(ApiError::Domain("Cannot delete system roles".to_string()));
        }

        // Capture holders before the cascade wipes the associations.
        let holder_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM user_roles WHERE role_id = $1")
                .bind(role_id)
                .fetch_all(&self.pool)
                .await?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        AuditService::log_role_deleted(&mut tx, ctx, role_id, &role.name).await?;
        tx.commit().await?;

        for user_id in holder_ids {
            self.invalidate_user_cache(user_id).await;
        }

        tracing::info!(role_id = %role_id, name = %role.name, "role deleted");
        Ok(())
    }

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, ApiError> {
        let permissions = sqlx::query_as::<_, Permission>(
            "SELECT * FROM permissions ORDER BY resource, action",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(permissions)
    }

    pub async fn get_permission(&self, permission_id: Uuid) -> Result<Option<Permission>, ApiError> {
        let permission =
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = $1")
                .bind(permission_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(permission)
    }

    pub async fn attach_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
        ctx: &AuditContext,
    ) -> Result<RoleResponse, ApiError> {
        let role = self
            .get_role(role_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Role not found".to_string()))?;

        let mut tx = self.pool.begin().await?;
        for permission_id in permission_ids {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM permissions WHERE id = $1)",
            )
            .bind(permission_id)
            .fetch_one(&mut *tx)
            .await?;
            if !exists {
                return Err(ApiError::NotFound(format!(
                    "Permission not found: {permission_id}"
                )));
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(role_id)
            .bind(permission_id)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() > 0 {
                AuditService::log_permission_assigned(&mut tx, ctx, role_id, *permission_id)
                    .await?;
            }
        }
        tx.commit().await?;

        self.invalidate_role_cache(role_id).await?;

        let permissions = self.role_permissions(role_id).await?;
        Ok(RoleResponse::from_parts(role, permissions))
    }

    pub async fn detach_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        ctx: &AuditContext,
    ) -> Result<(), ApiError> {
        if self.get_role(role_id).await?.is_none() {
            return Err(ApiError::NotFound("Role not found".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query(
            "DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2",
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() == 0 {
            return Err(ApiError::NotFound(
                "Permission not assigned to this role".to_string(),
            ));
        }

        AuditService::log_permission_removed(&mut tx, ctx, role_id, permission_id).await?;
        tx.commit().await?;

        self.invalidate_role_cache(role_id).await?;
        Ok(())
    }

    pub async fn assign_role_to_user(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
        ctx: &AuditContext,
    ) -> Result<(), ApiError> {
        let user_exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        if !user_exists {
            return Err(ApiError::NotFound("User not found".to_string()));
        }
        if self.get_role(role_id).await?.is_none() {
            return Err(ApiError::NotFound("Role not found".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id, assigned_by)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .bind(assigned_by)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(ApiError::Domain("User already has this role".to_string()));
        }

        AuditService::log_role_assigned(&mut tx, ctx, user_id, role_id).await?;
        tx.commit().await?;

        self.invalidate_user_cache(user_id).await;
        tracing::info!(user_id = %user_id, role_id = %role_id, "role assigned");
        Ok(())
    }

    pub async fn remove_role_from_user(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        ctx: &AuditContext,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        if removed.rows_affected() == 0 {
            return Err(ApiError::NotFound(
                "User does not have this role".to_string(),
            ));
        }

        AuditService::log_role_removed(&mut tx, ctx, user_id, role_id).await?;
        tx.commit().await?;

        self.invalidate_user_cache(user_id).await;
        tracing::info!(user_id = %user_id, role_id = %role_id, "role removed");
        Ok(())
    }

    /// Assign one role to many users, skipping users that already hold it.
    /// One audit row per actual assignment, all in a single transaction.
    pub async fn bulk_assign_role(
        &self,
        user_ids: &[Uuid],
        role_id: Uuid,
        assigned_by: Option<Uuid>,
        ctx: &AuditContext,
    ) -> Result<BulkAssignOutcome, ApiError> {
        if self.get_role(role_id).await?.is_none() {
            return Err(ApiError::NotFound("Role not found".to_string()));
        }

        let mut assigned = 0;
        let mut skipped = 0;

        let mut tx = self.pool.begin().await?;
        for user_id in user_ids {
            let user_exists =
                sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                    .bind(user_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if !user_exists {
                skipped += 1;
                continue;
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO user_roles (user_id, role_id, assigned_by)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(role_id)
            .bind(assigned_by)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() > 0 {
                AuditService::log_role_assigned(&mut tx, ctx, *user_id, role_id).await?;
                assigned += 1;
            } else {
                skipped += 1;
            }
        }
        tx.commit().await?;

        for user_id in user_ids {
            self.invalidate_user_cache(*user_id).await;
        }

        Ok(BulkAssignOutcome { assigned, skipped })
    }
}
