use sqlx::PgPool;
use uuid::Uuid;

use crate::cache::{cache_key, Cache};
use crate::error::ApiError;
use crate::features::rbac::models::{PermissionGrant, RoleBrief, Scope};

/// Memoized aggregates expire on their own even if an invalidation is lost.
pub const PERMISSIONS_CACHE_TTL_SECS: u64 = 300;

/// Permission evaluator. A user's effective permissions are the union of the
/// permissions attached to all roles the user holds, loaded with a single
/// join and memoized in the cache. The store stays authoritative: every path
/// is correct with an empty cache.
#[derive(Clone)]
pub struct RbacService {
    pub(crate) pool: PgPool,
    pub(crate) cache: Cache,
}

impl RbacService {
    pub fn new(pool: PgPool, cache: Cache) -> Self {
        Self { pool, cache }
    }

    fn permissions_cache_key(user_id: Uuid) -> String {
        cache_key(&["rbac", "permissions", &user_id.to_string()])
    }

    fn roles_cache_key(user_id: Uuid) -> String {
        cache_key(&["rbac", "roles", &user_id.to_string()])
    }

    pub async fn invalidate_user_cache(&self, user_id: Uuid) {
        self.cache.delete(&Self::permissions_cache_key(user_id)).await;
        self.cache.delete(&Self::roles_cache_key(user_id)).await;
    }

    /// Invalidate every user holding the role. Issued after the mutation's
    /// transaction commits; losing one entry only means staleness until the
    /// TTL runs out.
    pub async fn invalidate_role_cache(&self, role_id: Uuid) -> Result<(), ApiError> {
        let user_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM user_roles WHERE role_id = $1")
                .bind(role_id)
                .fetch_all(&self.pool)
                .await?;
        for user_id in user_ids {
            self.invalidate_user_cache(user_id).await;
        }
        Ok(())
    }

    /// Global flush, used when permission rows themselves change (bootstrap).
    pub async fn invalidate_all(&self) {
        self.cache.delete_by_prefix("cache:rbac:*").await;
    }

    pub async fn get_user_permissions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<PermissionGrant>, ApiError> {
        let key = Self::permissions_cache_key(user_id);
        if let Some(cached) = self.cache.get_json::<Vec<PermissionGrant>>(&key).await {
            return Ok(cached);
        }

        let grants = sqlx::query_as::<_, PermissionGrant>(
            r#"
            SELECT DISTINCT p.resource, p.action, p.scope
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            JOIN user_roles ur ON ur.role_id = rp.role_id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.cache
            .set_json(&key, &grants, Some(PERMISSIONS_CACHE_TTL_SECS))
            .await;

        Ok(grants)
    }

    pub async fn get_user_roles(&self, user_id: Uuid) -> Result<Vec<RoleBrief>, ApiError> {
        let key = Self::roles_cache_key(user_id);
        if let Some(cached) = self.cache.get_json::<Vec<RoleBrief>>(&key).await {
            return Ok(cached);
        }

        let roles = sqlx::query_as::<_, RoleBrief>(
            r#"
            SELECT r.id, r.name, r.description, r.is_system
            FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.cache
            .set_json(&key, &roles, Some(PERMISSIONS_CACHE_TTL_SECS))
            .await;

        Ok(roles)
    }

    pub async fn has_permission(
        &self,
        user_id: Uuid,
        resource: &str,
        action: &str,
        required_scope: Scope,
    ) -> Result<bool, ApiError> {
        let grants = self.get_user_permissions(user_id).await?;
        Ok(grants
            .iter()
            .any(|grant| grant.satisfies(resource, action, required_scope)))
    }

    pub async fn has_any_permission(
        &self,
        user_id: Uuid,
        requirements: &[(&str, &str, Scope)],
    ) -> Result<bool, ApiError> {
        let grants = self.get_user_permissions(user_id).await?;
        Ok(requirements.iter().any(|(resource, action, scope)| {
            grants
                .iter()
                .any(|grant| grant.satisfies(resource, action, *scope))
        }))
    }

    pub async fn has_all_permissions(
        &self,
        user_id: Uuid,
        requirements: &[(&str, &str, Scope)],
    ) -> Result<bool, ApiError> {
        let grants = self.get_user_permissions(user_id).await?;
        Ok(requirements.iter().all(|(resource, action, scope)| {
            grants
                .iter()
                .any(|grant| grant.satisfies(resource, action, *scope))
        }))
    }

    pub async fn has_role(&self, user_id: Uuid, role_name: &str) -> Result<bool, ApiError> {
        let roles = self.get_user_roles(user_id).await?;
        Ok(roles.iter().any(|role| role.name == role_name))
    }

    pub async fn has_any_role(
        &self,
        user_id: Uuid,
        role_names: &[&str],
    ) -> Result<bool, ApiError> {
        let roles = self.get_user_roles(user_id).await?;
        Ok(roles.iter().any(|role| role_names.contains(&role.name.as_str())))
    }

    pub async fn is_super_admin(&self, user_id: Uuid) -> Result<bool, ApiError> {
        self.has_role(user_id, "Super Admin").await
    }

    pub async fn is_admin(&self, user_id: Uuid) -> Result<bool, ApiError> {
        self.has_any_role(user_id, &["Admin", "Super Admin"]).await
    }

    /// A single failed requirement aborts the request with 403 naming the
    /// missing permission.
    pub async fn require_permission(
        &self,
        user_id: Uuid,
        resource: &str,
        action: &str,
        required_scope: Scope,
    ) -> Result<(), ApiError> {
        if self
            .has_permission(user_id, resource, action, required_scope)
            .await?
        {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "Permission denied: {resource}:{action}:{required_scope}"
            )))
        }
    }
}
