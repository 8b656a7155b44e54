use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::features::audit::models::{AuditAction, AuditContext};

/// Append-only audit writer. Every method takes the mutation's own
/// connection so the log row commits (or rolls back) with the mutation.
pub struct AuditService;

impl AuditService {
    #[allow(clippy::too_many_arguments)]
    async fn insert(
        conn: &mut PgConnection,
        action: AuditAction,
        entity_type: &str,
        entity_id: Option<String>,
        ctx: &AuditContext,
        target_user_id: Option<Uuid>,
        role_id: Option<Uuid>,
        details: JsonValue,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, action, entity_type, entity_id, actor_user_id,
                target_user_id, role_id, details, ip_address, user_agent
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(action.as_str())
        .bind(entity_type)
        .bind(entity_id)
        .bind(ctx.actor_id)
        .bind(target_user_id)
        .bind(role_id)
        .bind(details)
        .bind(&ctx.ip_address)
        .bind(&ctx.user_agent)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn log_role_assigned(
        conn: &mut PgConnection,
        ctx: &AuditContext,
        target_user_id: Uuid,
        role_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        Self::insert(
            conn,
            AuditAction::RoleAssigned,
            "user_role",
            Some(target_user_id.to_string()),
            ctx,
            Some(target_user_id),
            Some(role_id),
            serde_json::json!({
                "role_id": role_id,
                "target_user_id": target_user_id,
                "timestamp": Utc::now(),
            }),
        )
        .await
    }

    pub async fn log_role_removed(
        conn: &mut PgConnection,
        ctx: &AuditContext,
        target_user_id: Uuid,
        role_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        Self::insert(
            conn,
            AuditAction::RoleRemoved,
            "user_role",
            Some(target_user_id.to_string()),
            ctx,
            Some(target_user_id),
            Some(role_id),
            serde_json::json!({
                "role_id": role_id,
                "target_user_id": target_user_id,
                "timestamp": Utc::now(),
            }),
        )
        .await
    }

    pub async fn log_role_created(
        conn: &mut PgConnection,
        ctx: &AuditContext,
        role_id: Uuid,
        role_name: &str,
    ) -> Result<(), sqlx::Error> {
        Self::insert(
            conn,
            AuditAction::RoleCreated,
            "role",
            Some(role_id.to_string()),
            ctx,
            None,
            Some(role_id),
            serde_json::json!({
                "role_name": role_name,
                "timestamp": Utc::now(),
            }),
        )
        .await
    }

    /// `changes` carries the field-level diff ({"name": {"old": …, "new": …}}).
    pub async fn log_role_updated(
        conn: &mut PgConnection,
        ctx: &AuditContext,
        role_id: Uuid,
        changes: JsonValue,
    ) -> Result<(), sqlx::Error> {
        Self::insert(
            conn,
            AuditAction::RoleUpdated,
            "role",
            Some(role_id.to_string()),
            ctx,
            None,
            Some(role_id),
            serde_json::json!({
                "changes": changes,
                "timestamp": Utc::now(),
            }),
        )
        .await
    }

    pub async fn log_role_deleted(
        conn: &mut PgConnection,
        ctx: &AuditContext,
        role_id: Uuid,
        role_name: &str,
    ) -> Result<(), sqlx::Error> {
        Self::insert(
            conn,
            AuditAction::RoleDeleted,
            "role",
            Some(role_id.to_string()),
            ctx,
            None,
            // The role row is gone by commit time; the FK would reject it.
            None,
            serde_json::json!({
                "role_id": role_id,
                "role_name": role_name,
                "timestamp": Utc::now(),
            }),
        )
        .await
    }

    pub async fn log_permission_assigned(
        conn: &mut PgConnection,
        ctx: &AuditContext,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        Self::insert(
            conn,
            AuditAction::PermissionAssigned,
            "role_permission",
            Some(role_id.to_string()),
            ctx,
            None,
            Some(role_id),
            serde_json::json!({
                "role_id": role_id,
                "permission_id": permission_id,
                "timestamp": Utc::now(),
            }),
        )
        .await
    }

    pub async fn log_permission_removed(
        conn: &mut PgConnection,
        ctx: &AuditContext,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        Self::insert(
            conn,
            AuditAction::PermissionRemoved,
            "role_permission",
            Some(role_id.to_string()),
            ctx,
            None,
            Some(role_id),
            serde_json::json!({
                "role_id": role_id,
                "permission_id": permission_id,
                "timestamp": Utc::now(),
            }),
        )
        .await
    }
}
