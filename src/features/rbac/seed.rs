use rand::{distributions::Alphanumeric, Rng};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;
use crate::features::auth::models::AUTH_PROVIDER_LOCAL;
use crate::features::auth::password::hash_password;
use crate::features::rbac::models::Scope;
use crate::features::rbac::service::RbacService;

pub const SUPER_ADMIN_ROLE: &str = "Super Admin";

/// The fixed permission catalogue: (resource, action, scope, description).
pub const DEFAULT_PERMISSIONS: &[(&str, &str, Scope, &str)] = &[
    ("users", "create", Scope::All, "Create new users"),
    ("users", "read", Scope::Own, "Read own user profile"),
    ("users", "read", Scope::All, "Read all users"),
    ("users", "update", Scope::Own, "Update own user profile"),
    ("users", "update", Scope::All, "Update any user"),
    ("users", "delete", Scope::All, "Delete users"),
    ("roles", "create", Scope::All, "Create new roles"),
    ("roles", "read", Scope::All, "Read all roles"),
    ("roles", "update", Scope::All, "Update roles"),
    ("roles", "delete", Scope::All, "Delete roles"),
    ("permissions", "read", Scope::All, "Read all permissions"),
    ("documents", "create", Scope::Own, "Create own documents"),
    ("documents", "read", Scope::Own, "Read own documents"),
    ("documents", "read", Scope::Team, "Read team documents"),
    ("documents", "read", Scope::All, "Read all documents"),
    ("documents", "update", Scope::Own, "Update own documents"),
    ("documents", "update", Scope::Team, "Update team documents"),
    ("documents", "update", Scope::All, "Update all documents"),
    ("documents", "delete", Scope::Own, "Delete own documents"),
    ("documents", "delete", Scope::All, "Delete all documents"),
    ("labels", "create", Scope::Own, "Create own labels"),
    ("labels", "read", Scope::Own, "Read own labels"),
    ("labels", "read", Scope::All, "Read all labels"),
    ("labels", "update", Scope::Own, "Update own labels"),
    ("labels", "update", Scope::All, "Update all labels"),
    ("labels", "delete", Scope::Own, "Delete own labels"),
    ("labels", "delete", Scope::All, "Delete all labels"),
    ("watch_folders", "create", Scope::Own, "Create own watch folders"),
    ("watch_folders", "read", Scope::Own, "Read own watch folders"),
    ("watch_folders", "read", Scope::All, "Read all watch folders"),
    ("watch_folders", "update", Scope::Own, "Update own watch folders"),
    ("watch_folders", "update", Scope::All, "Update all watch folders"),
    ("watch_folders", "delete", Scope::Own, "Delete own watch folders"),
    ("watch_folders", "delete", Scope::All, "Delete all watch folders"),
    ("system", "*", Scope::All, "Full system access (wildcard)"),
];

/// The five system roles: (name, description, permission patterns).
/// Patterns expand through `expand_pattern`.
pub const DEFAULT_ROLES: &[(&str, &str, &[(&str, &str, Scope)])] = &[
    (
        SUPER_ADMIN_ROLE,
        "Full system access with all permissions",
        &[("*", "*", Scope::All)],
    ),
    (
        "Admin",
        "Administrative access to manage users, roles, and system settings",
        &[
            ("users", "*", Scope::All),
            ("roles", "*", Scope::All),
            ("permissions", "read", Scope::All),
            ("documents", "*", Scope::All),
            ("labels", "*", Scope::All),
            ("watch_folders", "*", Scope::All),
        ],
    ),
    (
        "Manager",
        "Team management with access to team resources",
        &[
            ("users", "read", Scope::All),
            ("documents", "create", Scope::Own),
            ("documents", "read", Scope::Team),
            ("documents", "update", Scope::Team),
            ("documents", "delete", Scope::Own),
            ("labels", "create", Scope::Own),
            ("labels", "read", Scope::All),
            ("labels", "update", Scope::Own),
            ("labels", "delete", Scope::Own),
            ("watch_folders", "create", Scope::Own),
            ("watch_folders", "read", Scope::Own),
            ("watch_folders", "update", Scope::Own),
            ("watch_folders", "delete", Scope::Own),
        ],
    ),
    (
        "User",
        "Standard user with access to own resources",
        &[
            ("users", "read", Scope::Own),
            ("users", "update", Scope::Own),
            ("documents", "create", Scope::Own),
            ("documents", "read", Scope::Own),
            ("documents", "update", Scope::Own),
            ("documents", "delete", Scope::Own),
            ("labels", "create", Scope::Own),
            ("labels", "read", Scope::Own),
            ("labels", "update", Scope::Own),
            ("labels", "delete", Scope::Own),
        ],
    ),
    (
        "Viewer",
        "Read-only access to own resources",
        &[
            ("users", "read", Scope::Own),
            ("documents", "read", Scope::Own),
            ("labels", "read", Scope::Own),
        ],
    ),
];

type PermissionKey = (String, String, String);

/// Expand one role pattern against the seeded catalogue. `(*, *, _)` covers
/// every permission; `(resource, *, _)` covers every action on that
/// resource; anything else is an exact triple.
pub fn expand_pattern(
    pattern: (&str, &str, Scope),
    catalogue: &HashMap<PermissionKey, Uuid>,
) -> Vec<Uuid> {
    let (resource, action, scope) = pattern;
    match (resource, action) {
        ("*", "*") => catalogue.values().copied().collect(),
        (resource, "*") => catalogue
            .iter()
            .filter(|((r, _, _), _)| r == resource)
            .map(|(_, id)| *id)
            .collect(),
        _ => catalogue
            .get(&(
                resource.to_string(),
                action.to_string(),
                scope.as_str().to_string(),
            ))
            .into_iter()
            .copied()
            .collect(),
    }
}

async fn seed_permissions(
    conn: &mut PgConnection,
) -> Result<HashMap<PermissionKey, Uuid>, sqlx::Error> {
    let mut catalogue = HashMap::new();

    for (resource, action, scope, description) in DEFAULT_PERMISSIONS {
        let existing: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM permissions WHERE resource = $1 AND action = $2 AND scope = $3",
        )
        .bind(resource)
        .bind(action)
        .bind(scope.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        let id = match existing {
            Some(id) => id,
            None => {
                let id: Uuid = sqlx::query_scalar(
                    r#"
                    INSERT INTO permissions (id, resource, action, scope, description)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING id
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(resource)
                .bind(action)
                .bind(scope.as_str())
                .bind(description)
                .fetch_one(&mut *conn)
                .await?;
                tracing::debug!(%resource, %action, scope = %scope, "seeded permission");
                id
            }
        };

        catalogue.insert(
            (
                resource.to_string(),
                action.to_string(),
                scope.as_str().to_string(),
            ),
            id,
        );
    }

    Ok(catalogue)
}

async fn seed_roles(
    conn: &mut PgConnection,
    catalogue: &HashMap<PermissionKey, Uuid>,
) -> Result<(), sqlx::Error> {
    for (name, description, patterns) in DEFAULT_ROLES {
        let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;

        let role_id = match existing {
            Some(id) => id,
            None => {
                let id: Uuid = sqlx::query_scalar(
                    r#"
                    INSERT INTO roles (id, name, description, is_system)
                    VALUES ($1, $2, $3, TRUE)
                    RETURNING id
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(name)
                .bind(description)
                .fetch_one(&mut *conn)
                .await?;
                tracing::info!(role = %name, "seeded system role");
                id
            }
        };

        for pattern in patterns.iter() {
            for permission_id in expand_pattern(*pattern, catalogue) {
                sqlx::query(
                    r#"
                    INSERT INTO role_permissions (role_id, permission_id)
                    VALUES ($1, $2)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(role_id)
                .bind(permission_id)
                .execute(&mut *conn)
                .await?;
            }
        }
    }

    Ok(())
}

/// Idempotent seed of the permission catalogue and the five system roles.
pub async fn seed_rbac(pool: &PgPool) -> Result<(), ApiError> {
    let mut tx = pool.begin().await?;
    let catalogue = seed_permissions(&mut tx).await?;
    seed_roles(&mut tx, &catalogue).await?;
    tx.commit().await?;
    Ok(())
}

/// Ensure the configured super-admin exists, is active and verified, and
/// holds the Super Admin role. A generated password is surfaced exactly once
/// at startup.
pub async fn ensure_superadmin(pool: &PgPool, config: &Config) -> Result<(), ApiError> {
    let Some(email) = config.superadmin_email.as_deref() else {
        return Ok(());
    };

    let role_id: Uuid = sqlx::query_scalar("SELECT id FROM roles WHERE name = $1")
        .bind(SUPER_ADMIN_ROLE)
        .fetch_one(pool)
        .await?;

    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    if let Some(user_id) = existing {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .execute(pool)
        .await?;
        tracing::info!(%email, "super admin present");
        return Ok(());
    }

    let (password, generated) = match &config.superadmin_password {
        Some(password) => (password.clone(), false),
        None => {
            let password: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(24)
                .map(char::from)
                .collect();
            (password, true)
        }
    };

    let password_hash = hash_password(&password)?;
    let mut tx = pool.begin().await?;
    let user_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO users (id, email, username, password_hash, auth_provider, is_active, is_verified)
        VALUES ($1, $2, 'admin', $3, $4, TRUE, TRUE)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(&password_hash)
    .bind(AUTH_PROVIDER_LOCAL)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
        .bind(user_id)
        .bind(role_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    if generated {
        // The only place this password is ever printed.
        tracing::warn!(%email, %password, "super admin created with generated password, save it now");
    } else {
        tracing::info!(%email, "super admin created");
    }

    Ok(())
}

/// Startup initialization: seed the catalogue and roles, flush the RBAC
/// cache (permission rows may have changed), ensure the super admin.
pub async fn init_database(pool: &PgPool, config: &Config, rbac: &RbacService) -> Result<(), ApiError> {
    seed_rbac(pool).await?;
    rbac.invalidate_all().await;
    ensure_superadmin(pool, config).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue() -> HashMap<PermissionKey, Uuid> {
        DEFAULT_PERMISSIONS
            .iter()
            .map(|(resource, action, scope, _)| {
                (
                    (
                        resource.to_string(),
                        action.to_string(),
                        scope.as_str().to_string(),
                    ),
                    Uuid::new_v4(),
                )
            })
            .collect()
    }

    #[test]
    fn full_wildcard_expands_to_every_permission() {
        let catalogue = catalogue();
        let ids = expand_pattern(("*", "*", Scope::All), &catalogue);
        assert_eq!(ids.len(), DEFAULT_PERMISSIONS.len());
    }

    #[test]
    fn action_wildcard_expands_within_one_resource() {
        let catalogue = catalogue();
        let ids = expand_pattern(("documents", "*", Scope::All), &catalogue);
        let expected = DEFAULT_PERMISSIONS
            .iter()
            .filter(|(resource, _, _, _)| *resource == "documents")
            .count();
        assert_eq!(ids.len(), expected);
    }

    #[test]
    fn exact_pattern_matches_one_or_zero() {
        let catalogue = catalogue();
        assert_eq!(
            expand_pattern(("documents", "read", Scope::Team), &catalogue).len(),
            1
        );
        assert_eq!(
            expand_pattern(("documents", "read", Scope::Own), &catalogue).len(),
            1
        );
        // Not in the catalogue: team-scoped label reads.
        assert_eq!(
            expand_pattern(("labels", "read", Scope::Team), &catalogue).len(),
            0
        );
    }

    #[test]
    fn catalogue_has_no_duplicate_triples() {
        let catalogue = catalogue();
        assert_eq!(catalogue.len(), DEFAULT_PERMISSIONS.len());
    }
}
