use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;
use validator::Validate;

/// Visibility tiers form a total order: a held scope satisfies any required
/// scope at or below it. There is no wildcard scope; `all` already covers
/// everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Own,
    Team,
    All,
}

impl Scope {
    pub fn rank(self) -> u8 {
        match self {
            Self::Own => 0,
            Self::Team => 1,
            Self::All => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Own => "own",
            Self::Team => "team",
            Self::All => "all",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "own" => Some(Self::Own),
            "team" => Some(Self::Team),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn satisfies(self, required: Self) -> bool {
        self.rank() >= required.rank()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Permission {
    pub id: Uuid,
    pub resource: String,
    pub action: String,
    pub scope: String,
    pub description: Option<String>,
}

impl Permission {
    /// `resource:action:scope` form used in log lines and error details.
    pub fn permission_string(&self) -> String {
        format!("{}:{}:{}", self.resource, self.action, self.scope)
    }
}

/// One entry of a user's effective permission set; also the cached form.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub resource: String,
    pub action: String,
    pub scope: String,
}

impl PermissionGrant {
    /// Wildcard `*` matches any resource or action; the scope comparison is
    /// by rank, never by equality.
    pub fn satisfies(&self, resource: &str, action: &str, required: Scope) -> bool {
        let resource_match = self.resource == resource || self.resource == "*";
        let action_match = self.action == action || self.action == "*";
        if !resource_match || !action_match {
            return false;
        }
        match Scope::parse(&self.scope) {
            Some(held) => held.satisfies(required),
            None => false,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RoleBrief {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub permissions: Vec<Permission>,
}

impl RoleResponse {
    pub fn from_parts(role: Role, permissions: Vec<Permission>) -> Self {
        Self {
            id: role.id,
            name: role.name,
            description: role.description,
            is_system: role.is_system,
            created_at: role.created_at,
            updated_at: role.updated_at,
            permissions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleListResponse {
    pub items: Vec<RoleResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct PermissionListResponse {
    pub items: Vec<Permission>,
    pub total: usize,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RoleCreateRequest {
    #[validate(length(min = 1, max = 100, message = "Role name must be 1-100 characters"))]
    pub name: String,

    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RoleUpdateRequest {
    #[validate(length(min = 1, max = 100, message = "Role name must be 1-100 characters"))]
    pub name: Option<String>,

    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PermissionAssignRequest {
    pub permission_ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(resource: &str, action: &str, scope: &str) -> PermissionGrant {
        PermissionGrant {
            resource: resource.to_string(),
            action: action.to_string(),
            scope: scope.to_string(),
        }
    }

    #[test]
    fn scope_order_is_total() {
        assert!(Scope::All.satisfies(Scope::Own));
        assert!(Scope::All.satisfies(Scope::Team));
        assert!(Scope::All.satisfies(Scope::All));
        assert!(Scope::Team.satisfies(Scope::Own));
        assert!(!Scope::Team.satisfies(Scope::All));
        assert!(!Scope::Own.satisfies(Scope::Team));
    }

    #[test]
    fn literal_star_scope_is_not_admissible() {
        assert_eq!(Scope::parse("*"), None);
        assert_eq!(Scope::parse("global"), None);
        assert!(!grant("documents", "read", "*").satisfies("documents", "read", Scope::Own));
    }

    #[test]
    fn held_scope_satisfies_narrower_requests() {
        let held = grant("documents", "read", "all");
        assert!(held.satisfies("documents", "read", Scope::Own));
        assert!(held.satisfies("documents", "read", Scope::Team));
        assert!(held.satisfies("documents", "read", Scope::All));

        let own_only = grant("documents", "read", "own");
        assert!(own_only.satisfies("documents", "read", Scope::Own));
        assert!(!own_only.satisfies("documents", "read", Scope::Team));
        assert!(!own_only.satisfies("documents", "read", Scope::All));
    }

    #[test]
    fn wildcards_subsume_concrete_coordinates() {
        let any_action = grant("documents", "*", "all");
        assert!(any_action.satisfies("documents", "delete", Scope::All));
        assert!(!any_action.satisfies("roles", "delete", Scope::Own));

        let full = grant("*", "*", "all");
        assert!(full.satisfies("roles", "create", Scope::All));
        assert!(full.satisfies("documents", "read", Scope::Own));
        assert!(full.satisfies("watch_folders", "update", Scope::Team));
    }

    #[test]
    fn resource_and_action_must_both_match() {
        let held = grant("documents", "read", "all");
        assert!(!held.satisfies("documents", "update", Scope::Own));
        assert!(!held.satisfies("labels", "read", Scope::Own));
    }
}
