pub mod catalog;
pub mod models;
pub mod routes;
pub mod seed;
pub mod service;

pub use models::{Permission, PermissionGrant, Role, RoleBrief, Scope};
pub use service::RbacService;
