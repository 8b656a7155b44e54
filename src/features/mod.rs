pub mod audit;
pub mod auth;
pub mod documents;
pub mod oidc;
pub mod rate_limit;
pub mod rbac;
pub mod search;
pub mod users;
