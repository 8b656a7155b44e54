pub mod models;
pub mod service;

pub use models::{AuditAction, AuditContext, AuditLog};
pub use service::AuditService;
