//! Business logic services layer

pub mod audit_service;
pub mod auth_service;
pub mod contact_service;
pub mod content_service;
pub mod dashboard_service;
pub mod mail_service;
pub mod permission_service;
pub mod principal_service;

pub use audit_service::AuditService;
pub use auth_service::AuthService;
pub use contact_service::ContactService;
pub use content_service::ContentService;
pub use dashboard_service::DashboardService;
pub use mail_service::{LogMailer, MailService, Mailer};
pub use permission_service::PermissionService;
pub use principal_service::PrincipalService;
