//! Audit domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Closed set of audited actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Delete,
    Login,
    Logout,
    LoginFailed,
    PasswordChange,
    PasswordReset,
    RoleChange,
    StatusChange,
    BulkOperation,
    Export,
    Import,
    Register,
    EmailVerified,
    PasswordResetRequest,
    UnauthorizedAccess,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Read => "READ",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
            AuditAction::LoginFailed => "LOGIN_FAILED",
            AuditAction::PasswordChange => "PASSWORD_CHANGE",
            AuditAction::PasswordReset => "PASSWORD_RESET",
            AuditAction::RoleChange => "ROLE_CHANGE",
            AuditAction::StatusChange => "STATUS_CHANGE",
            AuditAction::BulkOperation => "BULK_OPERATION",
            AuditAction::Export => "EXPORT",
            AuditAction::Import => "IMPORT",
            AuditAction::Register => "REGISTER",
            AuditAction::EmailVerified => "EMAIL_VERIFIED",
            AuditAction::PasswordResetRequest => "PASSWORD_RESET_REQUEST",
            AuditAction::UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown audit action: {}", s))
    }
}

/// Before/after snapshot of a mutated resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Changes {
    pub before: serde_json::Value,
    pub after: serde_json::Value,
}

/// Immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: Uuid,
    /// None only when no principal could be resolved
    pub actor_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource: String,
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
    pub changes: Option<Changes>,
    pub ip_address: String,
    pub user_agent: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// Event handed to the recorder; id and timestamp are assigned on write
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource: String,
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
    pub changes: Option<Changes>,
    pub ip_address: String,
    pub user_agent: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration_ms: i64,
}

impl AuditEvent {
    pub fn new(action: AuditAction, resource: &str) -> Self {
        Self {
            actor_id: None,
            action,
            resource: resource.to_string(),
            resource_id: None,
            details: serde_json::Value::Object(Default::default()),
            changes: None,
            ip_address: "unknown".to_string(),
            user_agent: "unknown".to_string(),
            success: true,
            error_message: None,
            duration_ms: 0,
        }
    }

    pub fn into_record(self) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            actor_id: self.actor_id,
            action: self.action,
            resource: self.resource,
            resource_id: self.resource_id,
            details: self.details,
            changes: self.changes,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            success: self.success,
            error_message: self.error_message,
            duration_ms: self.duration_ms.max(0),
            created_at: Utc::now(),
        }
    }
}

/// Audit query filters
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub actor_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    pub success: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, r: &AuditRecord) -> bool {
        self.actor_id.map_or(true, |a| r.actor_id == Some(a))
            && self.action.map_or(true, |a| r.action == a)
            && self.resource.as_deref().map_or(true, |res| r.resource == res)
            && self
                .resource_id
                .as_deref()
                .map_or(true, |id| r.resource_id.as_deref() == Some(id))
            && self.success.map_or(true, |s| r.success == s)
            && self.start_date.map_or(true, |t| r.created_at >= t)
            && self.end_date.map_or(true, |t| r.created_at <= t)
    }
}

/// Query string for `GET /audit/logs`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub actor_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    pub success: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl AuditLogQuery {
    pub fn filter(&self) -> AuditFilter {
        AuditFilter {
            actor_id: self.actor_id,
            action: self.action,
            resource: self.resource.clone(),
            resource_id: self.resource_id.clone(),
            success: self.success,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}
