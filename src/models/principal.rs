//! Principal domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;
use validator::Validate;

/// Closed role set, ordered from most to least privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Moderator,
    User,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::Moderator, Role::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Account status; only `Active` passes the auth gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalStatus {
    Active,
    Inactive,
    Suspended,
    Pending,
}

impl PrincipalStatus {
    pub const ALL: [PrincipalStatus; 4] = [
        PrincipalStatus::Active,
        PrincipalStatus::Inactive,
        PrincipalStatus::Suspended,
        PrincipalStatus::Pending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalStatus::Active => "active",
            PrincipalStatus::Inactive => "inactive",
            PrincipalStatus::Suspended => "suspended",
            PrincipalStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for PrincipalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PrincipalStatus::Active),
            "inactive" => Ok(PrincipalStatus::Inactive),
            "suspended" => Ok(PrincipalStatus::Suspended),
            "pending" => Ok(PrincipalStatus::Pending),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Stored principal record
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub status: PrincipalStatus,

    pub phone: Option<String>,
    pub department: Option<String>,

    // Verification and reset state (hashes only)
    pub email_verified: bool,
    pub verification_token_hash: Option<String>,
    pub reset_token_hash: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,

    pub last_login_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    /// Build a fresh principal; the email is normalized here.
    pub fn new(email: &str, password_hash: String, name: &str, role: Role, status: PrincipalStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            password_hash,
            name: name.trim().to_string(),
            role,
            status,
            phone: None,
            department: None,
            email_verified: false,
            verification_token_hash: None,
            reset_token_hash: None,
            reset_token_expires_at: None,
            last_login_at: None,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PrincipalStatus::Active
    }
}

/// Lower-case and trim an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Principal view without secret fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub status: PrincipalStatus,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub email_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Principal> for PrincipalResponse {
    fn from(p: &Principal) -> Self {
        Self {
            id: p.id,
            email: p.email.clone(),
            name: p.name.clone(),
            role: p.role,
            status: p.status,
            phone: p.phone.clone(),
            department: p.department.clone(),
            email_verified: p.email_verified,
            last_login_at: p.last_login_at,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

impl From<Principal> for PrincipalResponse {
    fn from(p: Principal) -> Self {
        PrincipalResponse::from(&p)
    }
}

/// Admin-side create request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrincipalRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: String,
    pub role: Option<Role>,
    pub status: Option<PrincipalStatus>,
    #[validate(length(max = 30, message = "Phone is too long"))]
    pub phone: Option<String>,
    #[validate(length(max = 100, message = "Department is too long"))]
    pub department: Option<String>,
}

/// Partial update; `role` and `status` are stripped when a principal edits itself
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePrincipalRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: Option<String>,
    pub role: Option<Role>,
    pub status: Option<PrincipalStatus>,
    #[validate(length(max = 30, message = "Phone is too long"))]
    pub phone: Option<String>,
    #[validate(length(max = 100, message = "Department is too long"))]
    pub department: Option<String>,
}

impl UpdatePrincipalRequest {
    pub fn without_privileged_fields(mut self) -> Self {
        self.role = None;
        self.status = None;
        self
    }
}

/// Listing filter
#[derive(Debug, Clone, Default)]
pub struct PrincipalFilter {
    pub role: Option<Role>,
    pub status: Option<PrincipalStatus>,
    /// Case-insensitive match over name, email and department
    pub search: Option<String>,
}

impl PrincipalFilter {
    pub fn matches(&self, p: &Principal) -> bool {
        if self.role.is_some_and(|r| r != p.role) {
            return false;
        }
        if self.status.is_some_and(|s| s != p.status) {
            return false;
        }
        match self.search.as_deref().map(|s| s.trim().to_lowercase()) {
            Some(needle) if !needle.is_empty() => {
                p.name.to_lowercase().contains(&needle)
                    || p.email.contains(&needle)
                    || p
                        .department
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

/// Query string for `GET /users`
#[derive(Debug, Deserialize)]
pub struct ListPrincipalsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub role: Option<Role>,
    pub status: Option<PrincipalStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Activate,
    Deactivate,
    Delete,
    Export,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkRequest {
    pub action: BulkAction,
    #[validate(length(min = 1, message = "At least one user id is required"))]
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResponse {
    pub action: BulkAction,
    pub affected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<PrincipalResponse>>,
}

/// Detail view with recent activity
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalDetailResponse {
    pub user: PrincipalResponse,
    pub recent_activity: Vec<crate::models::audit::AuditRecord>,
}
