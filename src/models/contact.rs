//! Contact form model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ContactRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be between 2 and 100 characters"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(max = 30, message = "Phone is too long"))]
    pub phone: Option<String>,
    #[validate(length(min = 2, max = 200, message = "Subject must be between 2 and 200 characters"))]
    pub subject: String,
    #[validate(length(min = 10, max = 5000, message = "Message must be between 10 and 5000 characters"))]
    pub message: String,
}

/// A stored contact-form submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
    pub ip_address: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub read_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ContactMessage {
    pub fn new(req: ContactRequest, ip_address: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: req.name.trim().to_string(),
            email: req.email.trim().to_lowercase(),
            phone: req.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
            subject: req.subject.trim().to_string(),
            message: req.message.trim().to_string(),
            ip_address: ip_address.into(),
            is_read: false,
            read_at: None,
            read_by: None,
            created_at: Utc::now(),
        }
    }

    /// Record the first read; later reads keep the original reader
    pub fn mark_read(&mut self, reader: Uuid, at: DateTime<Utc>) {
        if !self.is_read {
            self.is_read = true;
            self.read_at = Some(at);
            self.read_by = Some(reader);
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ContactListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub unread: Option<bool>,
}
