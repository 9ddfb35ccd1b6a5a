//! Site content models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;
use validator::Validate;

/// Content collections managed through the admin panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Service,
    Leader,
    Update,
    Achievement,
    Section,
}

impl ContentKind {
    pub const ALL: [ContentKind; 5] = [
        ContentKind::Service,
        ContentKind::Leader,
        ContentKind::Update,
        ContentKind::Achievement,
        ContentKind::Section,
    ];

    /// Storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Service => "service",
            ContentKind::Leader => "leader",
            ContentKind::Update => "update",
            ContentKind::Achievement => "achievement",
            ContentKind::Section => "section",
        }
    }

    /// Route segment and audit resource name
    pub fn collection(&self) -> &'static str {
        match self {
            ContentKind::Service => "services",
            ContentKind::Leader => "leaders",
            ContentKind::Update => "updates",
            ContentKind::Achievement => "achievements",
            ContentKind::Section => "sections",
        }
    }

    pub fn from_collection(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.collection() == segment)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown content kind: {}", s))
    }
}

/// Update categories
pub const UPDATE_TYPES: [&str; 3] = ["news", "job", "announcement"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: Uuid,
    pub kind: ContentKind,
    pub title: String,
    pub body: String,
    pub attributes: serde_json::Value,
    pub is_active: bool,
    pub display_order: i32,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    /// Lookup key of a section; `None` for every other kind
    pub fn section_key(&self) -> Option<&str> {
        match self.kind {
            ContentKind::Section => self.attributes.get("key").and_then(|k| k.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateContentRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attributes: Option<serde_json::Value>,
    pub is_active: Option<bool>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContentRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: Option<String>,
    pub body: Option<String>,
    pub attributes: Option<serde_json::Value>,
    pub is_active: Option<bool>,
    pub display_order: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_segments() {
        assert_eq!(ContentKind::from_collection("leaders"), Some(ContentKind::Leader));
        assert_eq!(ContentKind::from_collection("leader"), None);
        for kind in ContentKind::ALL {
            assert_eq!(kind.as_str().parse::<ContentKind>().unwrap(), kind);
        }
    }
}
