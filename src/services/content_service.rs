//! 站点内容服务

use crate::{
    auth::{middleware::AuthContext, privileged::Outcome},
    error::{AppError, FieldError},
    models::{
        auth::MessageResponse,
        content::{ContentItem, ContentKind, CreateContentRequest, UpdateContentRequest, UPDATE_TYPES},
    },
    repository::ContentStore,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

pub struct ContentService {
    store: Arc<dyn ContentStore>,
}

fn required_str<'a>(attrs: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    attrs
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn is_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(s).is_ok()
}

/// 按内容类型校验并补全属性
pub fn normalize_attributes(kind: ContentKind, attributes: Option<Value>) -> Result<Value, AppError> {
    let mut attrs = match attributes {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(AppError::invalid_field("attributes", "Attributes must be an object")),
    };

    let mut errors = Vec::new();
    match kind {
        ContentKind::Leader => {
            if required_str(&attrs, "position").is_none() {
                errors.push(FieldError::new("attributes.position", "Position is required"));
            }
        }
        ContentKind::Achievement => match required_str(&attrs, "date") {
            Some(date) if is_date(date) => {}
            Some(_) => errors.push(FieldError::new("attributes.date", "Date must be YYYY-MM-DD or RFC 3339")),
            None => errors.push(FieldError::new("attributes.date", "Date is required")),
        },
        ContentKind::Section => match required_str(&attrs, "key").map(str::to_string) {
            Some(key) => {
                attrs.insert("key".to_string(), Value::String(key));
            }
            None => errors.push(FieldError::new("attributes.key", "Section key is required")),
        },
        ContentKind::Update => match attrs.get("type") {
            None | Some(Value::Null) => {
                attrs.insert("type".to_string(), Value::String("news".to_string()));
            }
            Some(Value::String(t)) if UPDATE_TYPES.contains(&t.as_str()) => {}
            Some(_) => errors.push(FieldError::new(
                "attributes.type",
                "Type must be one of: news, job, announcement",
            )),
        },
        ContentKind::Service => {}
    }

    if errors.is_empty() {
        Ok(Value::Object(attrs))
    } else {
        Err(AppError::Validation(errors))
    }
}

impl ContentService {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// 公开列表：仅启用的内容
    pub async fn list_public(&self, kind: ContentKind) -> Result<Vec<ContentItem>, AppError> {
        self.store.list(kind, false).await
    }

    /// 公开详情：停用内容视为不存在
    pub async fn get_public(&self, kind: ContentKind, id: Uuid) -> Result<ContentItem, AppError> {
        self.store
            .find(kind, id)
            .await?
            .filter(|item| item.is_active)
            .ok_or_else(|| AppError::not_found("Content"))
    }

    /// 管理端列表：包含停用内容
    pub async fn list_all(&self, kind: ContentKind) -> Result<Outcome<Vec<ContentItem>>, AppError> {
        let items = self.store.list(kind, true).await?;
        let count = items.len();
        Ok(Outcome::new(items).with_detail("returned", Value::from(count)))
    }

    pub async fn create(
        &self,
        ctx: &AuthContext,
        kind: ContentKind,
        req: CreateContentRequest,
    ) -> Result<Outcome<ContentItem>, AppError> {
        let attributes = normalize_attributes(kind, req.attributes)?;
        let now = Utc::now();
        let item = ContentItem {
            id: Uuid::new_v4(),
            kind,
            title: req.title.trim().to_string(),
            body: req.body,
            attributes,
            is_active: req.is_active.unwrap_or(true),
            display_order: req.display_order.unwrap_or(0),
            created_by: Some(ctx.id()),
            updated_by: Some(ctx.id()),
            created_at: now,
            updated_at: now,
        };

        self.store.insert(&item).await?;
        tracing::info!(content_id = %item.id, kind = %kind, "Content created");

        let after = serde_json::to_value(&item).unwrap_or(Value::Null);
        Ok(Outcome::new(item.clone())
            .with_resource_id(item.id)
            .with_changes(Value::Null, after))
    }

    pub async fn update(
        &self,
        ctx: &AuthContext,
        kind: ContentKind,
        id: Uuid,
        req: UpdateContentRequest,
    ) -> Result<Outcome<ContentItem>, AppError> {
        let mut item = self
            .store
            .find(kind, id)
            .await?
            .ok_or_else(|| AppError::not_found("Content"))?;
        let before = serde_json::to_value(&item).unwrap_or(Value::Null);

        if let Some(patch) = req.attributes {
            let Value::Object(patch) = patch else {
                return Err(AppError::invalid_field("attributes", "Attributes must be an object"));
            };
            let mut merged = match item.attributes.take() {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            merged.extend(patch);
            item.attributes = Value::Object(merged);
        }
        item.attributes = normalize_attributes(kind, Some(item.attributes.take()))?;

        if let Some(title) = req.title {
            item.title = title.trim().to_string();
        }
        if let Some(body) = req.body {
            item.body = body;
        }
        if let Some(is_active) = req.is_active {
            item.is_active = is_active;
        }
        if let Some(order) = req.display_order {
            item.display_order = order;
        }
        item.updated_by = Some(ctx.id());
        item.updated_at = Utc::now();

        self.store.update(&item).await?;

        let after = serde_json::to_value(&item).unwrap_or(Value::Null);
        Ok(Outcome::new(item).with_changes(before, after))
    }

    pub async fn delete(&self, kind: ContentKind, id: Uuid) -> Result<Outcome<MessageResponse>, AppError> {
        let item = self
            .store
            .find(kind, id)
            .await?
            .ok_or_else(|| AppError::not_found("Content"))?;

        if !self.store.delete(kind, id).await? {
            return Err(AppError::not_found("Content"));
        }

        let before = serde_json::to_value(&item).unwrap_or(Value::Null);
        Ok(Outcome::new(MessageResponse::new("Content deleted successfully"))
            .with_changes(before, Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_leader_requires_position() {
        assert!(normalize_attributes(ContentKind::Leader, None).is_err());
        assert!(normalize_attributes(ContentKind::Leader, Some(json!({"position": "President"}))).is_ok());
    }

    #[test]
    fn test_update_type_defaults_to_news() {
        let attrs = normalize_attributes(ContentKind::Update, None).unwrap();
        assert_eq!(attrs["type"], "news");

        assert!(normalize_attributes(ContentKind::Update, Some(json!({"type": "gossip"}))).is_err());
        assert!(normalize_attributes(ContentKind::Update, Some(json!({"type": "job"}))).is_ok());
    }

    #[test]
    fn test_achievement_date_format() {
        assert!(normalize_attributes(ContentKind::Achievement, Some(json!({"date": "2024-05-01"}))).is_ok());
        assert!(normalize_attributes(ContentKind::Achievement, Some(json!({"date": "May 1st"}))).is_err());
    }

    #[test]
    fn test_section_key_is_trimmed() {
        let attrs = normalize_attributes(ContentKind::Section, Some(json!({"key": "  hero "}))).unwrap();
        assert_eq!(attrs["key"], "hero");
        assert!(normalize_attributes(ContentKind::Section, Some(json!({"key": "   "}))).is_err());
    }

    #[test]
    fn test_attributes_must_be_object() {
        let err = normalize_attributes(ContentKind::Service, Some(json!([1, 2]))).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
