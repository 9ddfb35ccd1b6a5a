//! 内存存储后端
//! 基于 DashMap，实现与 PostgreSQL 相同的存储端口，用于本地开发与测试

use super::{AuditStore, ContactStore, ContentStore, PrincipalStore, RefreshTokenStore};
use crate::{
    error::AppError,
    models::{
        audit::{AuditAction, AuditFilter, AuditRecord},
        auth::RefreshTokenRecord,
        contact::ContactMessage,
        content::{ContentItem, ContentKind},
        dashboard::{self, ActionCount, DailyCount, ResourceTiming},
        principal::{Principal, PrincipalFilter, PrincipalStatus, Role},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    principals: DashMap<Uuid, Principal>,
    /// 邮箱唯一索引
    emails: DashMap<String, Uuid>,
    audit: DashMap<Uuid, AuditRecord>,
    refresh_tokens: DashMap<Uuid, RefreshTokenRecord>,
    content: DashMap<Uuid, ContentItem>,
    /// 栏目 key 唯一索引
    section_keys: DashMap<String, Uuid>,
    contacts: DashMap<Uuid, ContactMessage>,
}

fn page<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

impl MemoryStore {
    fn find_principal(&self, pred: impl Fn(&Principal) -> bool) -> Option<Principal> {
        self.principals
            .iter()
            .find(|entry| pred(entry.value()))
            .map(|entry| entry.value().clone())
    }

    fn filtered_principals(&self, filter: &PrincipalFilter) -> Vec<Principal> {
        let mut items: Vec<Principal> = self
            .principals
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items
    }

    fn filtered_audit(&self, filter: &AuditFilter) -> Vec<AuditRecord> {
        let mut items: Vec<AuditRecord> = self
            .audit
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items
    }
    /// 为栏目登记 key；已被其他栏目占用时返回 409
    fn claim_section_key(&self, item: &ContentItem) -> Result<(), AppError> {
        let Some(key) = item.section_key() else {
            return Ok(());
        };
        match self.section_keys.entry(key.to_string()) {
            Entry::Occupied(entry) if *entry.get() != item.id => Err(AppError::Conflict("Section key".to_string())),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(item.id);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl PrincipalStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>, AppError> {
        Ok(self.principals.get(&id).map(|p| p.value().clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AppError> {
        let id = self.emails.get(email).map(|entry| *entry.value());
        Ok(id.and_then(|id| self.principals.get(&id).map(|p| p.value().clone())))
    }

    async fn find_by_verification_hash(&self, hash: &str) -> Result<Option<Principal>, AppError> {
        Ok(self.find_principal(|p| p.verification_token_hash.as_deref() == Some(hash)))
    }

    async fn find_by_reset_hash(&self, hash: &str) -> Result<Option<Principal>, AppError> {
        Ok(self.find_principal(|p| p.reset_token_hash.as_deref() == Some(hash)))
    }

    async fn insert(&self, principal: &Principal) -> Result<(), AppError> {
        match self.emails.entry(principal.email.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict("email".to_string())),
            Entry::Vacant(slot) => {
                slot.insert(principal.id);
                self.principals.insert(principal.id, principal.clone());
                Ok(())
            }
        }
    }

    async fn save(&self, principal: &Principal) -> Result<(), AppError> {
        let previous_email = match self.principals.get(&principal.id) {
            Some(existing) => existing.email.clone(),
            None => return Err(AppError::not_found("User")),
        };

        if previous_email != principal.email {
            match self.emails.entry(principal.email.clone()) {
                Entry::Occupied(entry) if *entry.get() != principal.id => {
                    return Err(AppError::Conflict("email".to_string()));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(slot) => {
                    slot.insert(principal.id);
                }
            }
            self.emails.remove(&previous_email);
        }

        self.principals.insert(principal.id, principal.clone());
        Ok(())
    }

    async fn list(&self, filter: &PrincipalFilter, limit: i64, offset: i64) -> Result<Vec<Principal>, AppError> {
        Ok(page(self.filtered_principals(filter), limit, offset))
    }

    async fn count(&self, filter: &PrincipalFilter) -> Result<i64, AppError> {
        Ok(self
            .principals
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .count() as i64)
    }

    async fn set_status_many(
        &self,
        ids: &[Uuid],
        status: PrincipalStatus,
        updated_by: Uuid,
    ) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut affected = 0;
        for id in ids {
            if let Some(mut p) = self.principals.get_mut(id) {
                p.status = status;
                p.updated_by = Some(updated_by);
                p.updated_at = now;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn count_by_role(&self) -> Result<Vec<(Role, i64)>, AppError> {
        let mut counts: HashMap<Role, i64> = HashMap::new();
        for entry in self.principals.iter() {
            *counts.entry(entry.role).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn count_by_status(&self) -> Result<Vec<(PrincipalStatus, i64)>, AppError> {
        let mut counts: HashMap<PrincipalStatus, i64> = HashMap::new();
        for entry in self.principals.iter() {
            *counts.entry(entry.status).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
    async fn created_per_day(&self, since: DateTime<Utc>) -> Result<Vec<DailyCount>, AppError> {
        Ok(dashboard::daily_counts(
            self.principals
                .iter()
                .map(|entry| entry.created_at)
                .filter(|at| *at >= since),
        ))
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert(&self, record: &AuditRecord) -> Result<(), AppError> {
        self.audit.insert(record.id, record.clone());
        Ok(())
    }

    async fn query(&self, filter: &AuditFilter, limit: i64, offset: i64) -> Result<Vec<AuditRecord>, AppError> {
        Ok(page(self.filtered_audit(filter), limit, offset))
    }

    async fn count(&self, filter: &AuditFilter) -> Result<i64, AppError> {
        Ok(self
            .audit
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .count() as i64)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let before = self.audit.len();
        self.audit.retain(|_, record| record.created_at >= cutoff);
        Ok(before.saturating_sub(self.audit.len()) as u64)
    }
    async fn daily_counts(&self, filter: &AuditFilter) -> Result<Vec<DailyCount>, AppError> {
        Ok(dashboard::daily_counts(
            self.filtered_audit(filter).into_iter().map(|r| r.created_at),
        ))
    }

    async fn action_counts(&self, filter: &AuditFilter, limit: i64) -> Result<Vec<ActionCount>, AppError> {
        let mut counts: HashMap<AuditAction, i64> = HashMap::new();
        for record in self.filtered_audit(filter) {
            *counts.entry(record.action).or_default() += 1;
        }

        let mut items: Vec<ActionCount> = counts
            .into_iter()
            .map(|(action, count)| ActionCount { action, count })
            .collect();
        items.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.action.as_str().cmp(b.action.as_str()))
        });
        Ok(page(items, limit, 0))
    }

    async fn resource_timings(&self, filter: &AuditFilter, limit: i64) -> Result<Vec<ResourceTiming>, AppError> {
        let mut totals: HashMap<String, (i64, i64)> = HashMap::new();
        for record in self.filtered_audit(filter) {
            let slot = totals.entry(record.resource).or_default();
            slot.0 += record.duration_ms;
            slot.1 += 1;
        }

        let mut items: Vec<ResourceTiming> = totals
            .into_iter()
            .map(|(resource, (sum, n))| ResourceTiming {
                resource,
                avg_duration_ms: (sum as f64 / n as f64).round() as i64,
                request_count: n,
            })
            .collect();
        items.sort_by(|a, b| {
            b.avg_duration_ms
                .cmp(&a.avg_duration_ms)
                .then_with(|| a.resource.cmp(&b.resource))
        });
        Ok(page(items, limit, 0))
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn store(&self, record: &RefreshTokenRecord) -> Result<(), AppError> {
        self.refresh_tokens.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        Ok(self
            .refresh_tokens
            .iter()
            .find(|entry| entry.token_hash == token_hash)
            .map(|entry| entry.value().clone()))
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, AppError> {
        match self.refresh_tokens.get_mut(&id) {
            Some(mut record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all(&self, principal_id: Uuid) -> Result<u64, AppError> {
        let now = Utc::now();
        let mut revoked = 0;
        for mut record in self.refresh_tokens.iter_mut() {
            if record.principal_id == principal_id && record.revoked_at.is_none() {
                record.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|_, record| record.expires_at >= now);
        Ok(before.saturating_sub(self.refresh_tokens.len()) as u64)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn list(&self, kind: ContentKind, include_inactive: bool) -> Result<Vec<ContentItem>, AppError> {
        let mut items: Vec<ContentItem> = self
            .content
            .iter()
            .filter(|entry| entry.kind == kind && (include_inactive || entry.is_active))
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(items)
    }

    async fn find(&self, kind: ContentKind, id: Uuid) -> Result<Option<ContentItem>, AppError> {
        Ok(self
            .content
            .get(&id)
            .filter(|item| item.kind == kind)
            .map(|item| item.value().clone()))
    }

    async fn insert(&self, item: &ContentItem) -> Result<(), AppError> {
        self.claim_section_key(item)?;
        self.content.insert(item.id, item.clone());
        Ok(())
    }

    async fn update(&self, item: &ContentItem) -> Result<(), AppError> {
        let previous_key = match self.content.get(&item.id) {
            Some(existing) if existing.kind == item.kind => existing.section_key().map(str::to_string),
            _ => return Err(AppError::not_found("Content")),
        };

        if previous_key.as_deref() != item.section_key() {
            self.claim_section_key(item)?;
            if let Some(key) = previous_key {
                self.section_keys.remove(&key);
            }
        }

        self.content.insert(item.id, item.clone());
        Ok(())
    }

    async fn delete(&self, kind: ContentKind, id: Uuid) -> Result<bool, AppError> {
        let removed = self.content.remove_if(&id, |_, item| item.kind == kind);
        if let Some(key) = removed.as_ref().and_then(|(_, item)| item.section_key()) {
            self.section_keys.remove(key);
        }
        Ok(removed.is_some())
    }

    async fn count_by_kind(&self) -> Result<Vec<(ContentKind, i64, i64)>, AppError> {
        let mut counts: HashMap<ContentKind, (i64, i64)> = HashMap::new();
        for entry in self.content.iter() {
            let slot = counts.entry(entry.kind).or_default();
            slot.0 += 1;
            if entry.is_active {
                slot.1 += 1;
            }
        }
        Ok(counts.into_iter().map(|(k, (t, a))| (k, t, a)).collect())
    }
    async fn created_per_day(&self, since: DateTime<Utc>) -> Result<Vec<DailyCount>, AppError> {
        Ok(dashboard::daily_counts(
            self.content
                .iter()
                .map(|entry| entry.created_at)
                .filter(|at| *at >= since),
        ))
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn insert(&self, message: &ContactMessage) -> Result<(), AppError> {
        self.contacts.insert(message.id, message.clone());
        Ok(())
    }

    async fn list(&self, unread_only: bool, limit: i64, offset: i64) -> Result<Vec<ContactMessage>, AppError> {
        let mut items: Vec<ContactMessage> = self
            .contacts
            .iter()
            .filter(|entry| !(unread_only && entry.is_read))
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(items, limit, offset))
    }

    async fn count(&self, unread_only: bool) -> Result<i64, AppError> {
        Ok(self
            .contacts
            .iter()
            .filter(|entry| !(unread_only && entry.is_read))
            .count() as i64)
    }

    async fn find(&self, id: Uuid) -> Result<Option<ContactMessage>, AppError> {
        Ok(self.contacts.get(&id).map(|m| m.value().clone()))
    }

    async fn mark_read(&self, id: Uuid, reader: Uuid) -> Result<Option<ContactMessage>, AppError> {
        Ok(self.contacts.get_mut(&id).map(|mut message| {
            message.mark_read(reader, Utc::now());
            message.value().clone()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{audit::AuditEvent, contact::ContactRequest};
    use chrono::Duration;
    use serde_json::json;

    fn principal(email: &str) -> Principal {
        Principal::new(email, "hash".into(), "Test User", Role::User, PrincipalStatus::Active)
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryStore::default();
        PrincipalStore::insert(&store, &principal("a@union.org")).await.unwrap();

        let err = PrincipalStore::insert(&store, &principal("a@union.org")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(field) if field == "email"));
    }

    #[tokio::test]
    async fn test_save_moves_email_index() {
        let store = MemoryStore::default();
        let mut p = principal("old@union.org");
        PrincipalStore::insert(&store, &p).await.unwrap();
        PrincipalStore::insert(&store, &principal("taken@union.org")).await.unwrap();

        p.email = "taken@union.org".into();
        assert!(matches!(store.save(&p).await, Err(AppError::Conflict(_))));

        p.email = "new@union.org".into();
        store.save(&p).await.unwrap();
        assert!(store.find_by_email("old@union.org").await.unwrap().is_none());
        assert_eq!(store.find_by_email("new@union.org").await.unwrap().unwrap().id, p.id);
    }

    #[tokio::test]
    async fn test_audit_purge_keeps_recent_records() {
        let store = MemoryStore::default();
        let mut old = AuditEvent::new(AuditAction::Read, "users").into_record();
        old.created_at = Utc::now() - Duration::days(400);
        let fresh = AuditEvent::new(AuditAction::Read, "users").into_record();
        AuditStore::insert(&store, &old).await.unwrap();
        AuditStore::insert(&store, &fresh).await.unwrap();

        let purged = store.purge_older_than(Utc::now() - Duration::days(365)).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(AuditStore::count(&store, &AuditFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_revoke_is_one_shot() {
        let store = MemoryStore::default();
        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            token_hash: "abc".into(),
            principal_id: Uuid::new_v4(),
            user_agent: None,
            ip_address: "127.0.0.1".into(),
            expires_at: Utc::now() + Duration::days(1),
            revoked_at: None,
            rotated_from: None,
            created_at: Utc::now(),
        };
        store.store(&record).await.unwrap();

        assert!(store.revoke(record.id).await.unwrap());
        assert!(!store.revoke(record.id).await.unwrap());
    }

    fn section(key: &str) -> ContentItem {
        let now = Utc::now();
        ContentItem {
            id: Uuid::new_v4(),
            kind: ContentKind::Section,
            title: key.to_string(),
            body: String::new(),
            attributes: json!({ "key": key }),
            is_active: true,
            display_order: 0,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_section_keys_are_unique() {
        let store = MemoryStore::default();
        let hero = section("hero");
        let mut footer = section("footer");
        ContentStore::insert(&store, &hero).await.unwrap();
        ContentStore::insert(&store, &footer).await.unwrap();

        let err = ContentStore::insert(&store, &section("hero")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(field) if field == "Section key"));

        footer.attributes = json!({ "key": "hero" });
        assert!(matches!(store.update(&footer).await, Err(AppError::Conflict(_))));

        // 改名后旧 key 释放
        footer.attributes = json!({ "key": "contact" });
        store.update(&footer).await.unwrap();
        ContentStore::insert(&store, &section("footer")).await.unwrap();

        assert!(store.delete(ContentKind::Section, hero.id).await.unwrap());
        ContentStore::insert(&store, &section("hero")).await.unwrap();
    }

    #[tokio::test]
    async fn test_audit_aggregates() {
        let store = MemoryStore::default();
        let mut events = Vec::new();
        for (action, resource, duration_ms) in [
            (AuditAction::Read, "users", 10),
            (AuditAction::Read, "users", 30),
            (AuditAction::Read, "content", 5),
            (AuditAction::Update, "users", 20),
        ] {
            let mut event = AuditEvent::new(action, resource);
            event.duration_ms = duration_ms;
            events.push(event.into_record());
        }
        let mut old = AuditEvent::new(AuditAction::Delete, "users").into_record();
        old.created_at = Utc::now() - Duration::days(3);
        events.push(old);
        for record in &events {
            AuditStore::insert(&store, record).await.unwrap();
        }

        let everything = AuditFilter::default();
        let top = store.action_counts(&everything, 2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!((top[0].action, top[0].count), (AuditAction::Read, 3));

        let timings = store.resource_timings(&everything, 10).await.unwrap();
        assert_eq!(timings[0].resource, "users");
        assert_eq!(timings[0].avg_duration_ms, 15);
        assert_eq!(timings[0].request_count, 4);
        assert_eq!(timings[1].avg_duration_ms, 5);

        let days = store.daily_counts(&everything).await.unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].count, 1);
        assert_eq!(days[1].count, 4);
    }

    #[tokio::test]
    async fn test_contact_unread_filter_and_first_reader() {
        let store = MemoryStore::default();
        let message = ContactMessage::new(
            ContactRequest {
                name: "Sam".into(),
                email: "sam@example.org".into(),
                phone: None,
                subject: "Dues".into(),
                message: "When are dues collected this year?".into(),
            },
            "10.0.0.1",
        );
        ContactStore::insert(&store, &message).await.unwrap();
        assert_eq!(ContactStore::count(&store, true).await.unwrap(), 1);

        let reader = Uuid::new_v4();
        store.mark_read(message.id, reader).await.unwrap();
        let again = store.mark_read(message.id, Uuid::new_v4()).await.unwrap().unwrap();

        assert_eq!(again.read_by, Some(reader));
        assert_eq!(ContactStore::count(&store, true).await.unwrap(), 0);
        assert!(ContactStore::list(&store, true, 10, 0).await.unwrap().is_empty());
        assert!(store.mark_read(Uuid::new_v4(), reader).await.unwrap().is_none());
    }
}
