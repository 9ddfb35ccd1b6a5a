//! 数据访问层
//! 存储端口（trait）与 PostgreSQL / 内存两种实现

pub mod audit_repo;
pub mod contact_repo;
pub mod content_repo;
pub mod memory;
pub mod principal_repo;
pub mod token_repo;

use crate::{
    error::AppError,
    models::{
        audit::{AuditFilter, AuditRecord},
        auth::RefreshTokenRecord,
        contact::ContactMessage,
        content::{ContentItem, ContentKind},
        dashboard::{ActionCount, DailyCount, ResourceTiming},
        principal::{Principal, PrincipalFilter, PrincipalStatus, Role},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub use audit_repo::AuditRepository as PgAuditRepository;
pub use contact_repo::ContactRepository as PgContactRepository;
pub use content_repo::ContentRepository as PgContentRepository;
pub use memory::MemoryStore;
pub use principal_repo::PrincipalRepository as PgPrincipalRepository;
pub use token_repo::RefreshTokenRepository as PgRefreshTokenRepository;

/// 主体（账户）存储
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>, AppError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AppError>;
    async fn find_by_verification_hash(&self, hash: &str) -> Result<Option<Principal>, AppError>;
    async fn find_by_reset_hash(&self, hash: &str) -> Result<Option<Principal>, AppError>;
    /// 邮箱重复时返回 `Conflict("email")`
    async fn insert(&self, principal: &Principal) -> Result<(), AppError>;
    /// 整行覆盖写入；邮箱与他人冲突时返回 `Conflict("email")`
    async fn save(&self, principal: &Principal) -> Result<(), AppError>;
    async fn list(&self, filter: &PrincipalFilter, limit: i64, offset: i64) -> Result<Vec<Principal>, AppError>;
    async fn count(&self, filter: &PrincipalFilter) -> Result<i64, AppError>;
    /// 批量修改状态，返回受影响行数
    async fn set_status_many(
        &self,
        ids: &[Uuid],
        status: PrincipalStatus,
        updated_by: Uuid,
    ) -> Result<u64, AppError>;
    async fn count_by_role(&self) -> Result<Vec<(Role, i64)>, AppError>;
    async fn count_by_status(&self) -> Result<Vec<(PrincipalStatus, i64)>, AppError>;
    /// 自 `since` 起每个 UTC 自然日的注册数，按日期升序
    async fn created_per_day(&self, since: DateTime<Utc>) -> Result<Vec<DailyCount>, AppError>;
}

/// 审计存储：只追加，不提供更新接口
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, record: &AuditRecord) -> Result<(), AppError>;
    async fn query(&self, filter: &AuditFilter, limit: i64, offset: i64) -> Result<Vec<AuditRecord>, AppError>;
    async fn count(&self, filter: &AuditFilter) -> Result<i64, AppError>;
    /// 删除早于 `cutoff` 的记录，返回删除条数
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;
    /// 每个 UTC 自然日的记录数，按日期升序
    async fn daily_counts(&self, filter: &AuditFilter) -> Result<Vec<DailyCount>, AppError>;
    /// 按动作分组计数，次数降序
    async fn action_counts(&self, filter: &AuditFilter, limit: i64) -> Result<Vec<ActionCount>, AppError>;
    /// 按资源分组的平均耗时，耗时降序
    async fn resource_timings(&self, filter: &AuditFilter, limit: i64) -> Result<Vec<ResourceTiming>, AppError>;
}

/// 刷新令牌登记表
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn store(&self, record: &RefreshTokenRecord) -> Result<(), AppError>;
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AppError>;
    /// 仅在未吊销时吊销；返回是否由本次调用吊销
    async fn revoke(&self, id: Uuid) -> Result<bool, AppError>;
    async fn revoke_all(&self, principal_id: Uuid) -> Result<u64, AppError>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

/// 站点内容存储
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// 按 display_order 升序、创建时间降序
    async fn list(&self, kind: ContentKind, include_inactive: bool) -> Result<Vec<ContentItem>, AppError>;
    async fn find(&self, kind: ContentKind, id: Uuid) -> Result<Option<ContentItem>, AppError>;
    /// 栏目 key 重复时返回 `Conflict("Section key")`
    async fn insert(&self, item: &ContentItem) -> Result<(), AppError>;
    async fn update(&self, item: &ContentItem) -> Result<(), AppError>;
    /// 返回是否删除了记录
    async fn delete(&self, kind: ContentKind, id: Uuid) -> Result<bool, AppError>;
    /// (kind, total, active)
    async fn count_by_kind(&self) -> Result<Vec<(ContentKind, i64, i64)>, AppError>;
    /// 自 `since` 起每个 UTC 自然日新建的内容数，按日期升序
    async fn created_per_day(&self, since: DateTime<Utc>) -> Result<Vec<DailyCount>, AppError>;
}

/// 联系表单留言
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn insert(&self, message: &ContactMessage) -> Result<(), AppError>;
    /// 按提交时间倒序
    async fn list(&self, unread_only: bool, limit: i64, offset: i64) -> Result<Vec<ContactMessage>, AppError>;
    async fn count(&self, unread_only: bool) -> Result<i64, AppError>;
    async fn find(&self, id: Uuid) -> Result<Option<ContactMessage>, AppError>;
    /// 首次阅读时记录阅读人与时间，返回更新后的留言
    async fn mark_read(&self, id: Uuid, reader: Uuid) -> Result<Option<ContactMessage>, AppError>;
}

/// 在进程入口组装好的存储集合
#[derive(Clone)]
pub struct Repositories {
    pub principals: Arc<dyn PrincipalStore>,
    pub audit: Arc<dyn AuditStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub content: Arc<dyn ContentStore>,
    pub contacts: Arc<dyn ContactStore>,
    /// 仅 Postgres 后端持有，用于就绪检查与关闭
    pub pool: Option<PgPool>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            principals: Arc::new(PgPrincipalRepository::new(pool.clone())),
            audit: Arc::new(PgAuditRepository::new(pool.clone())),
            refresh_tokens: Arc::new(PgRefreshTokenRepository::new(pool.clone())),
            content: Arc::new(PgContentRepository::new(pool.clone())),
            contacts: Arc::new(PgContactRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            principals: store.clone(),
            audit: store.clone(),
            refresh_tokens: store.clone(),
            content: store.clone(),
            contacts: store,
            pool: None,
        }
    }
}

/// 将唯一约束冲突映射为 409
pub(crate) fn map_unique_violation(err: sqlx::Error, field: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(field.to_string()),
        _ => AppError::Database(err),
    }
}
