//! 审计日志服务
//! 写入失败只记录日志和指标，不向调用方传播

use crate::{
    error::AppError,
    models::{
        audit::{AuditEvent, AuditFilter, AuditRecord},
        dashboard::{ActionCount, DailyCount, ResourceTiming},
    },
    repository::{AuditStore, RefreshTokenStore},
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct AuditService {
    store: Arc<dyn AuditStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// 追加一条审计记录
    pub async fn record(&self, event: AuditEvent) {
        let record = event.into_record();
        let action = record.action.as_str();
        let success = if record.success { "true" } else { "false" };

        match self.store.insert(&record).await {
            Ok(()) => {
                metrics::counter!("audit_records_total", "action" => action, "success" => success)
                    .increment(1);
                tracing::debug!(
                    audit_id = %record.id,
                    action = action,
                    resource = %record.resource,
                    success = record.success,
                    "Audit record written"
                );
            }
            Err(e) => {
                metrics::counter!("audit_write_failures_total", "action" => action).increment(1);
                tracing::error!(
                    action = action,
                    resource = %record.resource,
                    actor_id = ?record.actor_id,
                    error = %e,
                    "Failed to write audit record"
                );
            }
        }
    }

    /// 查询审计日志
    pub async fn query(&self, filter: &AuditFilter, limit: i64, offset: i64) -> Result<Vec<AuditRecord>, AppError> {
        self.store.query(filter, limit, offset).await
    }

    /// 查询审计日志数量
    pub async fn count(&self, filter: &AuditFilter) -> Result<i64, AppError> {
        self.store.count(filter).await
    }

    /// 按日统计
    pub async fn daily_counts(&self, filter: &AuditFilter) -> Result<Vec<DailyCount>, AppError> {
        self.store.daily_counts(filter).await
    }

    /// 最频繁的动作
    pub async fn top_actions(&self, filter: &AuditFilter, limit: i64) -> Result<Vec<ActionCount>, AppError> {
        self.store.action_counts(filter, limit).await
    }

    /// 平均耗时最长的资源
    pub async fn slowest_resources(&self, filter: &AuditFilter, limit: i64) -> Result<Vec<ResourceTiming>, AppError> {
        self.store.resource_timings(filter, limit).await
    }

    /// 某个主体最近的操作记录
    pub async fn recent_for_actor(&self, actor_id: Uuid, limit: i64) -> Result<Vec<AuditRecord>, AppError> {
        let filter = AuditFilter {
            actor_id: Some(actor_id),
            ..Default::default()
        };
        self.store.query(&filter, limit, 0).await
    }

    /// 清理超过保留期的审计记录
    pub async fn purge_expired(&self, retention_days: u32) -> Result<u64, AppError> {
        let cutoff = Utc::now() - Duration::days(retention_days as i64);
        let purged = self.store.purge_older_than(cutoff).await?;
        if purged > 0 {
            tracing::info!(purged, retention_days, "Purged expired audit records");
        }
        Ok(purged)
    }
}

/// 后台保留期清理任务：审计记录与过期刷新令牌
pub fn spawn_retention_task(
    audit: Arc<AuditService>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    retention_days: u32,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;

            if let Err(e) = audit.purge_expired(retention_days).await {
                tracing::error!(error = %e, "Audit retention purge failed");
            }
            match refresh_tokens.purge_expired(Utc::now()).await {
                Ok(n) if n > 0 => tracing::info!(purged = n, "Purged expired refresh tokens"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Refresh token purge failed"),
            }
        }
    })
}
