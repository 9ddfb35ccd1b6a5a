//! Audit repository (审计数据访问)

use super::AuditStore;
use crate::{
    error::AppError,
    models::{
        audit::{AuditAction, AuditFilter, AuditRecord, Changes},
        dashboard::{ActionCount, DailyCount, ResourceTiming},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub struct AuditRepository {
    db: PgPool,
}

impl AuditRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    actor_id: Option<Uuid>,
    action: String,
    resource: String,
    resource_id: Option<String>,
    details: serde_json::Value,
    changes: Option<serde_json::Value>,
    ip_address: String,
    user_agent: String,
    success: bool,
    error_message: Option<String>,
    duration_ms: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = AppError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let changes = row
            .changes
            .map(serde_json::from_value::<Changes>)
            .transpose()
            .map_err(|e| AppError::Internal(format!("corrupt audit changes: {}", e)))?;

        Ok(AuditRecord {
            id: row.id,
            actor_id: row.actor_id,
            action: row.action.parse::<AuditAction>().map_err(AppError::Internal)?,
            resource: row.resource,
            resource_id: row.resource_id,
            details: row.details,
            changes,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            success: row.success,
            error_message: row.error_message,
            duration_ms: row.duration_ms,
            created_at: row.created_at,
        })
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &AuditFilter) {
    builder.push(" WHERE 1=1");
    if let Some(actor_id) = filter.actor_id {
        builder.push(" AND actor_id = ").push_bind(actor_id);
    }
    if let Some(action) = filter.action {
        builder.push(" AND action = ").push_bind(action.as_str());
    }
    if let Some(resource) = filter.resource.clone() {
        builder.push(" AND resource = ").push_bind(resource);
    }
    if let Some(resource_id) = filter.resource_id.clone() {
        builder.push(" AND resource_id = ").push_bind(resource_id);
    }
    if let Some(success) = filter.success {
        builder.push(" AND success = ").push_bind(success);
    }
    if let Some(start) = filter.start_date {
        builder.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        builder.push(" AND created_at <= ").push_bind(end);
    }
}

#[async_trait]
impl AuditStore for AuditRepository {
    /// 插入审计日志
    async fn insert(&self, record: &AuditRecord) -> Result<(), AppError> {
        let changes = record
            .changes
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| AppError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, actor_id, action, resource, resource_id, details, changes,
                ip_address, user_agent, success, error_message, duration_ms, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id)
        .bind(record.actor_id)
        .bind(record.action.as_str())
        .bind(&record.resource)
        .bind(&record.resource_id)
        .bind(&record.details)
        .bind(changes)
        .bind(&record.ip_address)
        .bind(&record.user_agent)
        .bind(record.success)
        .bind(&record.error_message)
        .bind(record.duration_ms)
        .bind(record.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// 查询审计日志（按时间倒序）
    async fn query(&self, filter: &AuditFilter, limit: i64, offset: i64) -> Result<Vec<AuditRecord>, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM audit_logs");
        push_filter(&mut builder, filter);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = builder.build_query_as::<AuditRow>().fetch_all(&self.db).await?;
        rows.into_iter().map(AuditRecord::try_from).collect()
    }

    /// 统计审计日志数量
    async fn count(&self, filter: &AuditFilter) -> Result<i64, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_filter(&mut builder, filter);

        let count: i64 = builder.build_query_scalar().fetch_one(&self.db).await?;
        Ok(count)
    }

    /// 清理超过保留期的记录
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM audit_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// 按 UTC 自然日聚合
    async fn daily_counts(&self, filter: &AuditFilter) -> Result<Vec<DailyCount>, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*) FROM audit_logs",
        );
        push_filter(&mut builder, filter);
        builder.push(" GROUP BY day ORDER BY day");

        let rows: Vec<(NaiveDate, i64)> = builder.build_query_as().fetch_all(&self.db).await?;
        Ok(rows
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect())
    }

    async fn action_counts(&self, filter: &AuditFilter, limit: i64) -> Result<Vec<ActionCount>, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT action, COUNT(*) AS n FROM audit_logs");
        push_filter(&mut builder, filter);
        builder
            .push(" GROUP BY action ORDER BY n DESC, action LIMIT ")
            .push_bind(limit);

        let rows: Vec<(String, i64)> = builder.build_query_as().fetch_all(&self.db).await?;
        rows.into_iter()
            .map(|(action, count)| {
                Ok(ActionCount {
                    action: action.parse::<AuditAction>().map_err(AppError::Internal)?,
                    count,
                })
            })
            .collect()
    }

    async fn resource_timings(&self, filter: &AuditFilter, limit: i64) -> Result<Vec<ResourceTiming>, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT resource, ROUND(AVG(duration_ms))::int8 AS avg_ms, COUNT(*) FROM audit_logs",
        );
        push_filter(&mut builder, filter);
        builder
            .push(" GROUP BY resource ORDER BY avg_ms DESC, resource LIMIT ")
            .push_bind(limit);

        let rows: Vec<(String, i64, i64)> = builder.build_query_as().fetch_all(&self.db).await?;
        Ok(rows
            .into_iter()
            .map(|(resource, avg_duration_ms, request_count)| ResourceTiming {
                resource,
                avg_duration_ms,
                request_count,
            })
            .collect())
    }
}
