//! Content repository (PostgreSQL)

use super::{map_unique_violation, ContentStore};
use crate::{
    error::AppError,
    models::{
        content::{ContentItem, ContentKind},
        dashboard::DailyCount,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// 唯一索引 content_items_section_key 冲突时报告的字段
const SECTION_KEY: &str = "Section key";

pub struct ContentRepository {
    db: PgPool,
}

impl ContentRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct ContentRow {
    id: Uuid,
    kind: String,
    title: String,
    body: String,
    attributes: serde_json::Value,
    is_active: bool,
    display_order: i32,
    created_by: Option<Uuid>,
    updated_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ContentRow> for ContentItem {
    type Error = AppError;

    fn try_from(row: ContentRow) -> Result<Self, Self::Error> {
        Ok(ContentItem {
            id: row.id,
            kind: row.kind.parse::<ContentKind>().map_err(AppError::Internal)?,
            title: row.title,
            body: row.body,
            attributes: row.attributes,
            is_active: row.is_active,
            display_order: row.display_order,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ContentStore for ContentRepository {
    async fn list(&self, kind: ContentKind, include_inactive: bool) -> Result<Vec<ContentItem>, AppError> {
        let rows = sqlx::query_as::<_, ContentRow>(
            r#"
            SELECT * FROM content_items
            WHERE kind = $1 AND ($2 OR is_active)
            ORDER BY display_order ASC, created_at DESC
            "#,
        )
        .bind(kind.as_str())
        .bind(include_inactive)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(ContentItem::try_from).collect()
    }

    async fn find(&self, kind: ContentKind, id: Uuid) -> Result<Option<ContentItem>, AppError> {
        let row = sqlx::query_as::<_, ContentRow>("SELECT * FROM content_items WHERE kind = $1 AND id = $2")
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(ContentItem::try_from).transpose()
    }

    async fn insert(&self, item: &ContentItem) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO content_items (
                id, kind, title, body, attributes, is_active, display_order,
                created_by, updated_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(item.id)
        .bind(item.kind.as_str())
        .bind(&item.title)
        .bind(&item.body)
        .bind(&item.attributes)
        .bind(item.is_active)
        .bind(item.display_order)
        .bind(item.created_by)
        .bind(item.updated_by)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| map_unique_violation(e, SECTION_KEY))?;

        Ok(())
    }

    async fn update(&self, item: &ContentItem) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE content_items
            SET title = $3, body = $4, attributes = $5, is_active = $6,
                display_order = $7, updated_by = $8, updated_at = $9
            WHERE kind = $1 AND id = $2
            "#,
        )
        .bind(item.kind.as_str())
        .bind(item.id)
        .bind(&item.title)
        .bind(&item.body)
        .bind(&item.attributes)
        .bind(item.is_active)
        .bind(item.display_order)
        .bind(item.updated_by)
        .bind(item.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| map_unique_violation(e, SECTION_KEY))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Content"));
        }
        Ok(())
    }

    async fn delete(&self, kind: ContentKind, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM content_items WHERE kind = $1 AND id = $2")
            .bind(kind.as_str())
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_by_kind(&self) -> Result<Vec<(ContentKind, i64, i64)>, AppError> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT kind, COUNT(*), COUNT(*) FILTER (WHERE is_active)
            FROM content_items
            GROUP BY kind
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|(kind, total, active)| {
                Ok((kind.parse::<ContentKind>().map_err(AppError::Internal)?, total, active))
            })
            .collect()
    }

    async fn created_per_day(&self, since: DateTime<Utc>) -> Result<Vec<DailyCount>, AppError> {
        let rows: Vec<(NaiveDate, i64)> = sqlx::query_as(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*)
            FROM content_items
            WHERE created_at >= $1
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(since)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect())
    }
}
