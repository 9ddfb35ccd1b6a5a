//! Contact message repository (PostgreSQL)

use super::ContactStore;
use crate::{error::AppError, models::contact::ContactMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

pub struct ContactRepository {
    db: PgPool,
}

impl ContactRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: Uuid,
    name: String,
    email: String,
    phone: Option<String>,
    subject: String,
    message: String,
    ip_address: String,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    read_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<ContactRow> for ContactMessage {
    fn from(row: ContactRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            subject: row.subject,
            message: row.message,
            ip_address: row.ip_address,
            is_read: row.is_read,
            read_at: row.read_at,
            read_by: row.read_by,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ContactStore for ContactRepository {
    async fn insert(&self, message: &ContactMessage) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO contact_messages (
                id, name, email, phone, subject, message, ip_address,
                is_read, read_at, read_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(message.id)
        .bind(&message.name)
        .bind(&message.email)
        .bind(&message.phone)
        .bind(&message.subject)
        .bind(&message.message)
        .bind(&message.ip_address)
        .bind(message.is_read)
        .bind(message.read_at)
        .bind(message.read_by)
        .bind(message.created_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn list(&self, unread_only: bool, limit: i64, offset: i64) -> Result<Vec<ContactMessage>, AppError> {
        let rows = sqlx::query_as::<_, ContactRow>(
            r#"
            SELECT * FROM contact_messages
            WHERE NOT ($1 AND is_read)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(ContactMessage::from).collect())
    }

    async fn count(&self, unread_only: bool) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contact_messages WHERE NOT ($1 AND is_read)")
            .bind(unread_only)
            .fetch_one(&self.db)
            .await?;

        Ok(count)
    }

    async fn find(&self, id: Uuid) -> Result<Option<ContactMessage>, AppError> {
        let row = sqlx::query_as::<_, ContactRow>("SELECT * FROM contact_messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.map(ContactMessage::from))
    }

    /// 仅首次阅读写入阅读人
    async fn mark_read(&self, id: Uuid, reader: Uuid) -> Result<Option<ContactMessage>, AppError> {
        let row = sqlx::query_as::<_, ContactRow>(
            r#"
            UPDATE contact_messages
            SET is_read = TRUE,
                read_at = COALESCE(read_at, NOW()),
                read_by = COALESCE(read_by, $2)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reader)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(ContactMessage::from))
    }
}
