//! Principal repository (PostgreSQL)

use super::{map_unique_violation, PrincipalStore};
use crate::{
    error::AppError,
    models::{
        dashboard::DailyCount,
        principal::{Principal, PrincipalFilter, PrincipalStatus, Role},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub struct PrincipalRepository {
    db: PgPool,
}

impl PrincipalRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(sqlx::FromRow)]
struct PrincipalRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: String,
    role: String,
    status: String,
    phone: Option<String>,
    department: Option<String>,
    email_verified: bool,
    verification_token_hash: Option<String>,
    reset_token_hash: Option<String>,
    reset_token_expires_at: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    created_by: Option<Uuid>,
    updated_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PrincipalRow> for Principal {
    type Error = AppError;

    fn try_from(row: PrincipalRow) -> Result<Self, Self::Error> {
        Ok(Principal {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            role: row.role.parse::<Role>().map_err(AppError::Internal)?,
            status: row.status.parse::<PrincipalStatus>().map_err(AppError::Internal)?,
            phone: row.phone,
            department: row.department,
            email_verified: row.email_verified,
            verification_token_hash: row.verification_token_hash,
            reset_token_hash: row.reset_token_hash,
            reset_token_expires_at: row.reset_token_expires_at,
            last_login_at: row.last_login_at,
            created_by: row.created_by,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn convert(rows: Vec<PrincipalRow>) -> Result<Vec<Principal>, AppError> {
    rows.into_iter().map(Principal::try_from).collect()
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &PrincipalFilter) {
    builder.push(" WHERE 1=1");
    if let Some(role) = filter.role {
        builder.push(" AND role = ").push_bind(role.as_str());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = contains_pattern(search);
        builder
            .push(" AND (LOWER(name) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR email LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR LOWER(COALESCE(department, '')) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
}

/// 子串匹配的 LIKE 模式，搜索词里的通配符按字面量处理
fn contains_pattern(search: &str) -> String {
    let mut pattern = String::from("%");
    for c in search.trim().to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl PrincipalStore for PrincipalRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>, AppError> {
        let row = sqlx::query_as::<_, PrincipalRow>("SELECT * FROM principals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(Principal::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, AppError> {
        let row = sqlx::query_as::<_, PrincipalRow>("SELECT * FROM principals WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;

        row.map(Principal::try_from).transpose()
    }

    async fn find_by_verification_hash(&self, hash: &str) -> Result<Option<Principal>, AppError> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            "SELECT * FROM principals WHERE verification_token_hash = $1",
        )
        .bind(hash)
        .fetch_optional(&self.db)
        .await?;

        row.map(Principal::try_from).transpose()
    }

    async fn find_by_reset_hash(&self, hash: &str) -> Result<Option<Principal>, AppError> {
        let row = sqlx::query_as::<_, PrincipalRow>("SELECT * FROM principals WHERE reset_token_hash = $1")
            .bind(hash)
            .fetch_optional(&self.db)
            .await?;

        row.map(Principal::try_from).transpose()
    }

    async fn insert(&self, p: &Principal) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO principals (
                id, email, password_hash, name, role, status, phone, department,
                email_verified, verification_token_hash, reset_token_hash, reset_token_expires_at,
                last_login_at, created_by, updated_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(p.id)
        .bind(&p.email)
        .bind(&p.password_hash)
        .bind(&p.name)
        .bind(p.role.as_str())
        .bind(p.status.as_str())
        .bind(&p.phone)
        .bind(&p.department)
        .bind(p.email_verified)
        .bind(&p.verification_token_hash)
        .bind(&p.reset_token_hash)
        .bind(p.reset_token_expires_at)
        .bind(p.last_login_at)
        .bind(p.created_by)
        .bind(p.updated_by)
        .bind(p.created_at)
        .bind(p.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| map_unique_violation(e, "email"))?;

        Ok(())
    }

    async fn save(&self, p: &Principal) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE principals
            SET
                email = $2,
                password_hash = $3,
                name = $4,
                role = $5,
                status = $6,
                phone = $7,
                department = $8,
                email_verified = $9,
                verification_token_hash = $10,
                reset_token_hash = $11,
                reset_token_expires_at = $12,
                last_login_at = $13,
                updated_by = $14,
                updated_at = $15
            WHERE id = $1
            "#,
        )
        .bind(p.id)
        .bind(&p.email)
        .bind(&p.password_hash)
        .bind(&p.name)
        .bind(p.role.as_str())
        .bind(p.status.as_str())
        .bind(&p.phone)
        .bind(&p.department)
        .bind(p.email_verified)
        .bind(&p.verification_token_hash)
        .bind(&p.reset_token_hash)
        .bind(p.reset_token_expires_at)
        .bind(p.last_login_at)
        .bind(p.updated_by)
        .bind(p.updated_at)
        .execute(&self.db)
        .await
        .map_err(|e| map_unique_violation(e, "email"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("User"));
        }
        Ok(())
    }

    async fn list(&self, filter: &PrincipalFilter, limit: i64, offset: i64) -> Result<Vec<Principal>, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM principals");
        push_filter(&mut builder, filter);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = builder
            .build_query_as::<PrincipalRow>()
            .fetch_all(&self.db)
            .await?;

        convert(rows)
    }

    async fn count(&self, filter: &PrincipalFilter) -> Result<i64, AppError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM principals");
        push_filter(&mut builder, filter);

        let count: i64 = builder.build_query_scalar().fetch_one(&self.db).await?;
        Ok(count)
    }

    async fn set_status_many(
        &self,
        ids: &[Uuid],
        status: PrincipalStatus,
        updated_by: Uuid,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE principals
            SET status = $2, updated_by = $3, updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(status.as_str())
        .bind(updated_by)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_by_role(&self) -> Result<Vec<(Role, i64)>, AppError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT role, COUNT(*) FROM principals GROUP BY role")
                .fetch_all(&self.db)
                .await?;

        rows.into_iter()
            .map(|(role, n)| Ok((role.parse::<Role>().map_err(AppError::Internal)?, n)))
            .collect()
    }

    async fn count_by_status(&self) -> Result<Vec<(PrincipalStatus, i64)>, AppError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM principals GROUP BY status")
                .fetch_all(&self.db)
                .await?;

        rows.into_iter()
            .map(|(status, n)| Ok((status.parse::<PrincipalStatus>().map_err(AppError::Internal)?, n)))
            .collect()
    }
    async fn created_per_day(&self, since: DateTime<Utc>) -> Result<Vec<DailyCount>, AppError> {
        let rows: Vec<(NaiveDate, i64)> = sqlx::query_as(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::date AS day, COUNT(*)
            FROM principals
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
