//! PostgreSQL 连接池
//! 进程入口创建连接池并执行迁移，就绪检查通过 `check` 做一次往返查询

use crate::config::DatabaseConfig;
use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database.url is not set")]
    MissingUrl,

    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),
}

/// 建立连接池并应用内嵌迁移
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DbError> {
    let url = config.url.as_ref().ok_or(DbError::MissingUrl)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
        .connect(url.expose_secret())
        .await
        .map_err(DbError::ConnectionFailed)?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(DbError::MigrationFailed)?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database pool ready, migrations applied"
    );
    Ok(pool)
}

/// 一次连接池检查的结果
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub latency_ms: u128,
    pub size: u32,
    pub idle: usize,
    pub error: Option<String>,
}

impl PoolStatus {
    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }

    /// 就绪检查里展示的一行说明
    pub fn summary(&self) -> String {
        match &self.error {
            None => format!(
                "{}ms, {} connections ({} idle)",
                self.latency_ms, self.size, self.idle
            ),
            Some(err) => err.clone(),
        }
    }
}

/// 执行一次往返查询，同时上报连接池指标
pub async fn check(pool: &PgPool) -> PoolStatus {
    let start = Instant::now();
    let result = sqlx::query("SELECT 1").execute(pool).await;

    let status = PoolStatus {
        latency_ms: start.elapsed().as_millis(),
        size: pool.size(),
        idle: pool.num_idle(),
        error: result.err().map(|e| e.to_string()),
    };

    metrics::gauge!("db_pool_connections").set(status.size as f64);
    metrics::gauge!("db_pool_idle_connections").set(status.idle as f64);
    if let Some(err) = &status.error {
        tracing::warn!(error = %err, "Database check failed");
    }
    status
}
