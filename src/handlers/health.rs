//! 健康检查处理器

use crate::{db, middleware::AppState};
use axum::{extract::State, Json};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::{sync::Arc, time::Instant};

static START_TIME: OnceCell<Instant> = OnceCell::new();

/// 记录进程启动时间（重复调用无效）
pub fn set_start_time() {
    let _ = START_TIME.set(Instant::now());
}

fn uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: Vec<HealthCheck>,
}

#[derive(Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// 存活检查
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime_secs(),
    })
}

/// 就绪检查
/// 检查存储后端是否可用
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> Json<ReadinessResponse> {
    let mut checks = Vec::new();

    match &state.repos.pool {
        Some(pool) => {
            let status = db::check(pool).await;
            checks.push(HealthCheck {
                name: "database".to_string(),
                status: if status.is_healthy() { "healthy" } else { "unhealthy" }.to_string(),
                message: Some(status.summary()),
            });
        }
        None => checks.push(HealthCheck {
            name: "storage".to_string(),
            status: "healthy".to_string(),
            message: Some("in-memory backend".to_string()),
        }),
    }

    let ready = checks.iter().all(|c| c.status == "healthy");
    Json(ReadinessResponse { ready, checks })
}
