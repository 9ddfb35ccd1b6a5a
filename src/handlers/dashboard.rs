//! 管理后台统计

use super::parse_query;
use crate::{
    auth::privileged::{ActionPolicy, Privileged},
    error::AppError,
    middleware::{AppState, RequestMeta},
    models::{audit::AuditAction, dashboard::AnalyticsQuery},
    services::permission_service::{ADMINS, STAFF},
};
use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;

pub async fn stats(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.dashboard_service;
    let stats = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Read, "dashboard", STAFF))
        .run(|_ctx| service.stats())
        .await?;

    Ok(Json(stats))
}

/// 趋势分析：`?period=7d|30d|90d|1y`，缺省 30d
pub async fn analytics(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.dashboard_service;
    let analytics = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Read, "dashboard", ADMINS))
        .run(|_ctx| async {
            let query: AnalyticsQuery = parse_query(&meta)?;
            service.analytics(query.period.unwrap_or_default()).await
        })
        .await?;

    Ok(Json(analytics))
}
