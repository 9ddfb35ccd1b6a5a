//! 审计日志查询处理器

use crate::{
    auth::privileged::{ActionPolicy, Outcome, Privileged},
    error::AppError,
    handlers::parse_query,
    middleware::{AppState, RequestMeta},
    models::{
        audit::{AuditAction, AuditLogQuery},
        pagination, Page,
    },
    services::permission_service::ADMINS,
};
use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;

/// 查询审计日志
/// 查询本身也会留下一条 READ 记录
pub async fn list_audit_logs(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
) -> Result<impl IntoResponse, AppError> {
    let audit = &state.audit_service;
    let page = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Read, "audit_logs", ADMINS))
        .run(|_ctx| async {
            let query: AuditLogQuery = parse_query(&meta)?;
            let (page, limit, offset) = pagination(query.page, query.limit);
            let filter = query.filter();

            let total = audit.count(&filter).await?;
            let items = audit.query(&filter, limit as i64, offset).await?;
            Ok(Outcome::new(Page::new(items, total, page, limit)))
        })
        .await?;

    Ok(Json(page))
}
