//! 联系表单

use crate::{
    auth::privileged::{ActionPolicy, Privileged},
    error::AppError,
    handlers::{parse_id, parse_query, Payload},
    middleware::{AppState, RequestMeta},
    models::{
        audit::AuditAction,
        auth::MessageResponse,
        contact::{ContactListQuery, ContactRequest},
    },
    services::permission_service::ADMINS,
};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

const RESOURCE: &str = "contact_messages";

/// 提交联系表单：保存留言并通知工作人员邮箱
pub async fn submit(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    payload: Payload<ContactRequest>,
) -> Result<impl IntoResponse, AppError> {
    let form = payload.validated()?;
    state.contact_service.submit(form, &meta.ip).await?;

    Ok(Json(MessageResponse::new(
        "Thank you for your message. We will get back to you soon",
    )))
}

/// 留言列表：`?page=&limit=&unread=true`
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.contact_service;
    let page = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Read, RESOURCE, ADMINS))
        .run(|_ctx| async {
            let query: ContactListQuery = parse_query(&meta)?;
            service.list(query).await
        })
        .await?;

    Ok(Json(page))
}

pub async fn get_message(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.contact_service;
    let message = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Read, RESOURCE, ADMINS))
        .resource_id(&id)
        .run(|ctx| async move {
            let id = parse_id(&id, "Message")?;
            service.read(&ctx, id).await
        })
        .await?;

    Ok(Json(message))
}
