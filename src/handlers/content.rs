//! 站点内容的 HTTP 处理器
//! 公开接口只返回启用的内容，写操作需要工作人员角色

use crate::{
    auth::privileged::{ActionPolicy, Privileged},
    error::AppError,
    handlers::{parse_id, Payload},
    middleware::{AppState, RequestMeta},
    models::{
        audit::AuditAction,
        content::{ContentKind, CreateContentRequest, UpdateContentRequest},
    },
    services::permission_service::{ADMINS, STAFF},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

fn kind_of(segment: &str) -> Result<ContentKind, AppError> {
    ContentKind::from_collection(segment).ok_or_else(|| AppError::not_found("Content type"))
}

/// 公开列表
pub async fn list_public(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let kind = kind_of(&kind)?;
    let items = state.content_service.list_public(kind).await?;
    Ok(Json(json!({ "items": items, "count": items.len() })))
}

/// 公开详情
pub async fn get_public(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = kind_of(&kind)?;
    let id = parse_id(&id, "Content")?;
    let item = state.content_service.get_public(kind, id).await?;
    Ok(Json(item))
}

/// 管理端列表（含停用内容）
pub async fn list_admin(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let kind = kind_of(&kind)?;
    let service = &state.content_service;
    let items = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Read, kind.collection(), STAFF))
        .run(|_ctx| service.list_all(kind))
        .await?;

    Ok(Json(json!({ "items": items, "count": items.len() })))
}

/// 创建内容
pub async fn create(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Path(kind): Path<String>,
    payload: Payload<CreateContentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let kind = kind_of(&kind)?;
    let service = &state.content_service;
    let item = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Create, kind.collection(), STAFF))
        .json_body(payload.raw())
        .run(|ctx| async move {
            let req = payload.validated()?;
            service.create(&ctx, kind, req).await
        })
        .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

/// 更新内容
pub async fn update(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Path((kind, id)): Path<(String, String)>,
    payload: Payload<UpdateContentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let kind = kind_of(&kind)?;
    let service = &state.content_service;
    let item = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Update, kind.collection(), STAFF))
        .resource_id(&id)
        .json_body(payload.raw())
        .run(|ctx| async move {
            let id = parse_id(&id, "Content")?;
            let req = payload.validated()?;
            service.update(&ctx, kind, id, req).await
        })
        .await?;

    Ok(Json(item))
}

/// 删除内容
pub async fn delete(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Path((kind, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let kind = kind_of(&kind)?;
    let service = &state.content_service;
    let response = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Delete, kind.collection(), ADMINS))
        .resource_id(&id)
        .run(|_ctx| async move {
            let id = parse_id(&id, "Content")?;
            service.delete(kind, id).await
        })
        .await?;

    Ok(Json(response))
}
