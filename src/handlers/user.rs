//! 用户管理的 HTTP 处理器

use crate::{
    auth::privileged::{ActionPolicy, Privileged},
    error::AppError,
    handlers::{parse_id, parse_query, Payload},
    middleware::{AppState, RequestMeta},
    models::{
        audit::AuditAction,
        principal::{BulkRequest, CreatePrincipalRequest, ListPrincipalsQuery, UpdatePrincipalRequest},
    },
    services::permission_service::{ADMINS, ANY_ROLE, STAFF},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

const RESOURCE: &str = "users";

#[derive(Debug, Deserialize)]
struct ActivityQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

/// 列出用户
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.principal_service;
    let page = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Read, RESOURCE, ADMINS))
        .run(|_ctx| async {
            let query: ListPrincipalsQuery = parse_query(&meta)?;
            service.list(&query).await
        })
        .await?;

    Ok(Json(page))
}

/// 创建用户
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    payload: Payload<CreatePrincipalRequest>,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.principal_service;
    let user = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Create, RESOURCE, ADMINS))
        .json_body(payload.raw())
        .run(|ctx| async move {
            let req = payload.validated()?;
            service.create(&ctx, req).await
        })
        .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// 更新自己的资料
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    payload: Payload<UpdatePrincipalRequest>,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.principal_service;
    let user = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Update, RESOURCE, ANY_ROLE))
        .json_body(payload.raw())
        .run(|ctx| async move {
            let req = payload.validated()?;
            service.update(&ctx, ctx.id(), req).await
        })
        .await?;

    Ok(Json(user))
}

/// 用户详情
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.principal_service;
    let detail = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Read, RESOURCE, STAFF))
        .resource_id(&id)
        .run(|_ctx| async {
            let id = parse_id(&id, "User")?;
            service.detail(id).await
        })
        .await?;

    Ok(Json(detail))
}

/// 更新用户
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Path(id): Path<String>,
    payload: Payload<UpdatePrincipalRequest>,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.principal_service;
    let user = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Update, RESOURCE, ADMINS))
        .resource_id(&id)
        .json_body(payload.raw())
        .run(|ctx| async move {
            let id = parse_id(&id, "User")?;
            let req = payload.validated()?;
            service.update(&ctx, id, req).await
        })
        .await?;

    Ok(Json(user))
}

/// 删除用户（软删除）
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.principal_service;
    let response = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Delete, RESOURCE, ADMINS))
        .resource_id(&id)
        .run(|ctx| async move {
            let id = parse_id(&id, "User")?;
            service.deactivate(&ctx, id).await
        })
        .await?;

    Ok(Json(response))
}

/// 批量操作
pub async fn bulk_users(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    payload: Payload<BulkRequest>,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.principal_service;
    let response = Privileged::new(
        &state,
        &meta,
        ActionPolicy::new(AuditAction::BulkOperation, RESOURCE, ADMINS),
    )
    .json_body(payload.raw())
    .run(|ctx| async move {
        let req = payload.validated()?;
        service.bulk(&ctx, &req).await
    })
    .await?;

    Ok(Json(response))
}

/// 用户操作记录
pub async fn user_activity(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.principal_service;
    let page = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Read, RESOURCE, ADMINS))
        .resource_id(&id)
        .run(|_ctx| async {
            let id = parse_id(&id, "User")?;
            let query: ActivityQuery = parse_query(&meta)?;
            service.activity(id, query.page, query.limit).await
        })
        .await?;

    Ok(Json(page))
}
