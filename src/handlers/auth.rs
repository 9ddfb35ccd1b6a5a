//! 认证相关的 HTTP 处理器

use crate::{
    auth::{
        cookies::{clear_refresh_cookie, refresh_cookie, REFRESH_COOKIE},
        middleware::AuthContext,
        privileged::{ActionPolicy, Privileged},
    },
    error::{AppError, AuthFailure},
    handlers::Payload,
    middleware::{AppState, RequestMeta},
    models::{
        audit::AuditAction,
        auth::{
            ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RefreshRequest,
            RefreshResponse, RegisterRequest, ResetPasswordRequest, TokenRequest,
        },
    },
    services::permission_service::ANY_ROLE,
};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::CookieJar;
use serde_json::json;
use std::sync::Arc;

const RESOURCE: &str = "auth";

fn session_cookie_ttl(state: &AppState) -> u64 {
    state.tokens.refresh_ttl().as_secs()
}

/// 注册
pub async fn register(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    payload: Payload<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let req = payload.validated()?;
    let user = state.auth_service.register(req, &meta).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Registration successful. Please check your email to verify your account",
            "user": user,
        })),
    ))
}

/// 验证邮箱
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    payload: Payload<TokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let req = payload.validated()?;
    let response = state.auth_service.verify_email(&req.token, &meta).await?;
    Ok(Json(response))
}

/// 登录
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    meta: RequestMeta,
    payload: Payload<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let req = payload.validated()?;
    let (response, pair) = state.auth_service.login(req, &meta).await?;

    let cookie = refresh_cookie(
        &pair.refresh_token,
        session_cookie_ttl(&state),
        state.config.security.cookie_secure,
    );
    Ok((jar.add(cookie), Json(response)))
}

/// 刷新令牌
/// 刷新令牌优先取 Cookie，其次取请求体
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    meta: RequestMeta,
    payload: Payload<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let from_cookie = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());
    let token = from_cookie
        .or_else(|| payload.ok().and_then(|r| r.refresh_token))
        .ok_or(AppError::Unauthorized(AuthFailure::MissingToken))?;

    let pair = state.auth_service.refresh(&token, &meta).await?;

    let cookie = refresh_cookie(
        &pair.refresh_token,
        session_cookie_ttl(&state),
        state.config.security.cookie_secure,
    );
    Ok((
        jar.add(cookie),
        Json(RefreshResponse {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
        }),
    ))
}

/// 登出
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    meta: RequestMeta,
    payload: Payload<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let body = payload.raw();
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| payload.ok().and_then(|r| r.refresh_token));

    let service = &state.auth_service;
    let response = Privileged::new(&state, &meta, ActionPolicy::new(AuditAction::Logout, RESOURCE, ANY_ROLE))
        .json_body(body)
        .run(|ctx| async move { service.logout(&ctx, presented.as_deref()).await })
        .await?;

    let jar = jar.add(clear_refresh_cookie(state.config.security.cookie_secure));
    Ok((jar, Json(response)))
}

/// 当前登录用户
pub async fn me(ctx: AuthContext) -> Result<impl IntoResponse, AppError> {
    Ok(Json(json!({ "user": ctx.principal })))
}

/// 修改密码
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    meta: RequestMeta,
    payload: Payload<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let service = &state.auth_service;
    let response = Privileged::new(
        &state,
        &meta,
        ActionPolicy::new(AuditAction::PasswordChange, RESOURCE, ANY_ROLE),
    )
    .json_body(payload.raw())
    .run(|ctx| async move {
        let req = payload.validated()?;
        service.change_password(&ctx, &req).await
    })
    .await?;

    // 所有刷新令牌已吊销，客户端需重新登录
    let jar = jar.add(clear_refresh_cookie(state.config.security.cookie_secure));
    Ok((jar, Json(response)))
}

/// 忘记密码
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    meta: RequestMeta,
    payload: Payload<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let req = payload.validated()?;
    let response = state.auth_service.forgot_password(&req.email, &meta).await?;
    Ok(Json(response))
}

/// 重置密码
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    meta: RequestMeta,
    payload: Payload<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let req = payload.validated()?;
    let response = state
        .auth_service
        .reset_password(&req.token, &req.password, &meta)
        .await?;

    let jar = jar.add(clear_refresh_cookie(state.config.security.cookie_secure));
    Ok((jar, Json(response)))
}
