//! HTTP 中间件
//! 应用状态、请求追踪、客户端元数据提取

use crate::{
    auth::{jwt::TokenService, middleware::AuthGate, password::PasswordHasher},
    config::AppConfig,
    error::AppError,
    models::audit::{AuditAction, AuditEvent},
    repository::Repositories,
    services::{
        mail_service::Mailer, AuditService, AuthService, ContactService, ContentService,
        DashboardService, MailService, PrincipalService,
    },
};
use axum::{
    extract::{ConnectInfo, FromRequestParts, Query, Request},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::{collections::HashMap, convert::Infallible, net::SocketAddr, sync::Arc, time::Instant};
use tracing::Instrument;
use uuid::Uuid;

tokio::task_local! {
    static REQUEST_ID: String;
}

/// 当前请求的 request_id（请求追踪中间件之外调用时生成新的）
pub fn current_request_id() -> String {
    REQUEST_ID
        .try_with(|id| id.clone())
        .unwrap_or_else(|_| Uuid::new_v4().to_string())
}

/// 应用状态
///
/// 在进程入口构建一次，服务以 Arc 共享。
pub struct AppState {
    pub config: AppConfig,
    pub repos: Repositories,
    pub tokens: Arc<TokenService>,
    pub auth_gate: Arc<AuthGate>,
    pub audit_service: Arc<AuditService>,
    pub auth_service: Arc<AuthService>,
    pub principal_service: Arc<PrincipalService>,
    pub content_service: Arc<ContentService>,
    pub dashboard_service: Arc<DashboardService>,
    pub contact_service: Arc<ContactService>,
    pub mail_service: Arc<MailService>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        repos: Repositories,
        mailer: Arc<dyn Mailer>,
        passwords: PasswordHasher,
    ) -> Result<Self, AppError> {
        let tokens = Arc::new(TokenService::from_config(&config.security)?);
        let passwords = Arc::new(passwords);
        let audit_service = Arc::new(AuditService::new(repos.audit.clone()));
        let mail_service = Arc::new(MailService::new(mailer, config.mail.clone()));
        let auth_gate = Arc::new(AuthGate::new(tokens.clone(), repos.principals.clone()));

        let auth_service = Arc::new(AuthService::new(
            repos.principals.clone(),
            repos.refresh_tokens.clone(),
            tokens.clone(),
            passwords.clone(),
            audit_service.clone(),
            mail_service.clone(),
            config.security.clone(),
        ));
        let principal_service = Arc::new(PrincipalService::new(
            repos.principals.clone(),
            repos.refresh_tokens.clone(),
            passwords,
            audit_service.clone(),
            config.security.clone(),
        ));
        let content_service = Arc::new(ContentService::new(repos.content.clone()));
        let dashboard_service = Arc::new(DashboardService::new(
            repos.principals.clone(),
            repos.content.clone(),
            audit_service.clone(),
        ));
        let contact_service = Arc::new(ContactService::new(repos.contacts.clone(), mail_service.clone()));

        Ok(Self {
            config,
            repos,
            tokens,
            auth_gate,
            audit_service,
            auth_service,
            principal_service,
            content_service,
            dashboard_service,
            contact_service,
            mail_service,
        })
    }
}

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，并记录指标
pub async fn request_tracking_middleware(req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().clone();
    let uri = req.uri().path().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let scoped_id = request_id.clone();
    async move {
        let start = Instant::now();

        let mut response = REQUEST_ID.scope(scoped_id, next.run(req)).await;

        let elapsed = start.elapsed();
        let status = response.status().as_u16();

        // 指标标签只使用有限取值
        let method_name = match method.as_str() {
            "GET" => "GET",
            "POST" => "POST",
            "PUT" => "PUT",
            "DELETE" => "DELETE",
            "PATCH" => "PATCH",
            _ => "OTHER",
        };
        let status_class = match status {
            200..=299 => "2xx",
            300..=399 => "3xx",
            400..=499 => "4xx",
            _ => "5xx",
        };

        metrics::counter!("http_requests_total", "method" => method_name, "status" => status_class)
            .increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            status = status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// 获取客户端 IP 地址
pub fn get_client_ip(parts: &Parts, trust_proxy: bool) -> String {
    let headers = &parts.headers;

    if trust_proxy {
        // X-Forwarded-For 可能包含多个 IP，取第一个
        if let Some(first_ip) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return first_ip.to_string();
        }

        if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            return real_ip.trim().to_string();
        }
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// 审计所需的请求元数据
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: String,
    pub url: String,
    pub query: HashMap<String, String>,
    pub ip: String,
    pub user_agent: String,
    /// 原始 Authorization 头
    pub authorization: Option<String>,
}

impl RequestMeta {
    /// 以本请求的 IP 和 User-Agent 预填的审计事件
    pub fn event(&self, action: AuditAction, resource: &str) -> AuditEvent {
        let mut event = AuditEvent::new(action, resource);
        event.ip_address = self.ip.clone();
        event.user_agent = self.user_agent.clone();
        event
    }
}

impl FromRequestParts<Arc<AppState>> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();

        Ok(Self {
            method: parts.method.to_string(),
            url: parts.uri.to_string(),
            query,
            ip: get_client_ip(parts, state.config.security.trust_proxy),
            user_agent: parts
                .headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
                .to_string(),
            authorization: parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string()),
        })
    }
}
