//! 测试公共模块
//! 内存存储上的应用状态、种子数据和请求辅助函数

#![allow(dead_code)]

use argon2::Params;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use secrecy::Secret;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use union_portal::{
    auth::password::PasswordHasher,
    config::{
        AppConfig, AuditConfig, DatabaseConfig, LoggingConfig, MailConfig, SecurityConfig,
        ServerConfig, StorageBackend, StorageConfig,
    },
    error::AppError,
    middleware::AppState,
    models::{
        audit::{AuditAction, AuditFilter, AuditRecord},
        principal::{Principal, PrincipalStatus, Role},
    },
    repository::{MemoryStore, Repositories},
    routes,
    services::mail_service::{MailMessage, Mailer},
};

pub const PASSWORD: &str = "TestPass123";

/// 创建测试配置
pub fn create_test_config(access_ttl_secs: u64) -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(),
            graceful_shutdown_timeout_secs: 5,
            cors_origins: Vec::new(),
        },
        storage: StorageConfig {
            backend: StorageBackend::Memory,
        },
        database: DatabaseConfig {
            url: None,
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 3,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            access_token_secret: Secret::new("test-access-secret-key-at-least-32-chars".to_string()),
            refresh_token_secret: Secret::new("test-refresh-secret-key-at-least-32-chars".to_string()),
            access_token_exp_secs: access_ttl_secs,
            refresh_token_exp_secs: 3600,
            reset_token_exp_secs: 600,
            password_min_length: 8,
            password_require_uppercase: true,
            password_require_digit: true,
            password_require_special: false,
            cookie_secure: false,
            trust_proxy: true,
        },
        audit: AuditConfig {
            retention_days: 365,
            purge_interval_secs: 3600,
        },
        mail: MailConfig {
            from_address: "no-reply@union.test".to_string(),
            staff_address: "staff@union.test".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
        },
    }
}

/// 记录所有发出邮件的 Mailer
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<MailMessage>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// 最近一封发往 `to` 的邮件中的令牌
    pub fn token_for(&self, to: &str) -> Option<String> {
        self.messages()
            .iter()
            .rev()
            .find(|m| m.to == to)
            .and_then(|m| m.body.split("token=").nth(1))
            .map(|rest| rest.split_whitespace().next().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::internal_error("smtp unavailable"));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// 测试应用
pub struct TestApp {
    pub state: Arc<AppState>,
    pub mailer: Arc<RecordingMailer>,
}

fn fast_hasher() -> PasswordHasher {
    PasswordHasher::with_params(Params::new(8, 1, 1, None).unwrap())
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(create_test_config(900), Repositories::in_memory(), RecordingMailer::default())
    }

    pub fn with_access_ttl(secs: u64) -> Self {
        Self::build(create_test_config(secs), Repositories::in_memory(), RecordingMailer::default())
    }

    pub fn with_repos(repos: Repositories) -> Self {
        Self::build(create_test_config(900), repos, RecordingMailer::default())
    }

    pub fn with_mailer(mailer: RecordingMailer) -> Self {
        Self::build(create_test_config(900), Repositories::in_memory(), mailer)
    }

    fn build(config: AppConfig, repos: Repositories, mailer: RecordingMailer) -> Self {
        let mailer = Arc::new(mailer);
        let state = AppState::new(config, repos, mailer.clone(), fast_hasher())
            .expect("Failed to build test app state");
        Self {
            state: Arc::new(state),
            mailer,
        }
    }

    pub fn router(&self) -> Router {
        routes::create_router(self.state.clone())
    }

    /// 直接写入存储的主体
    pub async fn seed(&self, email: &str, role: Role) -> Principal {
        self.seed_with_status(email, role, PrincipalStatus::Active).await
    }

    pub async fn seed_with_status(&self, email: &str, role: Role, status: PrincipalStatus) -> Principal {
        let hash = fast_hasher().hash(PASSWORD).unwrap();
        let name = email.split('@').next().unwrap_or("member");
        let mut principal = Principal::new(email, hash, &format!("{} member", name), role, status);
        principal.email_verified = true;
        self.state.repos.principals.insert(&principal).await.unwrap();
        principal
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse { status, headers, body }
    }

    /// 登录并返回响应体
    pub async fn login(&self, email: &str) -> TestResponse {
        let body = serde_json::json!({ "email": email, "password": PASSWORD });
        self.send(json_request("POST", "/api/v1/auth/login", None, Some(body))).await
    }

    /// 登录并返回访问令牌
    pub async fn access_token(&self, email: &str) -> String {
        let response = self.login(email).await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
        response.body["accessToken"].as_str().unwrap().to_string()
    }

    pub async fn audit_records(&self) -> Vec<AuditRecord> {
        self.state
            .audit_service
            .query(&AuditFilter::default(), 10_000, 0)
            .await
            .unwrap()
    }

    pub async fn audit_records_for(&self, action: AuditAction) -> Vec<AuditRecord> {
        self.audit_records()
            .await
            .into_iter()
            .filter(|r| r.action == action)
            .collect()
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// Set-Cookie 中的刷新令牌
    pub fn refresh_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|c| c.starts_with("refreshToken="))
            .map(|c| c.to_string())
    }
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::USER_AGENT, "integration-test")
        .header("x-forwarded-for", "203.0.113.9");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// 构造一个共享 MemoryStore 的存储组合，审计端口可替换
pub fn repos_with_audit(audit: Arc<dyn union_portal::repository::AuditStore>) -> Repositories {
    let store = Arc::new(MemoryStore::default());
    Repositories {
        principals: store.clone(),
        audit,
        refresh_tokens: store.clone(),
        content: store.clone(),
        contacts: store,
        pool: None,
    }
}
