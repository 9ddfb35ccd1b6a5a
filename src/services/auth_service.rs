//! 认证服务：注册、登录、令牌刷新与轮换、登出、密码重置

use crate::{
    auth::{
        generate_opaque_token, hash_token,
        jwt::{TokenPair, TokenService},
        middleware::AuthContext,
        password::PasswordHasher,
        privileged::Outcome,
    },
    config::SecurityConfig,
    error::{AppError, AuthFailure},
    middleware::RequestMeta,
    models::{
        audit::AuditAction,
        auth::{
            ChangePasswordRequest, LoginRequest, LoginResponse, MessageResponse, RefreshTokenRecord,
            RegisterRequest, SessionUser,
        },
        principal::{normalize_email, Principal, PrincipalResponse, PrincipalStatus, Role},
    },
    repository::{PrincipalStore, RefreshTokenStore},
    services::{AuditService, MailService},
};
use chrono::{Duration, Utc};
use serde_json::json;
use std::{sync::Arc, time::Instant};
use uuid::Uuid;

const RESOURCE: &str = "auth";
const FORGOT_PASSWORD_MESSAGE: &str = "If an account exists for that email, a reset link has been sent";

pub struct AuthService {
    principals: Arc<dyn PrincipalStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    tokens: Arc<TokenService>,
    passwords: Arc<PasswordHasher>,
    audit: Arc<AuditService>,
    mail: Arc<MailService>,
    security: SecurityConfig,
}

impl AuthService {
    pub fn new(
        principals: Arc<dyn PrincipalStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        tokens: Arc<TokenService>,
        passwords: Arc<PasswordHasher>,
        audit: Arc<AuditService>,
        mail: Arc<MailService>,
        security: SecurityConfig,
    ) -> Self {
        Self {
            principals,
            refresh_tokens,
            tokens,
            passwords,
            audit,
            mail,
            security,
        }
    }

    /// 公开注册：创建 pending 状态的 user 并发送验证邮件
    pub async fn register(&self, req: RegisterRequest, meta: &RequestMeta) -> Result<PrincipalResponse, AppError> {
        PasswordHasher::validate_password_policy(&req.password, &self.security, "password")?;

        let email = normalize_email(&req.email);
        if self.principals.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("email".to_string()));
        }

        let start = Instant::now();
        let verification_token = generate_opaque_token();
        let mut principal = Principal::new(
            &email,
            self.passwords.hash(&req.password)?,
            &req.name,
            Role::User,
            PrincipalStatus::Pending,
        );
        principal.phone = req.phone;
        principal.department = req.department;
        principal.verification_token_hash = Some(hash_token(&verification_token));

        self.principals.insert(&principal).await?;

        if let Err(e) = self
            .mail
            .send_verification(&principal.email, &principal.name, &verification_token)
            .await
        {
            tracing::error!(principal_id = %principal.id, error = %e, "Failed to send verification email");
        }

        let mut event = meta.event(AuditAction::Register, RESOURCE);
        event.actor_id = Some(principal.id);
        event.resource_id = Some(principal.id.to_string());
        event.details = json!({ "email": principal.email });
        event.duration_ms = start.elapsed().as_millis() as i64;
        self.audit.record(event).await;

        tracing::info!(principal_id = %principal.id, "Principal registered");
        Ok(PrincipalResponse::from(principal))
    }

    /// 邮箱验证：激活 pending 账户
    pub async fn verify_email(&self, token: &str, meta: &RequestMeta) -> Result<MessageResponse, AppError> {
        let mut principal = self
            .principals
            .find_by_verification_hash(&hash_token(token))
            .await?
            .ok_or_else(|| AppError::BadRequest("Invalid or expired verification token".to_string()))?;

        principal.email_verified = true;
        principal.verification_token_hash = None;
        if principal.status == PrincipalStatus::Pending {
            principal.status = PrincipalStatus::Active;
        }
        principal.updated_at = Utc::now();
        self.principals.save(&principal).await?;

        let mut event = meta.event(AuditAction::EmailVerified, RESOURCE);
        event.actor_id = Some(principal.id);
        event.resource_id = Some(principal.id.to_string());
        self.audit.record(event).await;

        Ok(MessageResponse::new("Email verified successfully"))
    }

    /// 登录：校验凭据，签发令牌对并登记刷新令牌
    pub async fn login(&self, req: LoginRequest, meta: &RequestMeta) -> Result<(LoginResponse, TokenPair), AppError> {
        let start = Instant::now();
        let email = normalize_email(&req.email);
        let found = self.principals.find_by_email(&email).await?;

        // 所有失败对外都是同一个错误，具体原因只进审计记录
        let failure = match &found {
            None => {
                self.passwords.verify_dummy(&req.password);
                Some("unknown_email")
            }
            Some(p) => match self.passwords.verify(&req.password, &p.password_hash) {
                Err(AppError::Unauthorized(_)) => Some("invalid_password"),
                Err(other) => return Err(other),
                Ok(()) if !p.is_active() => Some("account_inactive"),
                Ok(()) => None,
            },
        };

        if let Some(reason) = failure {
            metrics::counter!("login_attempts_total", "result" => "failure").increment(1);
            tracing::warn!(email = %email, reason, "Login failed");

            // 匿名失败按邮箱归属到对应主体
            let mut event = meta.event(AuditAction::LoginFailed, RESOURCE);
            event.actor_id = found.as_ref().map(|p| p.id);
            event.details = json!({ "email": email, "reason": reason });
            event.success = false;
            event.error_message = Some("Invalid email or password".to_string());
            event.duration_ms = start.elapsed().as_millis() as i64;
            self.audit.record(event).await;

            return Err(AppError::Unauthorized(AuthFailure::BadCredentials));
        }

        let Some(mut principal) = found else {
            return Err(AppError::Unauthorized(AuthFailure::BadCredentials));
        };

        principal.last_login_at = Some(Utc::now());
        self.principals.save(&principal).await?;

        let pair = self.issue_and_register(&principal, meta, None).await?;

        metrics::counter!("login_attempts_total", "result" => "success").increment(1);
        let mut event = meta.event(AuditAction::Login, RESOURCE);
        event.actor_id = Some(principal.id);
        event.resource_id = Some(principal.id.to_string());
        event.details = json!({ "email": principal.email });
        event.duration_ms = start.elapsed().as_millis() as i64;
        self.audit.record(event).await;

        tracing::info!(principal_id = %principal.id, "Login succeeded");

        let response = LoginResponse {
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
            expires_in: pair.expires_in,
            user: SessionUser::from(&principal),
        };
        Ok((response, pair))
    }

    /// 刷新：校验刷新令牌，吊销旧令牌并签发新的令牌对
    ///
    /// 已吊销的令牌再次出现视为重放，吊销该主体的全部刷新令牌。
    pub async fn refresh(&self, refresh_token: &str, meta: &RequestMeta) -> Result<TokenPair, AppError> {
        let claims = self.tokens.verify_refresh(refresh_token)?;

        let record = self
            .refresh_tokens
            .find_by_hash(&hash_token(refresh_token))
            .await?
            .ok_or(AppError::Unauthorized(AuthFailure::InvalidToken))?;

        if record.principal_id != claims.sub {
            return Err(AppError::Unauthorized(AuthFailure::InvalidToken));
        }

        if record.revoked_at.is_some() {
            let revoked = self.refresh_tokens.revoke_all(record.principal_id).await?;
            metrics::counter!("refresh_token_reuse_total").increment(1);
            tracing::warn!(
                principal_id = %record.principal_id,
                revoked,
                "Revoked refresh token presented again; all sessions revoked"
            );
            return Err(AppError::Unauthorized(AuthFailure::RefreshRevoked));
        }

        if record.expires_at <= Utc::now() {
            return Err(AppError::Unauthorized(AuthFailure::Expired));
        }

        let principal = self
            .principals
            .find_by_id(record.principal_id)
            .await?
            .ok_or(AppError::Unauthorized(AuthFailure::PrincipalNotFound))?;

        if !principal.is_active() {
            return Err(AppError::Unauthorized(AuthFailure::PrincipalInactive));
        }

        // 并发刷新时只有一个请求能吊销成功
        if !self.refresh_tokens.revoke(record.id).await? {
            return Err(AppError::Unauthorized(AuthFailure::RefreshRevoked));
        }

        let pair = self.issue_and_register(&principal, meta, Some(record.id)).await?;
        tracing::debug!(principal_id = %principal.id, "Refresh token rotated");
        Ok(pair)
    }

    /// 登出：吊销本次提交的刷新令牌（若属于当前主体）
    pub async fn logout(&self, ctx: &AuthContext, refresh_token: Option<&str>) -> Result<Outcome<MessageResponse>, AppError> {
        let mut revoked = false;

        if let Some(token) = refresh_token {
            if let Some(record) = self.refresh_tokens.find_by_hash(&hash_token(token)).await? {
                if record.principal_id == ctx.id() {
                    revoked = self.refresh_tokens.revoke(record.id).await?;
                }
            }
        }

        tracing::info!(principal_id = %ctx.id(), revoked, "Logout");
        Ok(Outcome::new(MessageResponse::new("Logged out successfully"))
            .with_resource_id(ctx.id())
            .with_detail("refreshTokenRevoked", json!(revoked)))
    }

    /// 修改密码：校验当前密码，吊销全部刷新令牌
    pub async fn change_password(
        &self,
        ctx: &AuthContext,
        req: &ChangePasswordRequest,
    ) -> Result<Outcome<MessageResponse>, AppError> {
        PasswordHasher::validate_password_policy(&req.new_password, &self.security, "newPassword")?;

        let mut principal = self
            .principals
            .find_by_id(ctx.id())
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;

        match self.passwords.verify(&req.current_password, &principal.password_hash) {
            Ok(()) => {}
            Err(AppError::Unauthorized(_)) => {
                return Err(AppError::BadRequest("Current password is incorrect".to_string()))
            }
            Err(other) => return Err(other),
        }

        principal.password_hash = self.passwords.hash(&req.new_password)?;
        principal.updated_by = Some(ctx.id());
        principal.updated_at = Utc::now();
        self.principals.save(&principal).await?;

        let revoked = self.refresh_tokens.revoke_all(principal.id).await?;

        Ok(Outcome::new(MessageResponse::new("Password changed successfully"))
            .with_resource_id(principal.id)
            .with_detail("sessionsRevoked", json!(revoked)))
    }

    /// 申请重置密码：无论邮箱是否存在都返回同样的消息
    pub async fn forgot_password(&self, email: &str, meta: &RequestMeta) -> Result<MessageResponse, AppError> {
        let email = normalize_email(email);

        if let Some(mut principal) = self.principals.find_by_email(&email).await? {
            if principal.is_active() {
                let token = generate_opaque_token();
                principal.reset_token_hash = Some(hash_token(&token));
                principal.reset_token_expires_at =
                    Some(Utc::now() + Duration::seconds(self.security.reset_token_exp_secs as i64));
                principal.updated_at = Utc::now();
                self.principals.save(&principal).await?;

                let minutes = self.security.reset_token_exp_secs.div_ceil(60);
                if let Err(e) = self
                    .mail
                    .send_password_reset(&principal.email, &principal.name, &token, minutes)
                    .await
                {
                    tracing::error!(principal_id = %principal.id, error = %e, "Failed to send reset email");
                }

                let mut event = meta.event(AuditAction::PasswordResetRequest, RESOURCE);
                event.actor_id = Some(principal.id);
                event.resource_id = Some(principal.id.to_string());
                event.details = json!({ "email": principal.email });
                self.audit.record(event).await;
            }
        } else {
            tracing::debug!("Password reset requested for unknown email");
        }

        Ok(MessageResponse::new(FORGOT_PASSWORD_MESSAGE))
    }

    /// 使用重置令牌设置新密码
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        meta: &RequestMeta,
    ) -> Result<MessageResponse, AppError> {
        PasswordHasher::validate_password_policy(new_password, &self.security, "password")?;

        let start = Instant::now();
        let found = self.principals.find_by_reset_hash(&hash_token(token)).await?;
        let mut principal = match found {
            Some(p) if p.reset_token_expires_at.is_some_and(|exp| exp > Utc::now()) => p,
            other => {
                let mut event = meta.event(AuditAction::PasswordReset, RESOURCE);
                event.actor_id = other.map(|p| p.id);
                event.success = false;
                event.error_message = Some("Invalid or expired reset token".to_string());
                event.duration_ms = start.elapsed().as_millis() as i64;
                self.audit.record(event).await;
                return Err(AppError::BadRequest("Invalid or expired reset token".to_string()));
            }
        };

        principal.password_hash = self.passwords.hash(new_password)?;
        principal.reset_token_hash = None;
        principal.reset_token_expires_at = None;
        principal.updated_at = Utc::now();
        self.principals.save(&principal).await?;

        let revoked = self.refresh_tokens.revoke_all(principal.id).await?;

        let mut event = meta.event(AuditAction::PasswordReset, RESOURCE);
        event.actor_id = Some(principal.id);
        event.resource_id = Some(principal.id.to_string());
        event.details = json!({ "sessionsRevoked": revoked });
        event.duration_ms = start.elapsed().as_millis() as i64;
        self.audit.record(event).await;

        Ok(MessageResponse::new("Password has been reset"))
    }

    async fn issue_and_register(
        &self,
        principal: &Principal,
        meta: &RequestMeta,
        rotated_from: Option<Uuid>,
    ) -> Result<TokenPair, AppError> {
        let pair = self.tokens.issue(principal)?;

        let record = RefreshTokenRecord {
            id: Uuid::new_v4(),
            token_hash: hash_token(&pair.refresh_token),
            principal_id: principal.id,
            user_agent: Some(meta.user_agent.clone()),
            ip_address: meta.ip.clone(),
            expires_at: pair.refresh_expires_at,
            revoked_at: None,
            rotated_from,
            created_at: Utc::now(),
        };
        self.refresh_tokens.store(&record).await?;

        Ok(pair)
    }
}
