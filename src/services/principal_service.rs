//! 账户管理服务
//! 列表、详情、创建、更新、软删除与批量操作

use crate::{
    auth::{middleware::AuthContext, password::PasswordHasher, privileged::Outcome},
    config::SecurityConfig,
    error::AppError,
    models::{
        audit::{AuditAction, AuditFilter, AuditRecord},
        auth::MessageResponse,
        pagination,
        principal::{
            normalize_email, BulkAction, BulkRequest, BulkResponse, CreatePrincipalRequest,
            ListPrincipalsQuery, Principal, PrincipalDetailResponse, PrincipalFilter,
            PrincipalResponse, PrincipalStatus, Role, UpdatePrincipalRequest,
        },
        Page,
    },
    repository::{PrincipalStore, RefreshTokenStore},
    services::AuditService,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const RECENT_ACTIVITY: i64 = 10;

pub struct PrincipalService {
    principals: Arc<dyn PrincipalStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    passwords: Arc<PasswordHasher>,
    audit: Arc<AuditService>,
    security: SecurityConfig,
}

fn snapshot(p: &Principal) -> Value {
    serde_json::to_value(PrincipalResponse::from(p)).unwrap_or(Value::Null)
}

impl PrincipalService {
    pub fn new(
        principals: Arc<dyn PrincipalStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        passwords: Arc<PasswordHasher>,
        audit: Arc<AuditService>,
        security: SecurityConfig,
    ) -> Self {
        Self {
            principals,
            refresh_tokens,
            passwords,
            audit,
            security,
        }
    }

    async fn load(&self, id: Uuid) -> Result<Principal, AppError> {
        self.principals
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("User"))
    }

    /// 分页列表
    pub async fn list(&self, query: &ListPrincipalsQuery) -> Result<Outcome<Page<PrincipalResponse>>, AppError> {
        let (page, limit, offset) = pagination(query.page, query.limit);
        let filter = PrincipalFilter {
            role: query.role,
            status: query.status,
            search: query.search.clone(),
        };

        let total = self.principals.count(&filter).await?;
        let items = self
            .principals
            .list(&filter, limit as i64, offset)
            .await?
            .iter()
            .map(PrincipalResponse::from)
            .collect::<Vec<_>>();

        let returned = items.len();
        Ok(Outcome::new(Page::new(items, total, page, limit)).with_detail("returned", json!(returned)))
    }

    /// 详情（附最近操作记录）
    pub async fn detail(&self, id: Uuid) -> Result<Outcome<PrincipalDetailResponse>, AppError> {
        let principal = self.load(id).await?;
        let recent_activity = self.audit.recent_for_actor(id, RECENT_ACTIVITY).await?;

        Ok(Outcome::new(PrincipalDetailResponse {
            user: PrincipalResponse::from(&principal),
            recent_activity,
        }))
    }

    /// 某个主体的操作记录
    pub async fn activity(
        &self,
        id: Uuid,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Outcome<Page<AuditRecord>>, AppError> {
        self.load(id).await?;
        let (page, limit, offset) = pagination(page, limit);
        let filter = AuditFilter {
            actor_id: Some(id),
            ..Default::default()
        };

        let total = self.audit.count(&filter).await?;
        let items = self.audit.query(&filter, limit as i64, offset).await?;
        Ok(Outcome::new(Page::new(items, total, page, limit)))
    }

    /// 管理员创建账户
    pub async fn create(
        &self,
        ctx: &AuthContext,
        req: CreatePrincipalRequest,
    ) -> Result<Outcome<PrincipalResponse>, AppError> {
        PasswordHasher::validate_password_policy(&req.password, &self.security, "password")?;

        let role = req.role.unwrap_or(Role::User);
        if role == Role::SuperAdmin && ctx.role() != Role::SuperAdmin {
            return Err(AppError::forbidden("Only super admins can create super admin accounts"));
        }

        let email = normalize_email(&req.email);
        if self.principals.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("email".to_string()));
        }

        let mut principal = Principal::new(
            &email,
            self.passwords.hash(&req.password)?,
            &req.name,
            role,
            req.status.unwrap_or(PrincipalStatus::Active),
        );
        principal.phone = req.phone;
        principal.department = req.department;
        principal.email_verified = true;
        principal.created_by = Some(ctx.id());
        principal.updated_by = Some(ctx.id());

        self.principals.insert(&principal).await?;
        tracing::info!(principal_id = %principal.id, created_by = %ctx.id(), "Principal created");

        Ok(Outcome::new(PrincipalResponse::from(&principal))
            .with_resource_id(principal.id)
            .with_changes(Value::Null, snapshot(&principal)))
    }

    /// 更新账户；编辑自己时忽略 role/status
    pub async fn update(
        &self,
        ctx: &AuthContext,
        id: Uuid,
        req: UpdatePrincipalRequest,
    ) -> Result<Outcome<PrincipalResponse>, AppError> {
        let req = if id == ctx.id() {
            req.without_privileged_fields()
        } else {
            req
        };

        let mut principal = self.load(id).await?;
        let before = snapshot(&principal);
        let caller_is_super = ctx.role() == Role::SuperAdmin;

        if principal.role == Role::SuperAdmin && !caller_is_super && id != ctx.id() {
            return Err(AppError::forbidden("Only super admins can modify super admin accounts"));
        }
        if req.role == Some(Role::SuperAdmin) && !caller_is_super {
            return Err(AppError::forbidden("Only super admins can assign the super admin role"));
        }

        if let Some(email) = req.email.as_deref() {
            let email = normalize_email(email);
            if email != principal.email {
                if self.principals.find_by_email(&email).await?.is_some() {
                    return Err(AppError::Conflict("email".to_string()));
                }
                principal.email = email;
            }
        }
        if let Some(name) = req.name {
            principal.name = name.trim().to_string();
        }
        if let Some(phone) = req.phone {
            principal.phone = Some(phone);
        }
        if let Some(department) = req.department {
            principal.department = Some(department);
        }

        let role_changed = req.role.is_some_and(|r| r != principal.role);
        let status_changed = req.status.is_some_and(|s| s != principal.status);
        if let Some(role) = req.role {
            principal.role = role;
        }
        if let Some(status) = req.status {
            principal.status = status;
        }

        principal.updated_by = Some(ctx.id());
        principal.updated_at = Utc::now();
        self.principals.save(&principal).await?;

        if status_changed && !principal.is_active() {
            self.refresh_tokens.revoke_all(principal.id).await?;
        }

        let mut outcome = Outcome::new(PrincipalResponse::from(&principal))
            .with_resource_id(principal.id)
            .with_changes(before, snapshot(&principal));
        if role_changed {
            outcome = outcome.with_detail("roleChanged", json!(principal.role));
        }
        if status_changed {
            outcome = outcome.with_detail("statusChanged", json!(principal.status));
        }
        Ok(outcome)
    }

    /// 软删除：状态置为 inactive 并吊销会话
    pub async fn deactivate(&self, ctx: &AuthContext, id: Uuid) -> Result<Outcome<MessageResponse>, AppError> {
        if id == ctx.id() {
            return Err(AppError::forbidden("You cannot delete your own account"));
        }

        let mut principal = self.load(id).await?;
        if principal.role == Role::SuperAdmin && ctx.role() != Role::SuperAdmin {
            return Err(AppError::forbidden("Only super admins can delete super admin accounts"));
        }

        let before = snapshot(&principal);
        principal.status = PrincipalStatus::Inactive;
        principal.updated_by = Some(ctx.id());
        principal.updated_at = Utc::now();
        self.principals.save(&principal).await?;
        self.refresh_tokens.revoke_all(principal.id).await?;

        tracing::info!(principal_id = %id, by = %ctx.id(), "Principal deactivated");
        Ok(Outcome::new(MessageResponse::new("User deactivated successfully"))
            .with_resource_id(id)
            .with_changes(before, snapshot(&principal)))
    }

    /// 批量操作
    pub async fn bulk(&self, ctx: &AuthContext, req: &BulkRequest) -> Result<Outcome<BulkResponse>, AppError> {
        if req.user_ids.contains(&ctx.id()) {
            return Err(AppError::forbidden("Cannot perform bulk operations on your own account"));
        }

        let mut targets = Vec::with_capacity(req.user_ids.len());
        for id in &req.user_ids {
            if let Some(p) = self.principals.find_by_id(*id).await? {
                targets.push(p);
            }
        }

        let outcome_details = json!({
            "operation": req.action,
            "requested": req.user_ids.len(),
            "found": targets.len(),
        });

        let response = match req.action {
            BulkAction::Export => BulkResponse {
                action: req.action,
                affected: targets.len() as u64,
                users: Some(targets.iter().map(PrincipalResponse::from).collect()),
            },
            action => {
                if ctx.role() != Role::SuperAdmin && targets.iter().any(|p| p.role == Role::SuperAdmin) {
                    return Err(AppError::forbidden("Only super admins can modify super admin accounts"));
                }

                let status = match action {
                    BulkAction::Activate => PrincipalStatus::Active,
                    _ => PrincipalStatus::Inactive,
                };
                let ids: Vec<Uuid> = targets.iter().map(|p| p.id).collect();
                let affected = self.principals.set_status_many(&ids, status, ctx.id()).await?;

                if status == PrincipalStatus::Inactive {
                    for id in &ids {
                        self.refresh_tokens.revoke_all(*id).await?;
                    }
                }

                BulkResponse {
                    action,
                    affected,
                    users: None,
                }
            }
        };

        let mut outcome = Outcome::new(response).with_detail("bulk", outcome_details);
        if req.action == BulkAction::Export {
            outcome = outcome.with_detail("exportAction", json!(AuditAction::Export));
        }
        Ok(outcome)
    }
}
