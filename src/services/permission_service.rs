//! 角色检查

use crate::{auth::middleware::AuthContext, error::AppError, models::principal::Role};

/// super_admin, admin
pub const ADMINS: &[Role] = &[Role::SuperAdmin, Role::Admin];
/// super_admin, admin, moderator
pub const STAFF: &[Role] = &[Role::SuperAdmin, Role::Admin, Role::Moderator];
/// 任意已登录角色
pub const ANY_ROLE: &[Role] = &Role::ALL;

pub struct PermissionService;

impl PermissionService {
    /// 角色是否在允许集合内
    pub fn has_role(role: Role, allowed: &[Role]) -> bool {
        allowed.contains(&role)
    }

    /// 检查角色，无权限时返回 403
    pub fn require_role(ctx: &AuthContext, allowed: &[Role]) -> Result<(), AppError> {
        if Self::has_role(ctx.role(), allowed) {
            return Ok(());
        }

        tracing::warn!(
            principal_id = %ctx.id(),
            role = %ctx.role(),
            "Permission denied"
        );
        Err(AppError::forbidden("Insufficient permissions"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_sets() {
        assert!(PermissionService::has_role(Role::Admin, ADMINS));
        assert!(!PermissionService::has_role(Role::Moderator, ADMINS));
        assert!(PermissionService::has_role(Role::Moderator, STAFF));
        assert!(!PermissionService::has_role(Role::User, STAFF));
        assert!(PermissionService::has_role(Role::User, ANY_ROLE));
    }
}
