//! Auth gate: bearer extraction, token verification and principal re-load

use crate::{
    auth::jwt::{Claims, TokenService},
    error::{AppError, AuthFailure},
    middleware::AppState,
    models::principal::{PrincipalResponse, Role},
    repository::PrincipalStore,
};
use axum::{extract::FromRequestParts, http::request::Parts, http::header};
use std::sync::Arc;
use uuid::Uuid;

/// Authenticated request context
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Principal as re-loaded from storage, secret fields removed
    pub principal: PrincipalResponse,
    /// Raw access token
    pub token: String,
    pub claims: Claims,
}

impl AuthContext {
    pub fn id(&self) -> Uuid {
        self.principal.id
    }

    pub fn role(&self) -> Role {
        self.principal.role
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value
pub fn extract_token(authorization: Option<&str>) -> Result<&str, AppError> {
    authorization
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized(AuthFailure::MissingToken))
}

pub struct AuthGate {
    tokens: Arc<TokenService>,
    principals: Arc<dyn PrincipalStore>,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenService>, principals: Arc<dyn PrincipalStore>) -> Self {
        Self { tokens, principals }
    }

    /// Authenticate from the raw Authorization header value.
    ///
    /// Every failure surfaces as `Unauthorized` with the reason kept for logs;
    /// storage errors propagate unchanged.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<AuthContext, AppError> {
        let token = extract_token(authorization)?;
        let claims = self.tokens.verify_access(token)?;

        let principal = self
            .principals
            .find_by_id(claims.sub)
            .await?
            .ok_or(AppError::Unauthorized(AuthFailure::PrincipalNotFound))?;

        if !principal.is_active() {
            tracing::debug!(principal_id = %principal.id, status = %principal.status, "Inactive principal rejected");
            return Err(AppError::Unauthorized(AuthFailure::PrincipalInactive));
        }

        Ok(AuthContext {
            principal: PrincipalResponse::from(&principal),
            token: token.to_string(),
            claims,
        })
    }
}

impl FromRequestParts<Arc<AppState>> for AuthContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        state.auth_gate.authenticate(authorization).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::principal::{Principal, PrincipalStatus},
        repository::MemoryStore,
    };
    use std::time::Duration;

    fn gate() -> (AuthGate, Arc<TokenService>, Arc<MemoryStore>) {
        let tokens = Arc::new(
            TokenService::new(
                "access_secret_key_32_characters_long!",
                "refresh_secret_key_32_characters_long",
                Duration::from_secs(900),
                Duration::from_secs(3600),
            )
            .unwrap(),
        );
        let store = Arc::new(MemoryStore::default());
        (AuthGate::new(tokens.clone(), store.clone()), tokens, store)
    }

    fn reason(result: Result<AuthContext, AppError>) -> AuthFailure {
        match result {
            Err(AppError::Unauthorized(reason)) => reason,
            other => panic!("expected unauthorized, got {:?}", other.map(|c| c.principal.id)),
        }
    }

    #[test]
    fn test_extract_token_valid() {
        assert_eq!(extract_token(Some("Bearer abc.def.ghi")).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_extract_token_rejects_other_schemes() {
        assert!(extract_token(Some("Basic dXNlcjpwYXNz")).is_err());
        assert!(extract_token(Some("Bearer ")).is_err());
        assert!(extract_token(None).is_err());
    }

    #[tokio::test]
    async fn test_gate_accepts_active_principal() {
        let (gate, tokens, store) = gate();
        let p = Principal::new("mod@union.org", "h".into(), "Mod", Role::Moderator, PrincipalStatus::Active);
        store.insert(&p).await.unwrap();

        let pair = tokens.issue(&p).unwrap();
        let header = format!("Bearer {}", pair.access_token);
        let ctx = gate.authenticate(Some(&header)).await.unwrap();

        assert_eq!(ctx.id(), p.id);
        assert_eq!(ctx.role(), Role::Moderator);
        assert_eq!(ctx.token, pair.access_token);
    }

    #[tokio::test]
    async fn test_gate_rejects_deactivated_and_missing_principals() {
        let (gate, tokens, store) = gate();
        let mut p = Principal::new("gone@union.org", "h".into(), "Gone", Role::Admin, PrincipalStatus::Active);
        store.insert(&p).await.unwrap();
        let header = format!("Bearer {}", tokens.issue(&p).unwrap().access_token);

        p.status = PrincipalStatus::Inactive;
        store.save(&p).await.unwrap();
        assert_eq!(reason(gate.authenticate(Some(&header)).await), AuthFailure::PrincipalInactive);

        let stranger = Principal::new("x@union.org", "h".into(), "X", Role::Admin, PrincipalStatus::Active);
        let header = format!("Bearer {}", tokens.issue(&stranger).unwrap().access_token);
        assert_eq!(reason(gate.authenticate(Some(&header)).await), AuthFailure::PrincipalNotFound);
    }

    #[tokio::test]
    async fn test_gate_rejects_refresh_token_as_bearer() {
        let (gate, tokens, store) = gate();
        let p = Principal::new("a@union.org", "h".into(), "A", Role::User, PrincipalStatus::Active);
        store.insert(&p).await.unwrap();

        let header = format!("Bearer {}", tokens.issue(&p).unwrap().refresh_token);
        assert_eq!(reason(gate.authenticate(Some(&header)).await), AuthFailure::InvalidToken);
    }
}
