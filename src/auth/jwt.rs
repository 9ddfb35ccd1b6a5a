//! JWT token generation and validation
//! Access tokens and refresh tokens are signed with separate secrets

use crate::{
    config::SecurityConfig,
    error::{AppError, AuthFailure},
    models::principal::{Principal, Role},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

const ACCESS: &str = "access";
const REFRESH: &str = "refresh";

/// JWT claims shared by both token types
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject (principal ID)
    pub sub: Uuid,

    pub email: String,

    pub role: Role,

    /// Token type (access or refresh)
    pub token_type: String,

    /// Issued at
    pub iat: i64,

    /// Expiration
    pub exp: i64,

    /// JWT ID (unique token identifier)
    pub jti: String,
}

/// Freshly minted token pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub expires_in: u64,
    pub refresh_expires_at: DateTime<Utc>,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Issues and verifies access/refresh tokens
pub struct TokenService {
    access: SigningKeys,
    refresh: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
}

impl TokenService {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, AppError> {
        // HS256 needs at least 32 bytes of key material
        if access_secret.len() < 32 || refresh_secret.len() < 32 {
            return Err(AppError::Config("token secret too short (min 32 chars)".to_string()));
        }
        if access_secret == refresh_secret {
            return Err(AppError::Config("access and refresh secrets must differ".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;

        Ok(Self {
            access: SigningKeys::from_secret(access_secret),
            refresh: SigningKeys::from_secret(refresh_secret),
            access_ttl,
            refresh_ttl,
            validation,
        })
    }

    /// Create token service from config
    pub fn from_config(config: &SecurityConfig) -> Result<Self, AppError> {
        Self::new(
            config.access_token_secret.expose_secret(),
            config.refresh_token_secret.expose_secret(),
            Duration::from_secs(config.access_token_exp_secs),
            Duration::from_secs(config.refresh_token_exp_secs),
        )
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn sign(&self, principal: &Principal, token_type: &str) -> Result<(String, Claims), AppError> {
        let (keys, ttl) = match token_type {
            ACCESS => (&self.access, self.access_ttl),
            _ => (&self.refresh, self.refresh_ttl),
        };

        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: principal.id,
            email: principal.email.clone(),
            role: principal.role,
            token_type: token_type.to_string(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).map_err(|e| {
            tracing::error!("Failed to encode {} token: {:?}", token_type, e);
            AppError::Internal(format!("Failed to encode {} token", token_type))
        })?;

        Ok((token, claims))
    }

    /// Issue an access token and a refresh token for the principal
    pub fn issue(&self, principal: &Principal) -> Result<TokenPair, AppError> {
        let (access_token, _) = self.sign(principal, ACCESS)?;
        let (refresh_token, refresh_claims) = self.sign(principal, REFRESH)?;

        let refresh_expires_at = DateTime::<Utc>::from_timestamp(refresh_claims.exp, 0)
            .ok_or_else(|| AppError::internal_error("refresh expiry out of range"))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_ttl.as_secs(),
            refresh_expires_at,
        })
    }

    fn verify(&self, token: &str, keys: &SigningKeys, expected_type: &str) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(token, &keys.decoding, &self.validation)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => AuthFailure::Expired,
                    ErrorKind::InvalidToken
                    | ErrorKind::Base64(_)
                    | ErrorKind::Json(_)
                    | ErrorKind::Utf8(_) => AuthFailure::MalformedToken,
                    _ => AuthFailure::InvalidToken,
                };
                tracing::debug!(token_type = expected_type, ?reason, "Token validation failed: {:?}", e);
                AppError::Unauthorized(reason)
            })?
            .claims;

        if claims.token_type != expected_type {
            tracing::debug!(
                "Token type mismatch: expected '{}', got '{}'",
                expected_type,
                claims.token_type
            );
            return Err(AppError::Unauthorized(AuthFailure::InvalidToken));
        }

        Ok(claims)
    }

    /// Verify an access token against the access secret
    pub fn verify_access(&self, token: &str) -> Result<Claims, AppError> {
        self.verify(token, &self.access, ACCESS)
    }

    /// Verify a refresh token against the refresh secret
    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AppError> {
        self.verify(token, &self.refresh, REFRESH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::principal::PrincipalStatus;

    const ACCESS_SECRET: &str = "access_secret_key_32_characters_long!";
    const REFRESH_SECRET: &str = "refresh_secret_key_32_characters_long";

    fn service() -> TokenService {
        TokenService::new(
            ACCESS_SECRET,
            REFRESH_SECRET,
            Duration::from_secs(900),
            Duration::from_secs(604800),
        )
        .unwrap()
    }

    fn principal() -> Principal {
        Principal::new("officer@union.org", "hash".into(), "Officer", Role::Admin, PrincipalStatus::Active)
    }

    fn reason(err: AppError) -> AuthFailure {
        match err {
            AppError::Unauthorized(reason) => reason,
            other => panic!("expected unauthorized, got {:?}", other),
        }
    }

    #[test]
    fn test_issue_and_verify_pair() {
        let service = service();
        let p = principal();

        let pair = service.issue(&p).unwrap();
        let access = service.verify_access(&pair.access_token).unwrap();
        let refresh = service.verify_refresh(&pair.refresh_token).unwrap();

        assert_eq!(access.sub, p.id);
        assert_eq!(refresh.sub, p.id);
        assert_eq!(access.email, "officer@union.org");
        assert_eq!(access.role, Role::Admin);
        assert_eq!(pair.expires_in, 900);
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let service = service();
        let pair = service.issue(&principal()).unwrap();

        assert!(service.verify_refresh(&pair.access_token).is_err());
        assert!(service.verify_access(&pair.refresh_token).is_err());
    }

    #[test]
    fn test_foreign_secret_never_validates() {
        let other = TokenService::new(
            "another_access_secret_32_characters!!",
            "another_refresh_secret_32_characters!",
            Duration::from_secs(900),
            Duration::from_secs(604800),
        )
        .unwrap();
        let pair = other.issue(&principal()).unwrap();

        assert_eq!(reason(service().verify_access(&pair.access_token).unwrap_err()), AuthFailure::InvalidToken);
        assert!(service().verify_refresh(&pair.refresh_token).is_err());
    }

    #[test]
    fn test_expired_access_token_rejected_without_leeway() {
        let service = service();
        let p = principal();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: p.id,
            email: p.email.clone(),
            role: p.role,
            token_type: ACCESS.to_string(),
            iat: now - 10,
            exp: now - 1,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &service.access.encoding).unwrap();

        assert_eq!(reason(service.verify_access(&token).unwrap_err()), AuthFailure::Expired);

        // Refresh token of the same principal is still good
        let pair = service.issue(&p).unwrap();
        assert!(service.verify_refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert_eq!(reason(service().verify_access("not-a-jwt").unwrap_err()), AuthFailure::MalformedToken);
    }

    #[test]
    fn test_each_issue_has_unique_jti() {
        let service = service();
        let p = principal();
        let a = service.issue(&p).unwrap();
        let b = service.issue(&p).unwrap();
        assert_ne!(a.refresh_token, b.refresh_token);
    }

    #[test]
    fn test_rejects_shared_or_short_secrets() {
        let ttl = Duration::from_secs(60);
        assert!(TokenService::new("short", REFRESH_SECRET, ttl, ttl).is_err());
        assert!(TokenService::new(ACCESS_SECRET, ACCESS_SECRET, ttl, ttl).is_err());
    }
}
