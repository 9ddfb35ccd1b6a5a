//! Password hashing and verification using Argon2id

use crate::{
    config::SecurityConfig,
    error::{AppError, AuthFailure},
};
use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

/// Password hasher with configurable parameters
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    /// Hash verified against when no principal matches, so unknown emails cost the same
    dummy_hash: Option<String>,
}

impl PasswordHasher {
    /// Create hasher with default parameters (OWASP recommended)
    pub fn new() -> Self {
        // m=19MiB, t=2 iterations, p=1 lane
        Self::with_params(Params::new(19456, 2, 1, None).unwrap_or_default())
    }

    pub fn with_params(params: Params) -> Self {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = argon2
            .hash_password(b"no-such-principal", &salt)
            .ok()
            .map(|h| h.to_string());

        Self { argon2, dummy_hash }
    }

    /// Hash a password
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!("Failed to hash password: {:?}", e);
                AppError::Internal(format!("Failed to hash password: {}", e))
            })?
            .to_string();

        Ok(password_hash)
    }

    /// Verify a password against a hash (constant-time comparison inside argon2)
    pub fn verify(&self, password: &str, hash: &str) -> Result<(), AppError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            tracing::error!("Failed to parse password hash: {:?}", e);
            AppError::Internal(format!("Failed to parse password hash: {}", e))
        })?;

        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AppError::Unauthorized(AuthFailure::BadCredentials))
    }

    /// Burn one verification without a stored hash; always fails
    pub fn verify_dummy(&self, password: &str) {
        if let Some(hash) = &self.dummy_hash {
            let _ = self.verify(password, hash);
        }
    }

    /// Validate password against policy; failures are reported on `field`
    pub fn validate_password_policy(
        password: &str,
        policy: &SecurityConfig,
        field: &str,
    ) -> Result<(), AppError> {
        if password.chars().count() < policy.password_min_length {
            return Err(AppError::invalid_field(
                field,
                &format!("Password must be at least {} characters", policy.password_min_length),
            ));
        }

        if policy.password_require_uppercase && !password.chars().any(|c| c.is_uppercase()) {
            return Err(AppError::invalid_field(
                field,
                "Password must contain at least one uppercase letter",
            ));
        }

        if policy.password_require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(AppError::invalid_field(field, "Password must contain at least one digit"));
        }

        if policy.password_require_special && password.chars().all(|c| c.is_alphanumeric()) {
            return Err(AppError::invalid_field(
                field,
                "Password must contain at least one special character",
            ));
        }

        Ok(())
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn fast_hasher() -> PasswordHasher {
        PasswordHasher::with_params(Params::new(8, 1, 1, None).unwrap())
    }

    fn policy() -> SecurityConfig {
        SecurityConfig {
            access_token_secret: Secret::new("a".repeat(32)),
            refresh_token_secret: Secret::new("r".repeat(32)),
            access_token_exp_secs: 900,
            refresh_token_exp_secs: 604800,
            reset_token_exp_secs: 600,
            password_min_length: 8,
            password_require_uppercase: true,
            password_require_digit: true,
            password_require_special: false,
            cookie_secure: true,
            trust_proxy: true,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = fast_hasher();
        let hash = hasher.hash("TestPassword123!").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        hasher.verify("TestPassword123!", &hash).unwrap();
    }

    #[test]
    fn test_verify_fails_with_wrong_password() {
        let hasher = fast_hasher();
        let hash = hasher.hash("TestPassword123!").unwrap();

        let err = hasher.verify("WrongPassword", &hash).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(AuthFailure::BadCredentials)));
    }

    #[test]
    fn test_dummy_verify_uses_real_hash() {
        let hasher = fast_hasher();
        assert!(hasher.dummy_hash.as_deref().is_some_and(|h| h.starts_with("$argon2id$")));
        hasher.verify_dummy("anything");
    }

    #[test]
    fn test_hash_is_different_each_time() {
        let hasher = fast_hasher();
        let hash1 = hasher.hash("TestPassword123!").unwrap();
        let hash2 = hasher.hash("TestPassword123!").unwrap();

        assert_ne!(hash1, hash2);
        hasher.verify("TestPassword123!", &hash1).unwrap();
        hasher.verify("TestPassword123!", &hash2).unwrap();
    }

    #[test]
    fn test_default_params_verify_fast_hash() {
        // Params live in the PHC string, so any hasher can verify
        let hash = fast_hasher().hash("TestPassword123!").unwrap();
        PasswordHasher::new().verify("TestPassword123!", &hash).unwrap();
    }

    #[test]
    fn test_password_policy_validation() {
        let policy = policy();

        assert!(PasswordHasher::validate_password_policy("Short1", &policy, "password").is_err());
        assert!(PasswordHasher::validate_password_policy("alllowercase1", &policy, "password").is_err());
        assert!(PasswordHasher::validate_password_policy("NoDigitsHere", &policy, "password").is_err());
        assert!(PasswordHasher::validate_password_policy("ValidPass123", &policy, "password").is_ok());
    }

    #[test]
    fn test_policy_error_names_field() {
        let err = PasswordHasher::validate_password_policy("x", &policy(), "newPassword").unwrap_err();
        match err {
            AppError::Validation(fields) => assert_eq!(fields[0].field, "newPassword"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
