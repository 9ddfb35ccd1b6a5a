//! Authentication and authorization module

pub mod cookies;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod privileged;

pub use jwt::{Claims, TokenPair, TokenService};
pub use middleware::{extract_token, AuthContext, AuthGate};
pub use password::PasswordHasher;
pub use privileged::{ActionPolicy, Outcome, Privileged};

use rand::RngCore;
use sha2::{Digest, Sha256};

/// SHA-256 hex digest used to store opaque tokens
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// 32 random bytes, hex encoded
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
