//! Refresh token cookie

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

pub const REFRESH_COOKIE: &str = "refreshToken";
/// Only the auth endpoints ever read the refresh token
pub const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";

/// httpOnly, SameSite=Strict cookie carrying the refresh token
pub fn refresh_cookie(token: &str, max_age_secs: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path(REFRESH_COOKIE_PATH)
        .max_age(Duration::seconds(max_age_secs as i64))
        .build()
}

/// Expired cookie that clears the refresh token
pub fn clear_refresh_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, String::new()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path(REFRESH_COOKIE_PATH)
        .max_age(Duration::ZERO)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_cookie_attributes() {
        let cookie = refresh_cookie("tok", 604800, true);
        let rendered = cookie.to_string();

        assert_eq!(cookie.name(), "refreshToken");
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("SameSite=Strict"));
        assert!(rendered.contains("Max-Age=604800"));
        assert!(rendered.contains("Path=/api/v1/auth"));
    }

    #[test]
    fn test_clear_cookie_expires_immediately() {
        let rendered = clear_refresh_cookie(false).to_string();
        assert!(rendered.contains("Max-Age=0"));
        assert!(!rendered.contains("Secure"));
        assert!(rendered.contains("Path=/api/v1/auth"));
    }
}
