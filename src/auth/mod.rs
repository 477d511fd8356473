pub mod guard;
pub mod password;
pub mod token;

pub use guard::{GuardDecision, RouteClass, TokenState, classify, decide, session_guard};
pub use token::{SessionPayload, TokenCodec, TokenError, Verification};

use axum_extra::extract::cookie::{Cookie, SameSite};

pub const COOKIE_NAME: &str = "token";

/// HTTP-only session cookie valid for the lifetime of the token.
pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(token::TOKEN_TTL_SECS as i64))
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, "")).path("/").build()
}
