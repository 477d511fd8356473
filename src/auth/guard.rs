//! Route guard applied in front of every request.
//!
//! [`decide`] is the whole policy; [`session_guard`] only reads the cookie,
//! asks the codec, and carries out the decision.
use super::token::{SessionPayload, TokenCodec, Verification};
use super::{COOKIE_NAME, removal_cookie};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use log::debug;
use std::sync::Arc;

pub const LOGIN_PATH: &str = "/auth/login";
pub const DASHBOARD_PATH: &str = "/dashboard";
const AUTH_PREFIX: &str = "/auth";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Protected,
    AuthOnly,
    Public,
}

/// `true` for `prefix` itself and anything below it, but not `prefixfoo`.
fn under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

pub fn classify(path: &str) -> RouteClass {
    if under(path, DASHBOARD_PATH) {
        RouteClass::Protected
    } else if under(path, AUTH_PREFIX) {
        RouteClass::AuthOnly
    } else {
        RouteClass::Public
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Absent,
    Valid(SessionPayload),
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Continue, with the session attached when there is one.
    Pass(Option<SessionPayload>),
    Redirect {
        to: &'static str,
        clear_cookie: bool,
    },
}

pub fn decide(class: RouteClass, token: TokenState) -> GuardDecision {
    let to_login = |clear_cookie| GuardDecision::Redirect {
        to: LOGIN_PATH,
        clear_cookie,
    };

    match (class, token) {
        (RouteClass::Protected, TokenState::Valid(payload)) => GuardDecision::Pass(Some(payload)),
        (RouteClass::Protected, _) => to_login(false),
        (RouteClass::AuthOnly, TokenState::Valid(_)) => GuardDecision::Redirect {
            to: DASHBOARD_PATH,
            clear_cookie: false,
        },
        (RouteClass::AuthOnly, TokenState::Invalid) => to_login(true),
        (RouteClass::AuthOnly, TokenState::Absent) => GuardDecision::Pass(None),
        (RouteClass::Public, TokenState::Valid(payload)) => GuardDecision::Pass(Some(payload)),
        (RouteClass::Public, _) => GuardDecision::Pass(None),
    }
}

pub fn token_state(codec: &TokenCodec, jar: &CookieJar) -> TokenState {
    match jar.get(COOKIE_NAME) {
        None => TokenState::Absent,
        Some(cookie) => match codec.verify(cookie.value()) {
            Verification::Valid(payload) => TokenState::Valid(payload),
            Verification::Invalid => TokenState::Invalid,
        },
    }
}

/// Axum middleware enforcing [`decide`]. Valid sessions are inserted into the
/// request extensions as [`SessionPayload`].
pub async fn session_guard(
    State(codec): State<Arc<TokenCodec>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let class = classify(request.uri().path());
    let state = token_state(&codec, &jar);

    match decide(class, state) {
        GuardDecision::Pass(session) => {
            if let Some(payload) = session {
                request.extensions_mut().insert(payload);
            }
            next.run(request).await
        }
        GuardDecision::Redirect { to, clear_cookie } => {
            debug!("Guard redirects {} to {}", request.uri().path(), to);
            if clear_cookie {
                (jar.remove(removal_cookie()), Redirect::temporary(to)).into_response()
            } else {
                Redirect::temporary(to).into_response()
            }
        }
    }
}
