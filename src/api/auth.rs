use super::{ApiError, AppState};
use crate::auth::guard::{DASHBOARD_PATH, LOGIN_PATH};
use crate::auth::{SessionPayload, removal_cookie, session_cookie};
use crate::store::{NewUser, User, authenticate};
use axum::Extension;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Redirect};
use axum_extra::extract::CookieJar;
use log::{info, warning};
use serde::{Deserialize, Serialize};

const CREDENTIALS_REQUIRED: &str = "Email and password are required";
const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub message: String,
    pub user: PublicUser,
}


pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<UserResponse>), ApiError> {
    let Json(request) = body.map_err(|_| ApiError::BadRequest(CREDENTIALS_REQUIRED.into()))?;
    let email = request.email.filter(|e| !e.trim().is_empty());
    let password = request.password.filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (email, password) else {
        return Err(ApiError::BadRequest(CREDENTIALS_REQUIRED.into()));
    };

    let record = state.users.find_by_email(&email).await?;
    let known = record.is_some();
    let Some(user) = authenticate(record, password).await? else {
        if known {
            warning!("Login attempt with a wrong password for {}", email);
        } else {
            warning!("Login attempt for unknown email");
        }
        return Err(ApiError::Unauthorized(INVALID_CREDENTIALS.into()));
    };

    let token = state.codec.issue(&SessionPayload {
        user_id: user.id.clone(),
        email: user.email.clone(),
        name: user.name.clone(),
    })?;
    info!("User {} logged in", user.email);

    Ok((
        jar.add(session_cookie(token, state.secure_cookies)),
        Json(UserResponse {
            message: "Login successful".into(),
            user: PublicUser::from(&user),
        }),
    ))
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let user = state
        .users
        .create(NewUser {
            name: request.name.unwrap_or_default(),
            email: request.email.unwrap_or_default(),
            password: request.password.unwrap_or_default(),
        })
        .await?;
    info!("Registered user {}", user.email);

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            message: "User created successfully".into(),
            user: PublicUser::from(&user),
        }),
    ))
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (
        jar.remove(removal_cookie()),
        Json(serde_json::json!({ "message": "Logged out" })),
    )
}

pub async fn me(session: Option<Extension<SessionPayload>>) -> Json<Option<SessionPayload>> {
    Json(session.map(|Extension(payload)| payload))
}

pub async fn root(session: Option<Extension<SessionPayload>>) -> Redirect {
    match session {
        Some(_) => Redirect::temporary(DASHBOARD_PATH),
        None => Redirect::temporary(LOGIN_PATH),
    }
}

const LOGIN_PAGE: &str = r#"<!doctype html>
<html><head><title>Sign in</title></head>
<body>
<h1>Sign in</h1>
<form id="login">
<input name="email" type="email" placeholder="Email" required>
<input name="password" type="password" placeholder="Password" required>
<button type="submit">Sign in</button>
</form>
<p><a href="/auth/register">Create an account</a></p>
<script>
document.getElementById('login').onsubmit = async (e) => {
  e.preventDefault();
  const form = new FormData(e.target);
  const res = await fetch('/api/auth/login', {
    method: 'POST',
    headers: {'Content-Type': 'application/json'},
    body: JSON.stringify(Object.fromEntries(form)),
  });
  if (res.ok) { location.href = '/dashboard'; } else { alert((await res.json()).error); }
};
</script>
</body></html>"#;

const REGISTER_PAGE: &str = r#"<!doctype html>
<html><head><title>Register</title></head>
<body>
<h1>Register</h1>
<form id="register">
<input name="name" placeholder="Name" required>
<input name="email" type="email" placeholder="Email" required>
<input name="password" type="password" placeholder="Password" minlength="6" required>
<button type="submit">Register</button>
</form>
<script>
document.getElementById('register').onsubmit = async (e) => {
  e.preventDefault();
  const form = new FormData(e.target);
  const res = await fetch('/api/auth/register', {
    method: 'POST',
    headers: {'Content-Type': 'application/json'},
    body: JSON.stringify(Object.fromEntries(form)),
  });
  if (res.ok) { location.href = '/auth/login'; } else { alert((await res.json()).error); }
};
</script>
</body></html>"#;

pub async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}

pub async fn register_page() -> Html<&'static str> {
    Html(REGISTER_PAGE)
}
