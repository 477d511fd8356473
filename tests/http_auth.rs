// Session and route-guard behaviour over the full router.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use lookout::api::{AppState, router};
use lookout::auth::{SessionPayload, TokenCodec, Verification};
use lookout::cv::overlay::LogOverlay;
use lookout::cv::replay::SyntheticFactory;
use lookout::pipeline::Pipeline;
use lookout::stats::{SharedDetections, StateConfig};
use lookout::store::{MemoryUserStore, NewUser, StoreError, User, UserStore};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "test_secret_key_for_testing_only";

async fn test_app() -> (Router, Arc<MemoryUserStore>) {
    let users = Arc::new(MemoryUserStore::new());
    users
        .create(NewUser {
            name: "Ana".into(),
            email: "ana@example.com".into(),
            password: "correct horse".into(),
        })
        .await
        .unwrap();

    (app_with(users.clone()), users)
}

fn app_with(users: Arc<dyn UserStore>) -> Router {
    let pipeline = Pipeline::new(
        SharedDetections::new(&StateConfig::default()),
        Arc::new(SyntheticFactory::default()),
        Box::new(LogOverlay),
    );
    router(AppState {
        codec: Arc::new(TokenCodec::new(SECRET)),
        users,
        pipeline: Arc::new(pipeline),
        secure_cookies: true,
    })
}

/// Holds a single user whose stored hash is not a PHC string.
struct CorruptStore;

#[async_trait::async_trait]
impl UserStore for CorruptStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(Some(User {
            id: "1".into(),
            name: "Old".into(),
            email: email.to_lowercase(),
            password_hash: "not-a-phc-string".into(),
        }))
    }

    async fn create(&self, _user: NewUser) -> Result<User, StoreError> {
        Err(StoreError::Duplicate)
    }
}

fn session_cookie() -> String {
    let token = TokenCodec::new(SECRET)
        .issue(&SessionPayload {
            user_id: "u".into(),
            email: "u@example.com".into(),
            name: "U".into(),
        })
        .unwrap();
    format!("token={token}")
}

fn login_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Extracts the `token` value from a `Set-Cookie` header.
fn cookie_token(set_cookie: &str) -> &str {
    set_cookie
        .split(';')
        .next()
        .and_then(|pair| pair.strip_prefix("token="))
        .unwrap()
}

#[tokio::test]
async fn login_sets_session_cookie() {
    let (app, users) = test_app().await;
    let record = users.find_by_email("ana@example.com").await.unwrap().unwrap();

    let response = app
        .oneshot(login_request(
            json!({"email": "ANA@example.com", "password": "correct horse"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Secure"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Path=/"));
    assert!(set_cookie.contains("Max-Age=604800"));

    let codec = TokenCodec::new(SECRET);
    assert_eq!(
        codec.verify(cookie_token(&set_cookie)),
        Verification::Valid(SessionPayload {
            user_id: record.id.clone(),
            email: "ana@example.com".into(),
            name: "Ana".into(),
        })
    );

    let body = json_body(response).await;
    assert_eq!(body["message"], "Login successful");
    assert_eq!(body["user"]["id"], record.id);
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(login_request(
            json!({"email": "ana@example.com", "password": "wrong"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(json_body(response).await, json!({"error": "Invalid credentials"}));
}

#[tokio::test]
async fn unknown_email_is_rejected() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(login_request(
            json!({"email": "bob@example.com", "password": "whatever"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, json!({"error": "Invalid credentials"}));
}

#[tokio::test]
async fn blank_password_is_checked_not_rejected_as_missing() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(login_request(
            json!({"email": "ana@example.com", "password": "   "}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await, json!({"error": "Invalid credentials"}));
}

#[tokio::test]
async fn store_failure_is_an_internal_error() {
    let app = app_with(Arc::new(CorruptStore));
    let response = app
        .oneshot(login_request(
            json!({"email": "old@example.com", "password": "whatever"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(json_body(response).await, json!({"error": "Internal server error"}));
}

#[tokio::test]
async fn logout_clears_session_cookie() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(
            Request::post("/api/auth/logout")
                .header(header::COOKIE, session_cookie())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.starts_with("token=;"));
    assert!(set_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn webcam_without_detector_is_unavailable() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(
            Request::post("/dashboard/webcam")
                .header(header::COOKIE, session_cookie())
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"active": true}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn missing_fields_are_a_bad_request() {
    let (app, _) = test_app().await;
    for body in [json!({"email": "ana@example.com"}), json!({"password": "x"}), json!({})] {
        let response = app.clone().oneshot(login_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({"error": "Email and password are required"})
        );
    }
}

#[tokio::test]
async fn dashboard_without_cookie_redirects_to_login() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(Request::get("/dashboard").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/auth/login");
}

#[tokio::test]
async fn dashboard_with_session_returns_snapshot() {
    let (app, users) = test_app().await;
    let record = users.find_by_email("ana@example.com").await.unwrap().unwrap();
    let token = TokenCodec::new(SECRET)
        .issue(&SessionPayload {
            user_id: record.id,
            email: record.email,
            name: record.name,
        })
        .unwrap();

    let response = app
        .oneshot(
            Request::get("/dashboard")
                .header(header::COOKIE, format!("token={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["counts"], json!({}));
    assert_eq!(body["model"]["loading"], true);
    assert_eq!(body["selected_classes"], json!(["bicycle", "car", "person"]));
}

#[tokio::test]
async fn login_page_with_bad_cookie_is_cleared() {
    let (app, _) = test_app().await;
    let response = app
        .oneshot(
            Request::get("/auth/login")
                .header(header::COOKIE, "token=forged")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/auth/login");
    let set_cookie = response.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.starts_with("token="));
    assert!(set_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn login_page_with_session_goes_to_dashboard() {
    let (app, _) = test_app().await;
    let token = TokenCodec::new(SECRET)
        .issue(&SessionPayload {
            user_id: "u".into(),
            email: "u@example.com".into(),
            name: "U".into(),
        })
        .unwrap();

    let response = app
        .oneshot(
            Request::get("/auth/register")
                .header(header::COOKIE, format!("token={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/dashboard");
}

#[tokio::test]
async fn register_then_duplicate() {
    let (app, _) = test_app().await;
    let request = || {
        Request::builder()
            .method("POST")
            .uri("/api/auth/register")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"name": "Bo", "email": "bo@example.com", "password": "secret1"}).to_string(),
            ))
            .unwrap()
    };

    let created = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    assert!(created.headers().get(header::SET_COOKIE).is_none());

    let duplicate = app.oneshot(request()).await.unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(duplicate).await, json!({"error": "User already exists"}));
}

#[tokio::test]
async fn class_selection_round_trip() {
    let (app, _) = test_app().await;
    let cookie = session_cookie();

    let response = app
        .clone()
        .oneshot(
            Request::put("/dashboard/classes")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"classes": ["dog", "cat"]}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!(["cat", "dog"]));

    let response = app
        .oneshot(
            Request::get("/dashboard/classes?search=Ca")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["selected"], json!(["cat", "dog"]));
    assert!(body["supported"].as_array().unwrap().contains(&json!("car")));
}
