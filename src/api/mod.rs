//! HTTP surface: login/registration API, auth pages and the guarded dashboard.
mod auth;
mod dashboard;
mod error;

pub use auth::{LoginRequest, PublicUser, RegisterRequest, UserResponse};
pub use dashboard::{ClassList, ImageResult};
pub use error::{ApiError, ErrorBody};

use crate::auth::{TokenCodec, session_guard};
use crate::pipeline::Pipeline;
use crate::store::UserStore;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub codec: Arc<TokenCodec>,
    pub users: Arc<dyn UserStore>,
    pub pipeline: Arc<Pipeline>,
    pub secure_cookies: bool,
}

pub fn router(state: AppState) -> Router {
    let auth_api = Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me));

    let pages = Router::new()
        .route("/", get(auth::root))
        .route("/auth/login", get(auth::login_page))
        .route("/auth/register", get(auth::register_page));

    let dashboard = Router::new()
        .route("/dashboard", get(dashboard::snapshot))
        .route("/dashboard/history", get(dashboard::history))
        .route("/dashboard/recent", get(dashboard::recent))
        .route(
            "/dashboard/classes",
            get(dashboard::classes)
                .put(dashboard::set_classes)
                .delete(dashboard::clear_classes),
        )
        .route("/dashboard/classes/toggle", post(dashboard::toggle_class))
        .route("/dashboard/classes/all", post(dashboard::select_all))
        .route("/dashboard/webcam", post(dashboard::webcam))
        .route("/dashboard/video", post(dashboard::play_video))
        .route("/dashboard/video/pause", post(dashboard::pause_video))
        .route("/dashboard/image", post(dashboard::detect_image))
        .route("/dashboard/view", post(dashboard::switch_view))
        .route("/dashboard/reset", post(dashboard::reset));

    let codec = Arc::clone(&state.codec);
    auth_api
        .merge(pages)
        .merge(dashboard)
        .layer(middleware::from_fn_with_state(codec, session_guard))
        .with_state(state)
}
