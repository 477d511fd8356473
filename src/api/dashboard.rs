//! Guarded dashboard endpoints. Reads return views of the shared detection
//! state; writes go through the pipeline controller.
use super::{ApiError, AppState};
use crate::cv::search_classes;
use crate::pipeline::VideoSession;
use crate::stats::history::HistoryEntry;
use crate::stats::{CaptureStatus, CountMap, DashboardSnapshot, RecentDetection, View};
use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub async fn snapshot(State(state): State<AppState>) -> Json<DashboardSnapshot> {
    Json(state.pipeline.state().snapshot())
}

pub async fn history(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(state.pipeline.state().history())
}

pub async fn recent(State(state): State<AppState>) -> Json<Vec<RecentDetection>> {
    Json(state.pipeline.state().recent())
}

#[derive(Debug, Default, Deserialize)]
pub struct ClassQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassList {
    pub selected: Vec<String>,
    pub supported: Vec<String>,
}

pub async fn classes(
    State(state): State<AppState>,
    Query(query): Query<ClassQuery>,
) -> Json<ClassList> {
    let search = query.search.unwrap_or_default();
    Json(ClassList {
        selected: state.pipeline.state().selected_classes(),
        supported: search_classes(&search)
            .into_iter()
            .map(str::to_owned)
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct SetClasses {
    pub classes: Vec<String>,
}

pub async fn set_classes(
    State(state): State<AppState>,
    Json(body): Json<SetClasses>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.pipeline.set_classes(body.classes)?))
}

#[derive(Debug, Deserialize)]
pub struct ToggleClass {
    pub class: String,
}

pub async fn toggle_class(
    State(state): State<AppState>,
    Json(body): Json<ToggleClass>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.pipeline.toggle_class(&body.class)?))
}

pub async fn select_all(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.pipeline.select_all())
}

pub async fn clear_classes(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.pipeline.clear_classes())
}

#[derive(Debug, Deserialize)]
pub struct WebcamToggle {
    pub active: bool,
}

pub async fn webcam(
    State(state): State<AppState>,
    Json(body): Json<WebcamToggle>,
) -> Result<Json<CaptureStatus>, ApiError> {
    let status = if body.active {
        state.pipeline.start_webcam().await?
    } else {
        state.pipeline.stop_webcam().await
    };
    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
pub struct MediaPath {
    pub path: PathBuf,
}

pub async fn play_video(
    State(state): State<AppState>,
    Json(body): Json<MediaPath>,
) -> Result<Json<VideoSession>, ApiError> {
    Ok(Json(state.pipeline.play_video(&body.path).await?))
}

pub async fn pause_video(State(state): State<AppState>) -> Json<CaptureStatus> {
    Json(state.pipeline.pause_video().await)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageResult {
    pub counts: CountMap,
}

pub async fn detect_image(
    State(state): State<AppState>,
    Json(body): Json<MediaPath>,
) -> Result<Json<ImageResult>, ApiError> {
    let counts = state.pipeline.detect_image(&body.path).await?;
    Ok(Json(ImageResult { counts }))
}

#[derive(Debug, Deserialize)]
pub struct ViewSwitch {
    pub view: View,
}

pub async fn switch_view(
    State(state): State<AppState>,
    Json(body): Json<ViewSwitch>,
) -> Json<CaptureStatus> {
    Json(state.pipeline.switch_view(body.view).await)
}

pub async fn reset(State(state): State<AppState>) -> Json<DashboardSnapshot> {
    state.pipeline.reset().await;
    Json(state.pipeline.state().snapshot())
}
