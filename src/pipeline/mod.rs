//! Detection controller.
//!
//! A [`Pipeline`] owns at most one capture run at a time. Starting a camera,
//! playing a video, detecting a still image, switching views and resetting all
//! go through the same run slot, so two runs never write the shared state
//! concurrently.
mod detect_loop;
pub mod media;

pub use detect_loop::StopReason;

use crate::cv::overlay::Overlay;
use crate::cv::{Detector, SourceFactory, SourceKind, is_supported_class, COCO_CLASSES};
use crate::stats::{CaptureStatus, CountMap, ModelStatus, SharedDetections, View};
use detect_loop::{frame_rate_timer, run_detection};
use log::{debug, error, info, warning};
use media::ObjectUrls;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub(crate) type SharedDetector = Arc<tokio::sync::Mutex<Option<Box<dyn Detector>>>>;
pub(crate) type SharedOverlay = Arc<Mutex<Box<dyn Overlay>>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("detector is not loaded")]
    DetectorUnavailable,
    #[error("unknown class '{0}'")]
    UnknownClass(String),
    #[error("could not load media: {0}")]
    Media(String),
    #[error("detection failed: {0}")]
    Detection(String),
}

/// Clock label used for history and recent-log entries, e.g. `3:04:05 PM`.
pub(crate) fn time_label() -> String {
    chrono::Local::now().format("%-I:%M:%S %p").to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoSession {
    pub url: String,
    pub capture: CaptureStatus,
}

struct ActiveRun {
    kind: SourceKind,
    stop: watch::Sender<bool>,
    task: JoinHandle<StopReason>,
}

#[derive(Default)]
struct Media {
    urls: ObjectUrls,
    video_url: Option<String>,
}

pub struct Pipeline {
    state: SharedDetections,
    detector: SharedDetector,
    overlay: SharedOverlay,
    sources: Arc<dyn SourceFactory>,
    run: tokio::sync::Mutex<Option<ActiveRun>>,
    media: Mutex<Media>,
    resets: watch::Sender<u64>,
    shutdown: watch::Sender<bool>,
}

impl Pipeline {
    pub fn new(state: SharedDetections, sources: Arc<dyn SourceFactory>, overlay: Box<dyn Overlay>) -> Self {
        let (resets, _) = watch::channel(0);
        let (shutdown, _) = watch::channel(false);

        Self {
            state,
            detector: Arc::new(tokio::sync::Mutex::new(None)),
            overlay: Arc::new(Mutex::new(overlay)),
            sources,
            run: tokio::sync::Mutex::new(None),
            media: Mutex::new(Media::default()),
            resets,
            shutdown,
        }
    }

    pub fn state(&self) -> &SharedDetections {
        &self.state
    }

    pub async fn install_detector(&self, detector: Box<dyn Detector>) {
        *self.detector.lock().await = Some(detector);
        self.state.write(|s| {
            s.set_model(ModelStatus {
                loading: false,
                ready: true,
            })
        });
        info!("Detector ready");
    }

    /// Records a failed detector load. The model stays in the loading state.
    pub fn detector_failed(&self, err: &anyhow::Error) {
        error!("Failed to load detector: {:#}", err);
    }

    /// Loads the detector on the blocking pool and installs it when done.
    pub fn load_detector<F>(self: &Arc<Self>, load: F) -> JoinHandle<()>
    where
        F: FnOnce() -> anyhow::Result<Box<dyn Detector>> + Send + 'static,
    {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            match tokio::task::spawn_blocking(load).await {
                Ok(Ok(detector)) => pipeline.install_detector(detector).await,
                Ok(Err(e)) => pipeline.detector_failed(&e),
                Err(e) => pipeline.detector_failed(&anyhow::Error::new(e)),
            }
        })
    }

    fn ensure_model(&self) -> Result<(), PipelineError> {
        if self.state.model().ready {
            Ok(())
        } else {
            Err(PipelineError::DetectorUnavailable)
        }
    }

    async fn stop_run(run: &mut Option<ActiveRun>) -> Option<StopReason> {
        let active = run.take()?;
        let _ = active.stop.send(true);
        match active.task.await {
            Ok(reason) => Some(reason),
            Err(e) => {
                error!("Detection task for {:?} failed: {}", active.kind, e);
                None
            }
        }
    }

    fn spawn_run(&self, source: Box<dyn crate::cv::FrameSource>) -> ActiveRun {
        let kind = source.kind();
        let (stop, stop_rx) = watch::channel(false);
        self.state.write(|s| s.set_capture(true, Some(kind)));

        let task = tokio::spawn(run_detection(
            self.state.clone(),
            Arc::clone(&self.detector),
            Arc::clone(&self.overlay),
            source,
            stop_rx,
        ));
        ActiveRun { kind, stop, task }
    }

    /// Kind of the run currently producing frames, if any.
    pub async fn active_source(&self) -> Option<SourceKind> {
        self.run
            .lock()
            .await
            .as_ref()
            .filter(|r| !r.task.is_finished())
            .map(|r| r.kind)
    }

    pub async fn start_webcam(&self) -> Result<CaptureStatus, PipelineError> {
        self.ensure_model()?;
        let mut run = self.run.lock().await;
        Self::stop_run(&mut run).await;
        self.state.write(|s| s.set_view(View::Webcam));

        match self.sources.open_camera() {
            Ok(source) => *run = Some(self.spawn_run(source)),
            Err(e) => {
                error!("Error accessing webcam: {:#}", e);
                self.state.write(|s| s.set_capture(false, None));
            }
        }
        Ok(self.state.capture())
    }

    /// Stops the camera and clears the cache. A no-op when the camera is not running.
    pub async fn stop_webcam(&self) -> CaptureStatus {
        let mut run = self.run.lock().await;
        if run.as_ref().is_some_and(|r| r.kind == SourceKind::Camera) {
            self.reset_locked(&mut run).await;
        }
        self.state.capture()
    }

    pub async fn play_video(&self, path: &Path) -> Result<VideoSession, PipelineError> {
        self.ensure_model()?;
        let mut run = self.run.lock().await;
        Self::stop_run(&mut run).await;
        self.state.write(|s| s.set_view(View::Video));

        let url = {
            let mut media = self.media.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = media.video_url.take() {
                media.urls.revoke(&previous);
            }
            let url = media.urls.create(path);
            media.video_url = Some(url.clone());
            let live = media.urls.len();
            self.state.write(|s| s.set_object_urls(live));
            url
        };

        match self.sources.open_video(path) {
            Ok(source) => *run = Some(self.spawn_run(source)),
            Err(e) => {
                error!("Error loading video {}: {:#}", path.display(), e);
                self.state.write(|s| s.set_capture(false, None));
            }
        }

        Ok(VideoSession {
            url,
            capture: self.state.capture(),
        })
    }

    pub async fn pause_video(&self) -> CaptureStatus {
        let mut run = self.run.lock().await;
        if run.as_ref().is_some_and(|r| r.kind == SourceKind::Video) {
            let reason = Self::stop_run(&mut run).await;
            debug!("Video paused ({:?})", reason);
        }
        self.state.capture()
    }

    /// Runs the detector once on a still image. History is left untouched.
    pub async fn detect_image(&self, path: &Path) -> Result<CountMap, PipelineError> {
        self.ensure_model()?;
        let mut run = self.run.lock().await;
        Self::stop_run(&mut run).await;
        self.state.write(|s| {
            s.set_view(View::Upload);
            s.clear_frame_rate();
        });

        let frame = self
            .sources
            .load_image(path)
            .map_err(|e| PipelineError::Media(format!("{e:#}")))?;

        let predictions = {
            let mut slot = self.detector.lock().await;
            let detector = slot.as_mut().ok_or(PipelineError::DetectorUnavailable)?;
            detector.detect(&frame).await.map_err(|e| {
                error!("Error during image detection: {:#}", e);
                PipelineError::Detection(format!("{e:#}"))
            })?
        };

        let filtered = self.state.filter(&predictions);
        self.overlay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .render(&frame, &filtered);
        let label = time_label();
        self.state
            .write(|s| s.publish(&filtered, Instant::now(), &label, false));

        let counts = self.state.counts();
        info!("Image {} yielded {} classes", path.display(), counts.len());
        Ok(counts)
    }

    /// Leaving the webcam view stops the camera (and clears the cache); any
    /// other running source is paused.
    pub async fn switch_view(&self, view: View) -> CaptureStatus {
        let mut run = self.run.lock().await;
        let current = run.as_ref().map(|r| r.kind);

        if view != View::Webcam && current == Some(SourceKind::Camera) {
            self.reset_locked(&mut run).await;
        } else if current.is_some() {
            Self::stop_run(&mut run).await;
        }

        self.state.write(|s| {
            s.set_view(view);
            if view == View::Upload {
                s.clear_frame_rate();
            } else {
                s.clear_frame_times();
            }
        });
        debug!("Switched to {:?} view", view);
        self.state.capture()
    }

    /// Clears the cache: stops capture, revokes object URLs and empties every
    /// published collection.
    pub async fn reset(&self) {
        let mut run = self.run.lock().await;
        self.reset_locked(&mut run).await;
    }

    async fn reset_locked(&self, run: &mut Option<ActiveRun>) {
        Self::stop_run(run).await;

        let revoked = {
            let mut media = self.media.lock().unwrap_or_else(PoisonError::into_inner);
            media.video_url = None;
            media.urls.revoke_all().len()
        };
        self.overlay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.state.write(|s| {
            s.clear(Instant::now());
            s.set_object_urls(0);
        });
        self.resets.send_modify(|generation| *generation += 1);
        info!("Cache cleared ({} object URLs revoked)", revoked);
    }

    pub fn subscribe_resets(&self) -> watch::Receiver<u64> {
        self.resets.subscribe()
    }

    pub fn resolve_url(&self, url: &str) -> Option<std::path::PathBuf> {
        let media = self.media.lock().unwrap_or_else(PoisonError::into_inner);
        media.urls.resolve(url).map(Path::to_path_buf)
    }

    pub fn set_classes<I, S>(&self, classes: I) -> Result<Vec<String>, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selection = BTreeSet::new();
        for class in classes {
            let class = class.into();
            if !is_supported_class(&class) {
                return Err(PipelineError::UnknownClass(class));
            }
            selection.insert(class);
        }
        self.state.write(|s| s.set_selected(selection));
        Ok(self.state.selected_classes())
    }

    pub fn toggle_class(&self, class: &str) -> Result<Vec<String>, PipelineError> {
        if !is_supported_class(class) {
            return Err(PipelineError::UnknownClass(class.to_owned()));
        }
        self.state.write(|s| {
            let mut selection = s.selected().clone();
            if !selection.remove(class) {
                selection.insert(class.to_owned());
            }
            s.set_selected(selection);
        });
        Ok(self.state.selected_classes())
    }

    pub fn select_all(&self) -> Vec<String> {
        let all = COCO_CLASSES.iter().map(|c| c.to_string()).collect();
        self.state.write(|s| s.set_selected(all));
        self.state.selected_classes()
    }

    pub fn clear_classes(&self) -> Vec<String> {
        self.state.write(|s| s.set_selected(BTreeSet::new()));
        Vec::new()
    }

    /// Starts the once-per-second frame-rate publisher.
    pub fn spawn_frame_rate_timer(&self) -> JoinHandle<()> {
        tokio::spawn(frame_rate_timer(
            self.state.clone(),
            self.shutdown.subscribe(),
        ))
    }

    /// Stops any run and the frame-rate timer.
    pub async fn shutdown(&self) {
        let mut run = self.run.lock().await;
        if let Some(reason) = Self::stop_run(&mut run).await {
            debug!("Capture stopped for shutdown ({:?})", reason);
        }
        if self.shutdown.send(true).is_err() {
            warning!("Frame rate timer was not running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::overlay::LogOverlay;
    use crate::cv::replay::{ReplayDetector, SyntheticFactory};
    use crate::cv::Prediction;
    use crate::stats::StateConfig;
    use std::time::Duration;
    use tokio::time::sleep;

    fn prediction(class: &str) -> Prediction {
        Prediction::new(class, 0.9, [0., 0., 10., 10.])
    }

    fn pipeline_with(factory: SyntheticFactory, classes: &[&str]) -> Pipeline {
        let config = StateConfig {
            default_classes: classes.iter().map(|c| c.to_string()).collect(),
            ..StateConfig::default()
        };
        Pipeline::new(
            SharedDetections::new(&config),
            Arc::new(factory),
            Box::new(LogOverlay),
        )
    }

    async fn ready_pipeline(classes: &[&str]) -> Pipeline {
        let pipeline = pipeline_with(SyntheticFactory::default(), classes);
        pipeline
            .install_detector(Box::new(ReplayDetector::new(vec![vec![
                prediction("car"),
                prediction("dog"),
                prediction("car"),
            ]])))
            .await;
        pipeline
    }

    #[tokio::test(start_paused = true)]
    async fn webcam_publishes_filtered_counts() {
        let pipeline = ready_pipeline(&["car"]).await;

        let status = pipeline.start_webcam().await.unwrap();
        assert!(status.active);
        assert_eq!(status.source, Some(SourceKind::Camera));

        sleep(Duration::from_millis(500)).await;

        let expected: CountMap = [("car".to_string(), 2)].into_iter().collect();
        assert_eq!(pipeline.state().counts(), expected);
        assert!(pipeline.state().recent().len() <= crate::stats::RECENT_LOG_CAP);
    }

    #[tokio::test(start_paused = true)]
    async fn webcam_requires_detector() {
        let pipeline = pipeline_with(SyntheticFactory::default(), &["car"]);
        assert_eq!(
            pipeline.start_webcam().await,
            Err(PipelineError::DetectorUnavailable)
        );
        assert!(pipeline.state().model().loading);
    }

    #[tokio::test]
    async fn failed_detector_load_keeps_model_loading() {
        let pipeline = Arc::new(pipeline_with(SyntheticFactory::default(), &["car"]));
        pipeline
            .load_detector(|| Err(anyhow::anyhow!("model file missing")))
            .await
            .unwrap();

        let model = pipeline.state().model();
        assert!(model.loading);
        assert!(!model.ready);
        assert_eq!(
            pipeline.start_webcam().await,
            Err(PipelineError::DetectorUnavailable)
        );
        assert_eq!(pipeline.active_source().await, None);
    }

    #[tokio::test]
    async fn loaded_detector_is_installed() {
        let pipeline = Arc::new(pipeline_with(SyntheticFactory::default(), &["car"]));
        pipeline
            .load_detector(|| Ok(Box::new(ReplayDetector::new(vec![vec![]])) as Box<dyn Detector>))
            .await
            .unwrap();

        let model = pipeline.state().model();
        assert!(!model.loading);
        assert!(model.ready);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_camera_leaves_capture_inactive() {
        let pipeline = pipeline_with(
            SyntheticFactory {
                camera_available: false,
                ..SyntheticFactory::default()
            },
            &["car"],
        );
        pipeline
            .install_detector(Box::new(ReplayDetector::new(vec![vec![]])))
            .await;

        let status = pipeline.start_webcam().await.unwrap();
        assert!(!status.active);
        assert_eq!(pipeline.active_source().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_webcam_clears_everything() {
        let pipeline = ready_pipeline(&["car"]).await;
        let mut resets = pipeline.subscribe_resets();
        pipeline.start_webcam().await.unwrap();

        sleep(Duration::from_millis(4500)).await;
        assert!(pipeline.state().snapshot().history_len >= 2);

        let status = pipeline.stop_webcam().await;
        assert!(!status.active);
        assert!(resets.has_changed().unwrap());
        assert_eq!(*resets.borrow_and_update(), 1);

        let snapshot = pipeline.state().snapshot();
        assert!(snapshot.counts.is_empty());
        assert_eq!(snapshot.history_len, 0);
        assert!(snapshot.recent.is_empty());
        assert_eq!(snapshot.frame_rate, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn history_snapshots_are_spaced() {
        let pipeline = ready_pipeline(&["car"]).await;
        pipeline.start_webcam().await.unwrap();

        sleep(Duration::from_millis(7100)).await;
        // Samples at 2 s, 4 s and 6 s after the state was created.
        assert_eq!(pipeline.state().history().len(), 3);
        pipeline.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn frame_rate_follows_source() {
        let pipeline = ready_pipeline(&["car"]).await;
        let timer = pipeline.spawn_frame_rate_timer();
        pipeline.start_webcam().await.unwrap();

        sleep(Duration::from_millis(3050)).await;
        let fps = pipeline.state().frame_rate();
        assert!((25..=31).contains(&fps), "fps was {fps}");

        pipeline.shutdown().await;
        timer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_video_revokes_previous_url() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.mp4");
        let second = dir.path().join("second.mp4");
        std::fs::write(&first, b"").unwrap();
        std::fs::write(&second, b"").unwrap();

        let pipeline = ready_pipeline(&["car"]).await;
        let a = pipeline.play_video(&first).await.unwrap();
        assert!(a.capture.active);
        let b = pipeline.play_video(&second).await.unwrap();

        assert!(pipeline.resolve_url(&a.url).is_none());
        assert_eq!(pipeline.resolve_url(&b.url), Some(second.clone()));
        assert_eq!(pipeline.state().snapshot().object_urls, 1);

        pipeline.reset().await;
        assert!(pipeline.resolve_url(&b.url).is_none());
        assert_eq!(pipeline.state().snapshot().object_urls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn finite_video_ends_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"").unwrap();

        let pipeline = pipeline_with(
            SyntheticFactory {
                video_frames: Some(5),
                ..SyntheticFactory::default()
            },
            &["car"],
        );
        pipeline
            .install_detector(Box::new(ReplayDetector::new(vec![vec![prediction("car")]])))
            .await;

        pipeline.play_video(&clip).await.unwrap();
        sleep(Duration::from_secs(1)).await;

        assert!(!pipeline.state().capture().active);
        assert_eq!(pipeline.active_source().await, None);
        assert_eq!(pipeline.state().counts().get("car"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn still_image_skips_history() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("street.jpg");
        std::fs::write(&image, b"").unwrap();

        let pipeline = ready_pipeline(&["car", "dog"]).await;
        sleep(Duration::from_secs(5)).await;
        let counts = pipeline.detect_image(&image).await.unwrap();

        assert_eq!(counts.get("car"), Some(&2));
        assert_eq!(counts.get("dog"), Some(&1));
        let snapshot = pipeline.state().snapshot();
        assert_eq!(snapshot.history_len, 0);
        assert_eq!(snapshot.capture.view, View::Upload);

        let missing = pipeline.detect_image(Path::new("/missing.jpg")).await;
        assert!(matches!(missing, Err(PipelineError::Media(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_webcam_view_resets() {
        let pipeline = ready_pipeline(&["car"]).await;
        pipeline.start_webcam().await.unwrap();
        sleep(Duration::from_millis(300)).await;
        assert!(!pipeline.state().counts().is_empty());

        let status = pipeline.switch_view(View::Upload).await;
        assert!(!status.active);
        assert_eq!(status.view, View::Upload);
        assert!(pipeline.state().counts().is_empty());
    }

    #[tokio::test]
    async fn class_selection_is_validated() {
        let pipeline = pipeline_with(SyntheticFactory::default(), &["car"]);

        assert_eq!(
            pipeline.toggle_class("unicorn"),
            Err(PipelineError::UnknownClass("unicorn".into()))
        );
        assert_eq!(pipeline.toggle_class("dog").unwrap(), vec!["car", "dog"]);
        assert_eq!(pipeline.toggle_class("car").unwrap(), vec!["dog"]);
        assert_eq!(pipeline.select_all().len(), COCO_CLASSES.len());
        assert!(pipeline.clear_classes().is_empty());
        assert!(pipeline.set_classes(["person", "nope"]).is_err());
        assert_eq!(pipeline.set_classes(["person"]).unwrap(), vec!["person"]);
    }
}
