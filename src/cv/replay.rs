//! Capture and detection stand-ins that need no native libraries.
//!
//! [`SyntheticFactory`] produces blank frames at a fixed rate and
//! [`ReplayDetector`] answers each frame with the next prediction list from a
//! recorded JSON file. Together they drive the full pipeline on machines
//! without a camera or OpenCV.
use super::{Detector, Frame, FrameSource, Prediction, SourceFactory, SourceKind};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

pub struct SyntheticSource {
    kind: SourceKind,
    ticker: Interval,
    seq: u64,
    limit: Option<u64>,
    stopped: bool,
}

impl SyntheticSource {
    pub fn new(kind: SourceKind, fps: u32, limit: Option<u64>) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            kind,
            ticker,
            seq: 0,
            limit,
            stopped: false,
        }
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.stopped || self.limit.is_some_and(|limit| self.seq >= limit) {
            return Ok(None);
        }

        self.ticker.tick().await;
        let frame = Frame::blank(self.seq, FRAME_WIDTH, FRAME_HEIGHT);
        self.seq += 1;
        Ok(Some(frame))
    }

    fn stop(&mut self) {
        debug!("Stopping synthetic {:?} source after {} frames", self.kind, self.seq);
        self.stopped = true;
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticFactory {
    pub fps: u32,
    pub camera_available: bool,
    /// Frames a "video" yields before it ends. `None` plays forever.
    pub video_frames: Option<u64>,
}

impl Default for SyntheticFactory {
    fn default() -> Self {
        Self {
            fps: 30,
            camera_available: true,
            video_frames: None,
        }
    }
}

impl SourceFactory for SyntheticFactory {
    fn open_camera(&self) -> Result<Box<dyn FrameSource>> {
        if !self.camera_available {
            return Err(anyhow!("camera permission denied"));
        }
        info!("Opening synthetic camera stream at {} fps", self.fps);
        Ok(Box::new(SyntheticSource::new(
            SourceKind::Camera,
            self.fps,
            None,
        )))
    }

    fn open_video(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        if !path.is_file() {
            return Err(anyhow!("video file not found: {}", path.display()));
        }
        info!("Opening synthetic video stream for {}", path.display());
        Ok(Box::new(SyntheticSource::new(
            SourceKind::Video,
            self.fps,
            self.video_frames,
        )))
    }

    fn load_image(&self, path: &Path) -> Result<Frame> {
        if !path.is_file() {
            return Err(anyhow!("image file not found: {}", path.display()));
        }
        Ok(Frame::blank(0, FRAME_WIDTH, FRAME_HEIGHT))
    }
}

/// Replays recorded prediction lists, one per frame, wrapping at the end.
#[derive(Debug, Clone)]
pub struct ReplayDetector {
    frames: Vec<Vec<Prediction>>,
    cursor: usize,
}

impl ReplayDetector {
    pub fn new(frames: Vec<Vec<Prediction>>) -> Self {
        Self { frames, cursor: 0 }
    }

    /// Reads a JSON array of per-frame prediction arrays.
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let frames: Vec<Vec<Prediction>> =
            serde_json::from_str(&raw).context("Replay file is not a list of prediction lists")?;
        if frames.is_empty() {
            return Err(anyhow!("Replay file {} has no frames", path.display()));
        }
        info!("Loaded {} recorded frames from {}", frames.len(), path.display());
        Ok(Self::new(frames))
    }
}

#[async_trait]
impl Detector for ReplayDetector {
    async fn detect(&mut self, _frame: &Frame) -> Result<Vec<Prediction>> {
        if self.frames.is_empty() {
            return Ok(Vec::new());
        }
        let predictions = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replay_wraps_around() {
        let mut detector = ReplayDetector::new(vec![
            vec![Prediction::new("car", 0.9, [0., 0., 1., 1.])],
            vec![],
        ]);
        let frame = Frame::default();

        assert_eq!(detector.detect(&frame).await.unwrap().len(), 1);
        assert!(detector.detect(&frame).await.unwrap().is_empty());
        assert_eq!(detector.detect(&frame).await.unwrap()[0].class, "car");
    }

    #[tokio::test]
    async fn replay_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replay.json");
        std::fs::write(
            &path,
            r#"[[{"class":"dog","score":0.7,"bbox":[1,2,3,4]}]]"#,
        )
        .unwrap();

        let mut detector = ReplayDetector::from_file(&path).unwrap();
        let predictions = detector.detect(&Frame::default()).await.unwrap();
        assert_eq!(predictions[0].bbox, [1., 2., 3., 4.]);
    }

    #[tokio::test(start_paused = true)]
    async fn limited_source_ends() {
        let mut source = SyntheticSource::new(SourceKind::Video, 60, Some(2));
        assert!(source.next_frame().await.unwrap().is_some());
        assert!(source.next_frame().await.unwrap().is_some());
        assert!(source.next_frame().await.unwrap().is_none());
    }

    #[test]
    fn denied_camera_is_an_error() {
        let factory = SyntheticFactory {
            camera_available: false,
            ..SyntheticFactory::default()
        };
        assert!(factory.open_camera().is_err());
        assert!(factory.open_video(Path::new("/definitely/missing.mp4")).is_err());
    }
}
