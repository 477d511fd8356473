pub mod frame_metrics;
pub mod overlay;
pub mod replay;

#[cfg(feature = "opencv")]
pub mod capture;
#[cfg(feature = "opencv")]
pub mod net;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Classes the bundled detectors can report (COCO-SSD label set).
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Selection used when nothing else is configured.
pub const DEFAULT_CLASSES: [&str; 3] = ["person", "car", "bicycle"];

static SUPPORTED: Lazy<HashSet<&'static str>> = Lazy::new(|| COCO_CLASSES.into_iter().collect());

pub fn is_supported_class(name: &str) -> bool {
    SUPPORTED.contains(name)
}

/// Case-insensitive substring search over the supported classes, in label order.
pub fn search_classes(query: &str) -> Vec<&'static str> {
    let query = query.trim().to_lowercase();
    COCO_CLASSES
        .iter()
        .copied()
        .filter(|c| query.is_empty() || c.contains(query.as_str()))
        .collect()
}

/// One detected object. `bbox` is `[x, y, width, height]` in frame pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class: String,
    pub score: f32,
    pub bbox: [f32; 4],
}

impl Prediction {
    pub fn new(class: impl Into<String>, score: f32, bbox: [f32; 4]) -> Self {
        Self {
            class: class.into(),
            score,
            bbox,
        }
    }

    /// Overlay label, e.g. `car 87%`.
    pub fn label(&self) -> String {
        format!("{} {}%", self.class, (self.score * 100.0).round() as i32)
    }
}

/// A captured frame. `pixels` holds packed BGR bytes, row-major.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    pub fn blank(seq: u64, width: u32, height: u32) -> Self {
        Self {
            seq,
            width,
            height,
            pixels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Camera,
    Video,
    Image,
}

/// Opaque object detector. No latency bound is assumed.
#[async_trait]
pub trait Detector: Send {
    async fn detect(&mut self, frame: &Frame) -> Result<Vec<Prediction>>;
}

/// A live stream of frames. `Ok(None)` means the source stopped, paused or ended.
#[async_trait]
pub trait FrameSource: Send {
    fn kind(&self) -> SourceKind;

    async fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Releases the underlying device or file handle.
    fn stop(&mut self) {}
}

/// Opens capture sources for the pipeline.
pub trait SourceFactory: Send + Sync {
    fn open_camera(&self) -> Result<Box<dyn FrameSource>>;

    fn open_video(&self, path: &Path) -> Result<Box<dyn FrameSource>>;

    fn load_image(&self, path: &Path) -> Result<Frame>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_supported() {
        assert!(DEFAULT_CLASSES.iter().all(|c| is_supported_class(c)));
        assert!(!is_supported_class("unicorn"));
    }

    #[test]
    fn search_is_case_insensitive() {
        assert_eq!(search_classes("GLOVE"), vec!["baseball glove"]);
        assert_eq!(
            search_classes("ball"),
            vec!["sports ball", "baseball bat", "baseball glove"]
        );
        assert_eq!(search_classes("  ").len(), COCO_CLASSES.len());
        assert!(search_classes("zzz").is_empty());
    }

    #[test]
    fn label_rounds_score() {
        let p = Prediction::new("car", 0.876, [0., 0., 10., 10.]);
        assert_eq!(p.label(), "car 88%");
    }
}
