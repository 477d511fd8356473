//! Shared detection state.
//!
//! [`SharedDetections`] owns the count map, history, recent-detection log and
//! frame rate. The detection loop is the only writer (through the crate-private
//! [`SharedDetections::write`]); HTTP handlers and other consumers only ever see
//! cloned [`DashboardSnapshot`] values or the read accessors.
pub mod history;
pub mod views;

use crate::cv::frame_metrics::FrameMetrics;
use crate::cv::{Prediction, SourceKind};
use history::{History, HistoryEntry};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use views::{DetectionStats, Distribution, HistoryChart, KpiCards, TableRow};

/// Class name -> number of objects of that class in the current frame.
pub type CountMap = BTreeMap<String, u32>;

/// Predictions of a single frame after class filtering.
pub type FramePredictions = SmallVec<[Prediction; 8]>;

pub const RECENT_LOG_CAP: usize = 10;
pub const DEFAULT_HISTORY_CAP: usize = 100;
pub const DEFAULT_SNAPSHOT_INTERVAL: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentDetection {
    pub class: String,
    pub count: u32,
    pub time: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Webcam,
    Video,
    Upload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStatus {
    pub active: bool,
    pub view: View,
    pub source: Option<SourceKind>,
}

/// Detector availability. A failed load stays `loading` forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStatus {
    pub loading: bool,
    pub ready: bool,
}

impl Default for ModelStatus {
    fn default() -> Self {
        Self {
            loading: true,
            ready: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateConfig {
    pub history_cap: usize,
    pub snapshot_interval: Duration,
    pub default_classes: Vec<String>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            history_cap: DEFAULT_HISTORY_CAP,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            default_classes: crate::cv::DEFAULT_CLASSES
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

/// Keeps only predictions whose class is selected.
pub fn filter_predictions(predictions: &[Prediction], selected: &BTreeSet<String>) -> FramePredictions {
    predictions
        .iter()
        .filter(|p| selected.contains(&p.class))
        .cloned()
        .collect()
}

/// Tallies predictions per class.
pub fn tally(predictions: &[Prediction]) -> CountMap {
    let mut counts = CountMap::new();
    for prediction in predictions {
        *counts.entry(prediction.class.clone()).or_default() += 1;
    }
    counts
}

#[derive(Debug)]
pub struct DetectionState {
    counts: CountMap,
    history: History,
    recent: VecDeque<RecentDetection>,
    frame_rate: u32,
    metrics: FrameMetrics,
    selected: BTreeSet<String>,
    processing: bool,
    capture: CaptureStatus,
    model: ModelStatus,
    object_urls: usize,
}

impl DetectionState {
    pub fn new(config: &StateConfig, now: Instant) -> Self {
        Self {
            counts: CountMap::new(),
            history: History::new(config.history_cap, config.snapshot_interval, now),
            recent: VecDeque::with_capacity(RECENT_LOG_CAP),
            frame_rate: 0,
            metrics: FrameMetrics::new(),
            selected: config.default_classes.iter().cloned().collect(),
            processing: false,
            capture: CaptureStatus::default(),
            model: ModelStatus::default(),
            object_urls: 0,
        }
    }

    pub fn filter(&self, predictions: &[Prediction]) -> FramePredictions {
        filter_predictions(predictions, &self.selected)
    }

    /// Replaces the count map with the tally of `predictions` and updates the
    /// recent log. With `record_history`, a history sample is taken if due.
    /// Returns whether a history sample was appended.
    pub fn publish(&mut self, predictions: &[Prediction], now: Instant, time: &str, record_history: bool) -> bool {
        // The selection may have changed while the frame was in the detector.
        let filtered = self.filter(predictions);
        self.counts = tally(&filtered);
        self.processing = true;

        for (class, count) in self.counts.iter().rev() {
            self.recent.push_front(RecentDetection {
                class: class.clone(),
                count: *count,
                time: time.to_owned(),
            });
        }
        self.recent.truncate(RECENT_LOG_CAP);

        record_history && self.history.maybe_snapshot(now, time, &self.counts)
    }

    pub fn record_frame_time(&mut self, now: Instant) {
        self.metrics.record(now);
    }

    /// One tick of the frame-rate timer.
    pub fn sample_frame_rate(&mut self, now: Instant) -> u32 {
        if let Some(fps) = self.metrics.sample(now, self.capture.active) {
            self.frame_rate = fps;
        }
        self.frame_rate
    }

    pub fn clear_frame_rate(&mut self) {
        self.metrics.clear();
        self.frame_rate = 0;
    }

    /// Forgets buffered frame times but keeps the last published rate.
    pub fn clear_frame_times(&mut self) {
        self.metrics.clear();
    }

    /// Replaces the selection and drops counts of deselected classes.
    pub fn set_selected(&mut self, classes: BTreeSet<String>) {
        self.selected = classes;
        let selected = &self.selected;
        self.counts.retain(|class, _| selected.contains(class));
    }

    pub fn selected(&self) -> &BTreeSet<String> {
        &self.selected
    }

    pub fn set_capture(&mut self, active: bool, source: Option<SourceKind>) {
        self.capture.active = active;
        self.capture.source = if active { source } else { None };
    }

    pub fn set_view(&mut self, view: View) {
        self.capture.view = view;
    }

    pub fn set_model(&mut self, model: ModelStatus) {
        self.model = model;
    }

    pub fn set_object_urls(&mut self, live: usize) {
        self.object_urls = live;
    }

    /// Full reset: counts, history, recent log and frame rate.
    pub fn clear(&mut self, now: Instant) {
        self.counts.clear();
        self.history.clear(now);
        self.recent.clear();
        self.clear_frame_rate();
        self.processing = false;
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            counts: self.counts.clone(),
            kpis: KpiCards::derive(&self.counts, self.frame_rate),
            distribution: Distribution::derive(&self.counts),
            table: views::table(&self.counts),
            history_chart: HistoryChart::derive(self.history.entries()),
            stats: DetectionStats::derive(&self.counts),
            recent: self.recent.iter().cloned().collect(),
            history_len: self.history.len(),
            selected_classes: self.selected.iter().cloned().collect(),
            frame_rate: self.frame_rate,
            processing: self.processing,
            capture: self.capture.clone(),
            model: self.model.clone(),
            object_urls: self.object_urls,
        }
    }
}

/// Everything a dashboard consumer needs, computed from one consistent read.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub counts: CountMap,
    pub kpis: KpiCards,
    pub distribution: Distribution,
    pub table: Vec<TableRow>,
    pub history_chart: HistoryChart,
    pub stats: DetectionStats,
    pub recent: Vec<RecentDetection>,
    pub history_len: usize,
    pub selected_classes: Vec<String>,
    pub frame_rate: u32,
    pub processing: bool,
    pub capture: CaptureStatus,
    pub model: ModelStatus,
    pub object_urls: usize,
}

#[derive(Clone)]
pub struct SharedDetections {
    inner: Arc<RwLock<DetectionState>>,
}

impl SharedDetections {
    pub fn new(config: &StateConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(DetectionState::new(config, Instant::now()))),
        }
    }

    fn read<R>(&self, f: impl FnOnce(&DetectionState) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut DetectionState) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.read(DetectionState::snapshot)
    }

    /// Applies the current class selection to raw detector output.
    pub fn filter(&self, predictions: &[Prediction]) -> FramePredictions {
        self.read(|s| s.filter(predictions))
    }

    pub fn counts(&self) -> CountMap {
        self.read(|s| s.counts.clone())
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.read(|s| s.history.entries().cloned().collect())
    }

    pub fn recent(&self) -> Vec<RecentDetection> {
        self.read(|s| s.recent.iter().cloned().collect())
    }

    pub fn selected_classes(&self) -> Vec<String> {
        self.read(|s| s.selected.iter().cloned().collect())
    }

    pub fn frame_rate(&self) -> u32 {
        self.read(|s| s.frame_rate)
    }

    pub fn capture(&self) -> CaptureStatus {
        self.read(|s| s.capture.clone())
    }

    pub fn model(&self) -> ModelStatus {
        self.read(|s| s.model.clone())
    }
}
