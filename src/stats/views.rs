//! Read-only presentations derived from the shared counts and history.
//!
//! Each consumer (KPI cards, distribution chart, history chart, detection
//! table, stats panel) computes its own view from the same snapshot; none of
//! them can write back into the state.
use super::history::HistoryEntry;
use super::CountMap;
use serde::Serialize;
use std::collections::BTreeMap;

const DISTRIBUTION_SLICES: usize = 6;
const HISTORY_CHART_CLASSES: usize = 3;
const HISTORY_CHART_POINTS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Level {
    High,
    Medium,
    Low,
    None,
}

impl Level {
    pub fn for_objects(total: u32) -> Self {
        match total {
            t if t > 10 => Level::High,
            t if t > 0 => Level::Low,
            _ => Level::None,
        }
    }

    pub fn for_frame_rate(fps: u32) -> Self {
        match fps {
            f if f > 25 => Level::High,
            f if f > 15 => Level::Medium,
            f if f > 0 => Level::Low,
            _ => Level::None,
        }
    }

    pub fn for_density(percentage: f64) -> Self {
        if percentage >= 40.0 {
            Level::High
        } else if percentage >= 20.0 {
            Level::Medium
        } else {
            Level::Low
        }
    }
}

pub fn total(counts: &CountMap) -> u32 {
    counts.values().sum()
}

/// Classes ordered by count, highest first; ties keep name order.
fn ranked(counts: &CountMap) -> Vec<(&String, u32)> {
    let mut ranked: Vec<_> = counts.iter().map(|(k, v)| (k, *v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiCards {
    pub tracked_objects: u32,
    pub tracked_level: Level,
    pub frame_rate: u32,
    pub frame_rate_level: Level,
    pub detected_classes: usize,
    pub active: bool,
}

impl KpiCards {
    pub fn derive(counts: &CountMap, frame_rate: u32) -> Self {
        let tracked_objects = total(counts);
        Self {
            tracked_objects,
            tracked_level: Level::for_objects(tracked_objects),
            frame_rate,
            frame_rate_level: Level::for_frame_rate(frame_rate),
            detected_classes: counts.len(),
            active: frame_rate > 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice {
    pub name: String,
    pub value: u32,
}

/// Pie-chart data: the largest classes of the current frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub slices: Vec<Slice>,
    pub total: u32,
}

impl Distribution {
    pub fn derive(counts: &CountMap) -> Self {
        let slices: Vec<Slice> = ranked(counts)
            .into_iter()
            .take(DISTRIBUTION_SLICES)
            .map(|(name, value)| Slice {
                name: name.clone(),
                value,
            })
            .collect();
        let total = slices.iter().map(|s| s.value).sum();
        Self { slices, total }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub class: String,
    pub count: u32,
    pub percentage: f64,
    pub density: Level,
}

pub fn table(counts: &CountMap) -> Vec<TableRow> {
    let total = total(counts);
    ranked(counts)
        .into_iter()
        .map(|(class, count)| {
            let percentage = if total > 0 {
                f64::from(count) / f64::from(total) * 100.0
            } else {
                0.0
            };
            TableRow {
                class: class.clone(),
                count,
                percentage,
                density: Level::for_density(percentage),
            }
        })
        .collect()
}

/// Line-chart data: most frequently seen classes over the latest samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryChart {
    pub classes: Vec<String>,
    pub points: Vec<HistoryEntry>,
}

impl HistoryChart {
    pub fn derive<'a, I>(history: I) -> Self
    where
        I: ExactSizeIterator<Item = &'a HistoryEntry> + Clone,
    {
        let mut appearances: BTreeMap<&str, usize> = BTreeMap::new();
        for entry in history.clone() {
            for class in entry.counts.keys() {
                *appearances.entry(class.as_str()).or_default() += 1;
            }
        }

        let mut ranked: Vec<_> = appearances.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        let classes: Vec<String> = ranked
            .into_iter()
            .take(HISTORY_CHART_CLASSES)
            .map(|(c, _)| c.to_owned())
            .collect();

        let skip = history.len().saturating_sub(HISTORY_CHART_POINTS);
        let points = history
            .skip(skip)
            .map(|entry| HistoryEntry {
                time: entry.time.clone(),
                counts: classes
                    .iter()
                    .map(|c| (c.clone(), entry.counts.get(c).copied().unwrap_or(0)))
                    .collect(),
            })
            .collect();

        Self { classes, points }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MostDetected {
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionStats {
    pub total_detections: u32,
    pub unique_classes: usize,
    pub most_detected: Option<MostDetected>,
    pub status: &'static str,
    pub rate: Level,
}

impl DetectionStats {
    pub fn derive(counts: &CountMap) -> Self {
        let total_detections = total(counts);
        let most_detected = ranked(counts)
            .into_iter()
            .find(|(_, count)| *count > 0)
            .map(|(name, count)| MostDetected {
                name: name.clone(),
                count,
            });

        Self {
            total_detections,
            unique_classes: counts.len(),
            most_detected,
            status: if total_detections > 0 { "Active" } else { "Idle" },
            rate: Level::for_objects(total_detections),
        }
    }
}
