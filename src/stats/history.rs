use super::CountMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// One sample of the count map, serialized flat: `{"time": "...", "car": 2}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub time: String,
    #[serde(flatten)]
    pub counts: CountMap,
}

/// Capped time series of count samples taken at most once per `interval`.
#[derive(Debug)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    cap: usize,
    interval: Duration,
    last_snapshot: Instant,
}

impl History {
    /// The first snapshot becomes due one `interval` after `now`.
    pub fn new(cap: usize, interval: Duration, now: Instant) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(1024)),
            cap: cap.max(1),
            interval,
            last_snapshot: now,
        }
    }

    /// Appends a sample when at least `interval` has passed since the last one.
    pub fn maybe_snapshot(&mut self, now: Instant, time: &str, counts: &CountMap) -> bool {
        if now.saturating_duration_since(self.last_snapshot) < self.interval {
            return false;
        }

        self.last_snapshot = now;
        self.entries.push_back(HistoryEntry {
            time: time.to_owned(),
            counts: counts.clone(),
        });
        while self.entries.len() > self.cap {
            self.entries.pop_front();
        }
        true
    }

    pub fn clear(&mut self, now: Instant) {
        self.entries.clear();
        self.last_snapshot = now;
    }

    pub fn entries(&self) -> impl ExactSizeIterator<Item = &HistoryEntry> + Clone {
        self.entries.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
