use log::{debug, info};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Width of the frame-rate window.
pub const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Rolling frame-timestamp buffer used only for frame-rate estimation.
#[derive(Debug, Default)]
pub struct FrameMetrics {
    frame_times: VecDeque<Instant>,
    frame_count: usize,
}

impl FrameMetrics {
    pub fn new() -> Self {
        debug!("Initializing frame metrics tracker");
        Self::default()
    }

    pub fn record(&mut self, now: Instant) {
        if let Some(last) = self.frame_times.back() {
            debug!(
                "Frame #{} (frame time: {}ms)",
                self.frame_count,
                now.saturating_duration_since(*last).as_millis()
            );
        }

        self.frame_times.push_back(now);
        self.frame_count += 1;

        if self.frame_count % 100 == 0 {
            info!("Processed {} frames", self.frame_count);
        }
    }

    /// Prunes timestamps older than [`FPS_WINDOW`] and returns the rate to publish.
    ///
    /// `None` means "keep the current value": a single frame in the window is
    /// not enough to estimate a rate, and an empty window while detection is
    /// still running is treated as a stall rather than a stop.
    pub fn sample(&mut self, now: Instant, detecting: bool) -> Option<u32> {
        if self.frame_times.is_empty() {
            return (!detecting).then_some(0);
        }

        while let Some(first) = self.frame_times.front() {
            if now.saturating_duration_since(*first) >= FPS_WINDOW {
                self.frame_times.pop_front();
            } else {
                break;
            }
        }

        let recent = self.frame_times.len();
        (recent > 1).then_some(recent as u32)
    }

    pub fn clear(&mut self) {
        self.frame_times.clear();
    }

    #[cfg(test)]
    fn frames_in_window(&self) -> usize {
        self.frame_times.len()
    }

    #[cfg(test)]
    fn get_frame_count(&self) -> usize {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn counts_frames_in_last_second() {
        let mut metrics = FrameMetrics::new();
        let start = Instant::now();

        for i in 0..30u64 {
            metrics.record(start + Duration::from_millis(i * 50));
        }

        // At 1.6s only the frames stamped after 0.6s remain.
        let now = start + Duration::from_millis(1600);
        assert_eq!(metrics.sample(now, true), Some(17));
        assert_eq!(metrics.frames_in_window(), 17);
        assert_eq!(metrics.get_frame_count(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_window_reports_zero_only_when_not_detecting() {
        let mut metrics = FrameMetrics::new();
        let now = Instant::now();

        assert_eq!(metrics.sample(now, true), None);
        assert_eq!(metrics.sample(now, false), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn single_frame_keeps_previous_rate() {
        let mut metrics = FrameMetrics::new();
        let start = Instant::now();
        metrics.record(start);

        assert_eq!(metrics.sample(start + Duration::from_millis(10), true), None);
        assert_eq!(metrics.sample(start + Duration::from_secs(2), true), None);
        assert_eq!(metrics.frames_in_window(), 0);
    }
}
