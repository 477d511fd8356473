use super::{SharedDetector, SharedOverlay, time_label};
use crate::cv::FrameSource;
use crate::cv::frame_metrics::FPS_WINDOW;
use crate::stats::SharedDetections;
use log::{debug, error, info, warning};
use std::sync::PoisonError;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    SourceEnded,
    Failed,
    NoDetector,
}

/// Runs one capture session until it is cancelled or the source ends.
///
/// Frames are processed strictly one at a time: the next frame is only pulled
/// after the previous one has been detected and published. `stop` is checked
/// at every iteration boundary and once more after the detector returns, so a
/// frame that was in flight when the run got cancelled is discarded.
pub(crate) async fn run_detection(
    state: SharedDetections,
    detector: SharedDetector,
    overlay: SharedOverlay,
    mut source: Box<dyn FrameSource>,
    stop: watch::Receiver<bool>,
) -> StopReason {
    let kind = source.kind();
    let mut slot = detector.lock_owned().await;

    let reason = match slot.as_mut() {
        None => {
            warning!("No detector available, {:?} capture not started", kind);
            StopReason::NoDetector
        }
        Some(detector) => {
            info!("Starting {:?} detection loop", kind);
            let mut frames = 0u64;

            let reason = loop {
                if *stop.borrow() {
                    break StopReason::Cancelled;
                }

                let frame = match source.next_frame().await {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break StopReason::SourceEnded,
                    Err(e) => {
                        error!("Failed to read {:?} frame: {:#}", kind, e);
                        break StopReason::Failed;
                    }
                };
                if *stop.borrow() {
                    break StopReason::Cancelled;
                }

                state.write(|s| s.record_frame_time(Instant::now()));

                let predictions = match detector.detect(&frame).await {
                    Ok(predictions) => predictions,
                    Err(e) => {
                        error!("Detector failed on frame {}: {:#}", frame.seq, e);
                        break StopReason::Failed;
                    }
                };
                if *stop.borrow() {
                    debug!("Discarding frame {} of a cancelled run", frame.seq);
                    break StopReason::Cancelled;
                }

                let filtered = state.filter(&predictions);
                overlay
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .render(&frame, &filtered);

                let label = time_label();
                if state.write(|s| s.publish(&filtered, Instant::now(), &label, true)) {
                    debug!("History sample taken at {}", label);
                }
                frames += 1;

                // Hand the thread back before the next frame, like waiting for the next repaint.
                tokio::task::yield_now().await;
            };

            info!(
                "{:?} detection loop stopped after {} frames ({:?})",
                kind, frames, reason
            );
            reason
        }
    };

    source.stop();
    state.write(|s| s.set_capture(false, None));
    reason
}

/// Publishes the frame rate once per second until `shutdown` fires.
pub(crate) async fn frame_rate_timer(state: SharedDetections, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(FPS_WINDOW);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let fps = state.write(|s| s.sample_frame_rate(Instant::now()));
                debug!("Frame rate: {} FPS", fps);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Frame rate timer shutting down");
                    break;
                }
            }
        }
    }
}
