use super::{Frame, Prediction};
use log::debug;

/// Visual layer that draws boxes and labels for the filtered predictions.
pub trait Overlay: Send {
    fn render(&mut self, frame: &Frame, predictions: &[Prediction]);

    /// Wipes whatever was drawn last.
    fn clear(&mut self) {}
}

/// Headless overlay: writes the labels it would draw to the debug log.
#[derive(Debug, Default)]
pub struct LogOverlay;

impl Overlay for LogOverlay {
    fn render(&mut self, frame: &Frame, predictions: &[Prediction]) {
        for prediction in predictions {
            let [x, y, w, h] = prediction.bbox;
            debug!(
                "frame {}: {} at x={:.0} y={:.0} w={:.0} h={:.0}",
                frame.seq,
                prediction.label(),
                x,
                y,
                w,
                h
            );
        }
    }
}

#[cfg(feature = "opencv")]
pub use window::WindowOverlay;

#[cfg(feature = "opencv")]
mod window {
    use super::{Frame, Overlay, Prediction};
    use crate::cv::capture::mat_from_frame;
    use log::{debug, warning};
    use opencv::core::{Point, Rect, Scalar};
    use opencv::{highgui, imgproc};

    const WINNAME: &str = "lookout";

    /// Draws boxes onto a `highgui` window.
    pub struct WindowOverlay;

    impl WindowOverlay {
        pub fn new() -> Self {
            debug!("Initializing display window '{}'", WINNAME);
            if let Err(e) = highgui::named_window(
                WINNAME,
                highgui::WINDOW_KEEPRATIO | highgui::WINDOW_GUI_NORMAL,
            ) {
                warning!("Could not create named window: {:?}", e);
            }
            Self
        }

        fn draw(&self, frame: &Frame, predictions: &[Prediction]) -> opencv::Result<()> {
            let mut mat = mat_from_frame(frame)?;
            let color = Scalar::new(68., 68., 239., 0.);

            for prediction in predictions {
                let [x, y, w, h] = prediction.bbox;
                let rect = Rect::new(x as i32, y as i32, w as i32, h as i32);
                imgproc::rectangle(&mut mat, rect, color, 2, imgproc::LINE_8, 0)?;
                imgproc::put_text(
                    &mut mat,
                    &prediction.label(),
                    Point::new(x as i32 + 5, (y as i32 - 5).max(12)),
                    imgproc::FONT_HERSHEY_SIMPLEX,
                    0.5,
                    color,
                    1,
                    imgproc::LINE_8,
                    false,
                )?;
            }

            highgui::imshow(WINNAME, &mat)?;
            highgui::wait_key(1)?;
            Ok(())
        }
    }

    impl Overlay for WindowOverlay {
        fn render(&mut self, frame: &Frame, predictions: &[Prediction]) {
            if let Err(e) = self.draw(frame, predictions) {
                warning!("Failed to draw overlay for frame {}: {}", frame.seq, e);
            }
        }
    }
}
