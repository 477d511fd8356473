use super::capture::mat_from_frame;
use super::{Detector, Frame, Prediction};
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warning};
use opencv::Error;
use opencv::core::*;
use opencv::dnn;
use opencv::dnn::NetTrait;
use std::time::Instant;

/// MobileNet-SSD (Caffe) detector running on the OpenCV `dnn` module.
pub struct SsdDetector {
    net: dnn::Net,
    confidence: f32,
}

impl SsdDetector {
    pub fn new(prototxt: &str, caffe_model: &str, confidence: f32) -> opencv::Result<Self> {
        debug!(
            "Loading neural network model from files: proto='{}', model='{}'",
            prototxt, caffe_model
        );
        let start_time = Instant::now();

        let net = match dnn::read_net_from_caffe(prototxt, caffe_model) {
            Ok(net) => {
                info!(
                    "Neural network loaded successfully in {:?}",
                    start_time.elapsed()
                );
                net
            }
            Err(e) => {
                error!("Failed to load neural network: {}", e);
                return Err(e);
            }
        };

        Ok(Self { net, confidence })
    }

    /// VOC labels of the SSD model, spelled the way the rest of the dashboard names them.
    const CLASSES: [&str; 21] = [
        "background",
        "airplane",
        "bicycle",
        "bird",
        "boat",
        "bottle",
        "bus",
        "car",
        "cat",
        "chair",
        "cow",
        "dining table",
        "dog",
        "horse",
        "motorcycle",
        "person",
        "potted plant",
        "sheep",
        "couch",
        "train",
        "tv",
    ];

    fn forward(&mut self, frame: &Frame) -> Result<Vec<Prediction>, Error> {
        let process_start = Instant::now();
        let input = mat_from_frame(frame)?;

        let frame_blob = dnn::blob_from_image(
            &input,
            1.0 / 127.5,
            Size::new(300, 300),
            Scalar::new(127.5, 127.5, 127.5, 0.),
            false,
            false,
            CV_32F,
        )?;

        self.net.set_input_def(&frame_blob)?;
        let detections = self.net.forward_single("detection_out")?;

        let sizes = detections.mat_size();
        if sizes.len() != 4 {
            error!(
                "Invalid output size: expected 4 dimensions, got {}",
                sizes.len()
            );
            return Err(Error::new(1, "Invalid output size"));
        }
        let num = sizes[2];
        let (width, height) = (frame.width as f32, frame.height as f32);

        let mut predictions = Vec::new();
        for i in 0..num {
            let score = *detections.at_nd::<f32>(&[0, 0, i, 2])?;
            if score <= self.confidence {
                continue;
            }

            let class_id = *detections.at_nd::<f32>(&[0, 0, i, 1])? as usize;
            let Some(class_name) = Self::CLASSES.get(class_id) else {
                warning!(
                    "Invalid class ID: {}, max allowed: {}",
                    class_id,
                    Self::CLASSES.len() - 1
                );
                continue;
            };
            if class_id == 0 {
                continue;
            }

            let coord = |k: i32| -> Result<f32, Error> { Ok(*detections.at_nd::<f32>(&[0, 0, i, k])?) };
            let (x1, y1) = (coord(3)? * width, coord(4)? * height);
            let (x2, y2) = (coord(5)? * width, coord(6)? * height);

            predictions.push(Prediction::new(
                *class_name,
                score,
                [x1.max(0.), y1.max(0.), (x2 - x1).max(1.), (y2 - y1).max(1.)],
            ));
        }

        debug!(
            "Frame {} processed: {} detections in {:?}",
            frame.seq,
            predictions.len(),
            process_start.elapsed()
        );
        Ok(predictions)
    }
}

#[async_trait]
impl Detector for SsdDetector {
    async fn detect(&mut self, frame: &Frame) -> Result<Vec<Prediction>> {
        Ok(tokio::task::block_in_place(|| self.forward(frame))?)
    }
}
