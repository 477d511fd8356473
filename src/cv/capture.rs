use super::{Frame, FrameSource, SourceFactory, SourceKind};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, info, warning};
use opencv::{
    core::{Mat, MatTraitConst},
    imgcodecs,
    videoio::{VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use std::path::Path;

pub struct CaptureSource {
    kind: SourceKind,
    capture: VideoCapture,
    seq: u64,
}

#[async_trait]
impl FrameSource for CaptureSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let seq = self.seq;
        let capture = &mut self.capture;

        let frame = tokio::task::block_in_place(|| -> Result<Option<Frame>> {
            let mut mat = Mat::default();
            if !capture.read(&mut mat)? {
                debug!("Capture returned no frame, treating stream as ended");
                return Ok(None);
            }
            if mat.empty() {
                warning!("Empty frame received");
                return Ok(None);
            }
            Ok(Some(frame_from_mat(seq, &mat)?))
        })?;

        if frame.is_some() {
            self.seq += 1;
        }
        Ok(frame)
    }

    fn stop(&mut self) {
        if let Err(e) = self.capture.release() {
            warning!("Failed to release capture device: {}", e);
        }
    }
}

pub fn frame_from_mat(seq: u64, mat: &Mat) -> opencv::Result<Frame> {
    Ok(Frame {
        seq,
        width: mat.cols() as u32,
        height: mat.rows() as u32,
        pixels: mat.data_bytes()?.to_vec(),
    })
}

/// Rebuilds a 3-channel BGR `Mat` from a frame's packed pixels.
pub fn mat_from_frame(frame: &Frame) -> opencv::Result<Mat> {
    let flat = Mat::from_slice(&frame.pixels)?;
    flat.reshape(3, frame.height as i32)?.try_clone()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OpencvFactory;

impl SourceFactory for OpencvFactory {
    fn open_camera(&self) -> Result<Box<dyn FrameSource>> {
        info!("Opening camera stream");
        let capture = VideoCapture::new_def(0).context("Failed to open camera")?;
        if !capture.is_opened()? {
            return Err(anyhow!("Camera not opened"));
        }
        debug!("Camera opened successfully with default settings");
        Ok(Box::new(CaptureSource {
            kind: SourceKind::Camera,
            capture,
            seq: 0,
        }))
    }

    fn open_video(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        let file = path.to_str().context("Invalid video path")?;
        info!("Opening input video file stream {}", file);
        let capture = VideoCapture::from_file_def(file).context("Failed to open video")?;
        if !capture.is_opened()? {
            return Err(anyhow!("Video {} could not be decoded", file));
        }
        Ok(Box::new(CaptureSource {
            kind: SourceKind::Video,
            capture,
            seq: 0,
        }))
    }

    fn load_image(&self, path: &Path) -> Result<Frame> {
        let file = path.to_str().context("Invalid image path")?;
        let mat = imgcodecs::imread_def(file)?;
        if mat.empty() {
            return Err(anyhow!("Image {} could not be decoded", file));
        }
        Ok(frame_from_mat(0, &mat)?)
    }
}
