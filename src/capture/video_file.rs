use super::FrameSource;
use crate::error::Error;
use crate::media::mat_to_rgb;
use anyhow::{Context, Result};
use image::RgbImage;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{
    VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT, CAP_PROP_FRAME_HEIGHT,
    CAP_PROP_FRAME_WIDTH,
};
use std::path::Path;

/// Frame rate assumed when the container does not report one
const FALLBACK_FPS: f64 = 30.0;

/// Frames decoded from a video file
pub struct VideoFileSource {
    capture: VideoCapture,
    width: u32,
    height: u32,
    fps: f64,
}

impl VideoFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Opening video {}", path.display());

        let name = path
            .to_str()
            .with_context(|| format!("Video path {} is not valid UTF-8", path.display()))?;

        let capture = match VideoCapture::from_file(name, CAP_ANY) {
            Ok(capture) if capture.is_opened()? => capture,
            Ok(_) => {
                return Err(anyhow::Error::new(Error::VideoRead)
                    .context(format!("Cannot open {}", path.display())));
            }
            Err(e) => {
                tracing::debug!("VideoCapture failed on {}: {}", path.display(), e);
                return Err(anyhow::Error::new(Error::VideoRead)
                    .context(format!("Cannot open {}", path.display())));
            }
        };

        let width = capture.get(CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(CAP_PROP_FRAME_HEIGHT)? as u32;
        let fps = sanitize_fps(capture.get(CAP_PROP_FPS)?);
        let frames = capture.get(CAP_PROP_FRAME_COUNT)?;

        tracing::info!(
            "Video is {}x{} @ {:.2}fps, {} frames",
            width,
            height,
            fps,
            frames as i64
        );

        Ok(Self {
            capture,
            width,
            height,
            fps,
        })
    }
}

/// Containers without timing information report 0 or NaN
fn sanitize_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        FALLBACK_FPS
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut frame = Mat::default();
        let ok = self.capture.read(&mut frame).context("Failed to read frame")?;
        if !ok || frame.empty() {
            return Ok(None);
        }

        mat_to_rgb(&frame).map(Some)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

impl Drop for VideoFileSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            tracing::warn!("Failed to release video capture: {}", e);
        }
    }
}
