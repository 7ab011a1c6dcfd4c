use super::FrameSink;
use crate::media::rgb_to_mat;
use anyhow::{Context, Result};
use image::{imageops, RgbImage};
use opencv::core::Size;
use opencv::prelude::*;
use opencv::videoio::VideoWriter;
use std::path::{Path, PathBuf};

/// Segmented frames encoded into an MPEG-4 file
pub struct VideoFileSink {
    writer: VideoWriter,
    path: PathBuf,
    width: u32,
    height: u32,
    frames: u64,
}

impl VideoFileSink {
    pub fn create<P: AsRef<Path>>(path: P, width: u32, height: u32, fps: f64) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(
            "Writing video to {} ({}x{} @ {:.2}fps)",
            path.display(),
            width,
            height,
            fps
        );

        let name = path
            .to_str()
            .with_context(|| format!("Output path {} is not valid UTF-8", path.display()))?;
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(
            name,
            fourcc,
            fps,
            Size::new(width as i32, height as i32),
            true,
        )
        .with_context(|| format!("Failed to create video writer for {}", path.display()))?;

        if !writer.is_opened()? {
            anyhow::bail!("Failed to open {} for writing", path.display());
        }

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            width,
            height,
            frames: 0,
        })
    }
}

impl FrameSink for VideoFileSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        // The writer silently drops frames of the wrong size
        let mat = if frame.dimensions() != (self.width, self.height) {
            let resized = imageops::resize(
                frame,
                self.width,
                self.height,
                imageops::FilterType::Triangle,
            );
            rgb_to_mat(&resized)?
        } else {
            rgb_to_mat(frame)?
        };

        self.writer
            .write(&mat)
            .context("Failed to write frame to video file")?;
        self.frames += 1;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.release()?;
        tracing::info!("Wrote {} frames to {}", self.frames, self.path.display());
        Ok(())
    }
}
