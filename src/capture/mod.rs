mod video_file;
mod webcam;

pub use video_file::VideoFileSource;
pub use webcam::WebcamSource;

use anyhow::Result;
use image::RgbImage;

/// Trait for video frame sources
pub trait FrameSource {
    /// Next frame, or `None` once the stream is exhausted
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Get the resolution of produced frames
    fn resolution(&self) -> (u32, u32);

    /// Nominal frames per second
    fn fps(&self) -> f64;
}
