mod loopback;
mod video_file;

pub use loopback::LoopbackSink;
pub use video_file::VideoFileSink;

use anyhow::Result;
use image::RgbImage;

/// Trait for output destinations
pub trait FrameSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);

    /// Flush and close the output
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
