use super::FrameSink;
use anyhow::{Context, Result};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, FourCC};

/// Segmented frames streamed to a v4l2loopback virtual camera
pub struct LoopbackSink {
    file: File,
    width: u32,
    height: u32,
}

impl LoopbackSink {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        // Announce the YUYV format so readers of the loopback device agree on the layout
        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let mut format = Output::format(&device).context("Failed to query output format")?;
        format.width = width;
        format.height = height;
        format.fourcc = FourCC::new(b"YUYV");
        Output::set_format(&device, &format).context("Failed to set YUYV output format")?;

        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width,
            height,
        })
    }
}

/// Pack an RGB frame as YUYV 4:2:2, two pixels per four bytes
///
/// An odd trailing pixel is paired with itself.
fn rgb_to_yuyv(frame: &RgbImage) -> Vec<u8> {
    let row_bytes = frame.width() as usize * 3;
    if row_bytes == 0 {
        return Vec::new();
    }

    let pairs_per_row = (frame.width() as usize).div_ceil(2);
    let mut packed = Vec::with_capacity(pairs_per_row * 4 * frame.height() as usize);

    for row in frame.as_raw().chunks_exact(row_bytes) {
        for pair in row.chunks(6) {
            let (y0, u0, v0) = bt601(&pair[..3]);
            let (y1, u1, v1) = if pair.len() == 6 {
                bt601(&pair[3..])
            } else {
                (y0, u0, v0)
            };

            packed.extend_from_slice(&[
                saturate(y0),
                saturate((u0 + u1) / 2),
                saturate(y1),
                saturate((v0 + v1) / 2),
            ]);
        }
    }

    packed
}

/// Limited-range BT.601 in 8-bit fixed point: Y in 16..=235, chroma centred on 128
fn bt601(rgb: &[u8]) -> (i32, i32, i32) {
    let (r, g, b) = (rgb[0] as i32, rgb[1] as i32, rgb[2] as i32);

    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;

    (y, u, v)
}

fn saturate(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

impl FrameSink for LoopbackSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let yuyv = if frame.dimensions() != (self.width, self.height) {
            let resized = image::imageops::resize(
                frame,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            );
            rgb_to_yuyv(&resized)
        } else {
            rgb_to_yuyv(frame)
        };

        self.file
            .write_all(&yuyv)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_white_and_black_levels() {
        let white = RgbImage::from_pixel(2, 1, Rgb([255, 255, 255]));
        assert_eq!(rgb_to_yuyv(&white), vec![235, 128, 235, 128]);

        let black = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        assert_eq!(rgb_to_yuyv(&black), vec![16, 128, 16, 128]);
    }

    #[test]
    fn test_pair_shares_chroma() {
        let mut frame = RgbImage::new(2, 1);
        frame.put_pixel(0, 0, Rgb([255, 0, 0]));
        frame.put_pixel(1, 0, Rgb([0, 0, 255]));
        let packed = rgb_to_yuyv(&frame);

        let (red_y, red_u, red_v) = bt601(&[255, 0, 0]);
        let (blue_y, blue_u, blue_v) = bt601(&[0, 0, 255]);
        assert_eq!(packed[0] as i32, red_y);
        assert_eq!(packed[2] as i32, blue_y);
        assert_eq!(packed[1] as i32, (red_u + blue_u) / 2);
        assert_eq!(packed[3] as i32, (red_v + blue_v) / 2);
    }

    #[test]
    fn test_odd_width_repeats_last_pixel() {
        let frame = RgbImage::from_pixel(3, 2, Rgb([0, 0, 0]));
        let packed = rgb_to_yuyv(&frame);
        assert_eq!(packed.len(), 16);
        assert_eq!(&packed[4..8], &[16, 128, 16, 128]);
    }

    #[test]
    fn test_empty_frame() {
        assert!(rgb_to_yuyv(&RgbImage::new(0, 0)).is_empty());
    }
}
