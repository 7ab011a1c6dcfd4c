use super::types::Mask;
use crate::error::Error;
use anyhow::Result;
use image::{imageops, ImageBuffer, Luma, RgbImage};
use ndarray::Array4;

/// How a frame is fitted into the square encoder input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Scale the longest side to the input size, pad bottom/right with zeros
    LongestSide,
    /// Stretch both sides to the input size
    Stretch,
}

/// Mapping between frame pixels and encoder input pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub original: (u32, u32),
    pub scaled: (u32, u32),
    pub input_size: u32,
}

impl Geometry {
    pub fn new(mode: ResizeMode, width: u32, height: u32, input_size: u32) -> Self {
        let scaled = match mode {
            ResizeMode::LongestSide => {
                let scale = input_size as f64 / width.max(height) as f64;
                let w = (width as f64 * scale + 0.5).floor() as u32;
                let h = (height as f64 * scale + 0.5).floor() as u32;
                (w.max(1), h.max(1))
            }
            ResizeMode::Stretch => (input_size, input_size),
        };

        Self {
            original: (width, height),
            scaled,
            input_size,
        }
    }

    /// Map a frame coordinate into encoder input coordinates
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = self.scaled.0 as f32 / self.original.0 as f32;
        let sy = self.scaled.1 as f32 / self.original.1 as f32;
        (x * sx, y * sy)
    }

    /// Size of the un-padded region inside a `width x height` low resolution mask
    fn valid_region(&self, width: u32, height: u32) -> (u32, u32) {
        let w = (width as f64 * self.scaled.0 as f64 / self.input_size as f64).round() as u32;
        let h = (height as f64 * self.scaled.1 as f64 / self.input_size as f64).round() as u32;
        (w.clamp(1, width), h.clamp(1, height))
    }
}

/// Preprocessor for converting RGB images to encoder input tensors
pub struct Preprocessor {
    input_size: u32,
    mode: ResizeMode,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Preprocessor {
    pub fn new(input_size: u32, mode: ResizeMode, mean: [f32; 3], std: [f32; 3]) -> Self {
        Self {
            input_size,
            mode,
            mean,
            std,
        }
    }

    pub fn geometry(&self, width: u32, height: u32) -> Geometry {
        Geometry::new(self.mode, width, height, self.input_size)
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize according to the resize mode
    /// 2. Normalize each channel with `(p - mean) / std` in 0-255 units
    /// 3. Write into a zeroed `[1, 3, S, S]` tensor, leaving padding at zero
    pub fn preprocess(&self, image: &RgbImage) -> Result<(Array4<f32>, Geometry)> {
        let _span = tracing::debug_span!("preprocess").entered();

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow::anyhow!("Cannot preprocess an empty {}x{} image", width, height));
        }

        let geometry = self.geometry(width, height);
        let (scaled_w, scaled_h) = geometry.scaled;

        let resized = if image.dimensions() != (scaled_w, scaled_h) {
            imageops::resize(image, scaled_w, scaled_h, imageops::FilterType::Triangle)
        } else {
            image.clone()
        };

        let side = self.input_size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (pixel[c] as f32 - self.mean[c]) / self.std[c];
            }
        }

        Ok((tensor, geometry))
    }
}

/// Pick which decoder candidate to keep
///
/// Without multimask the decoder's first candidate is used. Exports that
/// return several candidates put the single-mask output at index 0 and the
/// multimask proposals after it, so multimask picks the highest predicted IoU
/// among indices `1..`.
pub fn select_mask(iou_predictions: &[f32], multimask: bool) -> usize {
    if !multimask || iou_predictions.len() < 2 {
        return 0;
    }

    iou_predictions
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

/// Turn decoder logits into a mask at the original frame size
///
/// Logits already at frame size are thresholded directly. Low resolution
/// logits are cropped to the un-padded region and squashed through a sigmoid
/// so the resampler works in [0, 1], then bilinearly resized and compared
/// against the sigmoid of the threshold.
pub fn logits_to_mask(
    logits: &[f32],
    logits_width: u32,
    logits_height: u32,
    geometry: &Geometry,
    threshold: f32,
) -> Result<Mask> {
    let _span = tracing::debug_span!("postprocess").entered();

    if logits.len() != (logits_width * logits_height) as usize {
        return Err(Error::UnexpectedOutput(format!(
            "mask logits hold {} values, expected {}x{}",
            logits.len(),
            logits_width,
            logits_height
        ))
        .into());
    }

    let (width, height) = geometry.original;

    if (logits_width, logits_height) == (width, height) {
        let data = logits.iter().map(|v| *v > threshold).collect();
        return Ok(Mask::new(width, height, data));
    }

    let probabilities = logits.iter().map(|v| sigmoid(*v)).collect();
    let low_res: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(logits_width, logits_height, probabilities).ok_or_else(|| {
            Error::UnexpectedOutput("mask logits do not form an image".to_string())
        })?;

    let (crop_w, crop_h) = geometry.valid_region(logits_width, logits_height);
    let cropped = imageops::crop_imm(&low_res, 0, 0, crop_w, crop_h).to_image();
    let upscaled = imageops::resize(&cropped, width, height, imageops::FilterType::Triangle);

    let cutoff = sigmoid(threshold);
    let data = upscaled.pixels().map(|p| p[0] > cutoff).collect();
    Ok(Mask::new(width, height, data))
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEAN: [f32; 3] = [123.675, 116.28, 103.53];
    const STD: [f32; 3] = [58.395, 57.12, 57.375];

    #[test]
    fn test_longest_side_geometry() {
        let geometry = Geometry::new(ResizeMode::LongestSide, 1280, 720, 1024);
        assert_eq!(geometry.scaled, (1024, 576));

        let (x, y) = geometry.transform_point(640.0, 360.0);
        assert!((x - 512.0).abs() < 1e-3);
        assert!((y - 288.0).abs() < 1e-3);
    }

    #[test]
    fn test_longest_side_rounds_half_up() {
        // 1024 * 333 / 1000 = 340.992
        let geometry = Geometry::new(ResizeMode::LongestSide, 1000, 333, 1024);
        assert_eq!(geometry.scaled, (1024, 341));
    }

    #[test]
    fn test_stretch_geometry() {
        let geometry = Geometry::new(ResizeMode::Stretch, 1280, 720, 1024);
        assert_eq!(geometry.scaled, (1024, 1024));

        let (x, y) = geometry.transform_point(640.0, 360.0);
        assert!((x - 512.0).abs() < 1e-3);
        assert!((y - 512.0).abs() < 1e-3);
    }

    #[test]
    fn test_preprocess_pads_bottom() {
        let preprocessor = Preprocessor::new(16, ResizeMode::LongestSide, MEAN, STD);
        let image = RgbImage::from_pixel(4, 2, image::Rgb([255, 255, 255]));

        let (tensor, geometry) = preprocessor.preprocess(&image).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
        assert_eq!(geometry.scaled, (16, 8));

        for c in 0..3 {
            let expected = (255.0 - MEAN[c]) / STD[c];
            assert!((tensor[[0, c, 0, 0]] - expected).abs() < 0.05);
            assert!((tensor[[0, c, 7, 15]] - expected).abs() < 0.05);
            assert_eq!(tensor[[0, c, 8, 0]], 0.0);
            assert_eq!(tensor[[0, c, 15, 15]], 0.0);
        }
    }

    #[test]
    fn test_preprocess_channel_order() {
        let preprocessor = Preprocessor::new(16, ResizeMode::Stretch, [0.0; 3], [1.0; 3]);
        let image = RgbImage::from_pixel(16, 16, image::Rgb([10, 20, 30]));

        let (tensor, _) = preprocessor.preprocess(&image).unwrap();
        assert_eq!(tensor[[0, 0, 3, 3]], 10.0);
        assert_eq!(tensor[[0, 1, 3, 3]], 20.0);
        assert_eq!(tensor[[0, 2, 3, 3]], 30.0);
    }

    #[test]
    fn test_preprocess_rejects_empty_image() {
        let preprocessor = Preprocessor::new(16, ResizeMode::Stretch, MEAN, STD);
        assert!(preprocessor.preprocess(&RgbImage::new(0, 0)).is_err());
    }

    #[test]
    fn test_select_mask() {
        let iou = [0.2, 0.9, 0.5];
        assert_eq!(select_mask(&iou, false), 0);
        assert_eq!(select_mask(&iou, true), 1);
        assert_eq!(select_mask(&[], true), 0);
        assert_eq!(select_mask(&[0.7], true), 0);
    }

    #[test]
    fn test_multimask_skips_single_mask_output() {
        // Index 0 scores best but is the single-mask head
        let iou = [0.99, 0.4, 0.8, 0.6];
        assert_eq!(select_mask(&iou, true), 2);
        assert_eq!(select_mask(&iou, false), 0);
    }

    #[test]
    fn test_logits_at_frame_size() {
        let geometry = Geometry::new(ResizeMode::Stretch, 2, 2, 16);
        let mask = logits_to_mask(&[1.0, -1.0, 0.0, 3.5], 2, 2, &geometry, 0.0).unwrap();
        assert_eq!(mask.as_slice(), &[true, false, false, true]);
    }

    #[test]
    fn test_low_res_logits_upscaled() {
        let geometry = Geometry::new(ResizeMode::Stretch, 8, 8, 16);
        let logits: Vec<f32> = (0..16)
            .map(|i| if i % 4 < 2 { 8.0 } else { -8.0 })
            .collect();

        let mask = logits_to_mask(&logits, 4, 4, &geometry, 0.0).unwrap();
        assert_eq!(mask.dimensions(), (8, 8));
        assert!(mask.get(0, 0));
        assert!(mask.get(0, 7));
        assert!(!mask.get(7, 0));
        assert!(!mask.get(7, 7));
    }

    #[test]
    fn test_low_res_logits_padding_cropped() {
        // 8x4 frame fills the top half of a 16x16 input
        let geometry = Geometry::new(ResizeMode::LongestSide, 8, 4, 16);
        let logits: Vec<f32> = (0..16)
            .map(|i| if i / 4 < 2 { 5.0 } else { -5.0 })
            .collect();

        let mask = logits_to_mask(&logits, 4, 4, &geometry, 0.0).unwrap();
        assert_eq!(mask.dimensions(), (8, 4));
        assert_eq!(mask.area(), 32);
    }

    #[test]
    fn test_logits_length_mismatch() {
        let geometry = Geometry::new(ResizeMode::Stretch, 2, 2, 16);
        assert!(logits_to_mask(&[0.0; 3], 2, 2, &geometry, 0.0).is_err());
    }
}
