use crate::config::ModelVersion;
use crate::error::Error;
use anyhow::Result;
use image::{GrayImage, RgbImage};

/// Whether a clicked point lies on the object or outside it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointLabel {
    Background = 0,
    Foreground = 1,
}

impl PointLabel {
    /// Value fed to the decoder's `point_labels` input
    pub fn as_f32(self) -> f32 {
        self as i32 as f32
    }
}

impl TryFrom<i64> for PointLabel {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Error> {
        match value {
            0 => Ok(PointLabel::Background),
            1 => Ok(PointLabel::Foreground),
            other => Err(Error::InvalidLabel(other)),
        }
    }
}

/// A single point prompt in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPrompt {
    pub x: f32,
    pub y: f32,
    pub label: PointLabel,
}

impl PointPrompt {
    pub fn new(x: f32, y: f32, label: PointLabel) -> Self {
        Self { x, y, label }
    }

    pub fn foreground(x: f32, y: f32) -> Self {
        Self::new(x, y, PointLabel::Foreground)
    }

    pub fn background(x: f32, y: f32) -> Self {
        Self::new(x, y, PointLabel::Background)
    }
}

/// Ordered list of point prompts for one prediction
pub type PromptSet = Vec<PointPrompt>;

/// Knobs for a single `predict` call
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictOptions {
    /// Ask the decoder for several candidates and keep the best scored one
    pub multimask: bool,
}

/// Binary segmentation mask, row-major, same size as the frame it was predicted for
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl Mask {
    pub fn new(width: u32, height: u32, data: Vec<bool>) -> Self {
        assert_eq!(
            data.len(),
            (width * height) as usize,
            "mask data does not match {}x{}",
            width,
            height
        );
        Self {
            width,
            height,
            data,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[(y * self.width + x) as usize]
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    /// Number of foreground pixels
    pub fn area(&self) -> usize {
        self.as_slice().iter().filter(|v| **v).count()
    }

    /// Tight bounding box `(x, y, width, height)` of the foreground, if any
    pub fn bounding_box(&self) -> Option<(u32, u32, u32, u32)> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        let mut found = false;

        for (idx, _) in self.data.iter().enumerate().filter(|(_, v)| **v) {
            let x = idx as u32 % self.width;
            let y = idx as u32 / self.width;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
            found = true;
        }

        found.then(|| (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
    }

    /// 0 for background, 255 for foreground
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            image::Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }
}

/// Trait for point-prompted segmentation models
///
/// The image embedding is computed once in `set_image`; `predict` can then be
/// called repeatedly with different prompts.
pub trait PromptSegmenter {
    /// Run the image encoder on a frame
    fn set_image(&mut self, frame: &RgbImage) -> Result<()>;

    /// Decode a mask for the current image
    ///
    /// Fails with `Error::ImageNotSet` before `set_image` and with
    /// `Error::NoPrompts` on an empty prompt set.
    fn predict(&mut self, prompts: &[PointPrompt], options: PredictOptions) -> Result<Mask>;

    /// Drop the cached embedding
    fn reset(&mut self) {}

    /// Encoder input side length
    fn input_size(&self) -> u32;

    fn version(&self) -> ModelVersion;
}
