use super::preprocess::{logits_to_mask, select_mask, Geometry, Preprocessor, ResizeMode};
use super::session::{load_session, OwnedTensor, PromptTensors};
use super::types::{Mask, PointPrompt, PredictOptions, PromptSegmenter};
use crate::config::{Device, ModelConfig, ModelVersion};
use crate::error::Error;
use anyhow::{Context, Result};
use image::RgbImage;
use ort::session::Session;
use ort::value::Tensor;

/// Segment Anything (v1) split into an image encoder and a prompt decoder
///
/// The encoder runs once per image; the decoder runs once per prompt set and
/// returns logits already resized to the original image.
pub struct SamV1 {
    encoder: Session,
    decoder: Session,
    preprocessor: Preprocessor,
    input_size: u32,
    mask_threshold: f32,

    // Cached output of the last `set_image`
    embeddings: Option<OwnedTensor>,
    geometry: Option<Geometry>,
}

impl SamV1 {
    pub fn new(config: &ModelConfig, device: Device) -> Result<Self> {
        config.check_files()?;

        let encoder = load_session(&config.encoder, config, device)?;
        let decoder = load_session(&config.decoder, config, device)?;

        tracing::info!("SAM model loaded on device: {:?}", device);

        Ok(Self {
            encoder,
            decoder,
            preprocessor: Preprocessor::new(
                config.input_size,
                ResizeMode::LongestSide,
                config.pixel_mean,
                config.pixel_std,
            ),
            input_size: config.input_size,
            mask_threshold: config.mask_threshold,
            embeddings: None,
            geometry: None,
        })
    }
}

/// Decoder point list: prompts in input coordinates plus the `(0, 0)` padding
/// point labelled -1 that stands in for the absent box prompt
pub fn v1_points(prompts: &[PointPrompt], geometry: &Geometry) -> Vec<(f32, f32, f32)> {
    prompts
        .iter()
        .map(|p| {
            let (x, y) = geometry.transform_point(p.x, p.y);
            (x, y, p.label.as_f32())
        })
        .chain(std::iter::once((0.0, 0.0, -1.0)))
        .collect()
}

impl PromptSegmenter for SamV1 {
    fn set_image(&mut self, frame: &RgbImage) -> Result<()> {
        let _span = tracing::debug_span!("sam_set_image").entered();

        let (input, geometry) = self.preprocessor.preprocess(frame)?;
        let side = self.input_size as usize;
        let image = Tensor::from_array(([1usize, 3, side, side], input.into_raw_vec()))?;

        let _infer_span = tracing::debug_span!("encode").entered();
        let outputs = self
            .encoder
            .run(ort::inputs!["image" => image])
            .context("Failed to run image encoder")?;
        let embeddings = OwnedTensor::extract(outputs.get("image_embeddings"), "image_embeddings")?;
        drop(outputs);
        drop(_infer_span);

        self.embeddings = Some(embeddings);
        self.geometry = Some(geometry);
        Ok(())
    }

    fn predict(&mut self, prompts: &[PointPrompt], options: PredictOptions) -> Result<Mask> {
        let _span = tracing::debug_span!("sam_predict").entered();

        let (embeddings, geometry) = match (&self.embeddings, &self.geometry) {
            (Some(embeddings), Some(geometry)) => (embeddings, *geometry),
            _ => return Err(Error::ImageNotSet.into()),
        };
        if prompts.is_empty() {
            return Err(Error::NoPrompts.into());
        }

        let points = v1_points(prompts, &geometry);
        let prompt = PromptTensors::new(&points)?;
        let (width, height) = geometry.original;
        let orig_im_size = Tensor::from_array(([2usize], vec![height as f32, width as f32]))?;

        let _infer_span = tracing::debug_span!("decode").entered();
        let outputs = self
            .decoder
            .run(ort::inputs![
                "image_embeddings" => embeddings.to_tensor()?,
                "point_coords" => prompt.coords,
                "point_labels" => prompt.labels,
                "mask_input" => prompt.mask_input,
                "has_mask_input" => prompt.has_mask_input,
                "orig_im_size" => orig_im_size
            ])
            .context("Failed to run mask decoder")?;
        let masks = OwnedTensor::extract(outputs.get("masks"), "masks")?;
        let scores = OwnedTensor::extract(outputs.get("iou_predictions"), "iou_predictions")?;
        drop(outputs);
        drop(_infer_span);

        let index = select_mask(&scores.data, options.multimask);
        let (mask_h, mask_w) = masks.spatial()?;
        let mask = logits_to_mask(
            masks.plane(index)?,
            mask_w,
            mask_h,
            &geometry,
            self.mask_threshold,
        )?;

        tracing::debug!("Mask {} covers {} pixels", index, mask.area());
        Ok(mask)
    }

    fn reset(&mut self) {
        self.embeddings = None;
        self.geometry = None;
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn version(&self) -> ModelVersion {
        ModelVersion::V1
    }
}
