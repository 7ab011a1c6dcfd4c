use super::preprocess::{logits_to_mask, select_mask, Geometry, Preprocessor, ResizeMode};
use super::session::{load_session, OwnedTensor, PromptTensors};
use super::types::{Mask, PointPrompt, PredictOptions, PromptSegmenter};
use crate::config::{Device, ModelConfig, ModelVersion};
use crate::error::Error;
use anyhow::{Context, Result};
use image::RgbImage;
use ort::session::Session;
use ort::value::Tensor;

/// Encoder outputs the SAM 2 decoder consumes
struct ImageFeatures {
    image_embed: OwnedTensor,
    high_res_feats_0: OwnedTensor,
    high_res_feats_1: OwnedTensor,
}

/// Segment Anything 2 (Hiera encoder)
///
/// Frames are stretched to the square input, and the decoder returns low
/// resolution logits that are upsampled here.
pub struct SamV2 {
    encoder: Session,
    decoder: Session,
    preprocessor: Preprocessor,
    input_size: u32,
    mask_threshold: f32,
    features: Option<(ImageFeatures, Geometry)>,
}

impl SamV2 {
    pub fn new(config: &ModelConfig, device: Device) -> Result<Self> {
        config.check_files()?;

        let encoder = load_session(&config.encoder, config, device)?;
        let decoder = load_session(&config.decoder, config, device)?;

        tracing::info!("SAM 2 model loaded on device: {:?}", device);

        Ok(Self {
            encoder,
            decoder,
            preprocessor: Preprocessor::new(
                config.input_size,
                ResizeMode::Stretch,
                config.pixel_mean,
                config.pixel_std,
            ),
            input_size: config.input_size,
            mask_threshold: config.mask_threshold,
            features: None,
        })
    }
}

/// Decoder point list in input coordinates; SAM 2 takes no padding point
pub fn v2_points(prompts: &[PointPrompt], geometry: &Geometry) -> Vec<(f32, f32, f32)> {
    prompts
        .iter()
        .map(|p| {
            let (x, y) = geometry.transform_point(p.x, p.y);
            (x, y, p.label.as_f32())
        })
        .collect()
}

impl PromptSegmenter for SamV2 {
    fn set_image(&mut self, frame: &RgbImage) -> Result<()> {
        let _span = tracing::debug_span!("sam2_set_image").entered();

        let (input, geometry) = self.preprocessor.preprocess(frame)?;
        let side = self.input_size as usize;
        let image = Tensor::from_array(([1usize, 3, side, side], input.into_raw_vec()))?;

        let _infer_span = tracing::debug_span!("encode").entered();
        let outputs = self
            .encoder
            .run(ort::inputs!["image" => image])
            .context("Failed to run image encoder")?;
        let features = ImageFeatures {
            image_embed: OwnedTensor::extract(outputs.get("image_embed"), "image_embed")?,
            high_res_feats_0: OwnedTensor::extract(
                outputs.get("high_res_feats_0"),
                "high_res_feats_0",
            )?,
            high_res_feats_1: OwnedTensor::extract(
                outputs.get("high_res_feats_1"),
                "high_res_feats_1",
            )?,
        };
        drop(outputs);
        drop(_infer_span);

        self.features = Some((features, geometry));
        Ok(())
    }

    fn predict(&mut self, prompts: &[PointPrompt], options: PredictOptions) -> Result<Mask> {
        let _span = tracing::debug_span!("sam2_predict").entered();

        let (features, geometry) = self.features.as_ref().ok_or(Error::ImageNotSet)?;
        let geometry = *geometry;
        if prompts.is_empty() {
            return Err(Error::NoPrompts.into());
        }

        let prompt = PromptTensors::new(&v2_points(prompts, &geometry))?;

        let _infer_span = tracing::debug_span!("decode").entered();
        let outputs = self
            .decoder
            .run(ort::inputs![
                "image_embed" => features.image_embed.to_tensor()?,
                "high_res_feats_0" => features.high_res_feats_0.to_tensor()?,
                "high_res_feats_1" => features.high_res_feats_1.to_tensor()?,
                "point_coords" => prompt.coords,
                "point_labels" => prompt.labels,
                "mask_input" => prompt.mask_input,
                "has_mask_input" => prompt.has_mask_input
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
        self.features = None;
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn version(&self) -> ModelVersion {
        ModelVersion::V2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2_points_scale_each_axis() {
        let geometry = Geometry::new(ResizeMode::Stretch, 2048, 512, 1024);
        let prompts = vec![PointPrompt::foreground(1024.0, 256.0)];

        assert_eq!(v2_points(&prompts, &geometry), vec![(512.0, 512.0, 1.0)]);
    }

    #[test]
    fn test_missing_graphs_fail_before_loading() {
        let config = ModelConfig::preset(ModelVersion::V2, std::path::Path::new("/nonexistent"));
        assert!(SamV2::new(&config, Device::Cpu).is_err());
    }
}
