mod preprocess;
mod sam;
mod sam2;
mod session;
pub mod types;

pub use types::{Mask, PointLabel, PointPrompt, PredictOptions, PromptSegmenter, PromptSet};

use sam::SamV1;
use sam2::SamV2;

use crate::config::{Device, ModelConfig, ModelVersion};
use anyhow::Result;

/// Create the segmenter matching the configured model generation
pub fn create_model(config: &ModelConfig, device: Device) -> Result<Box<dyn PromptSegmenter>> {
    let model: Box<dyn PromptSegmenter> = match config.version {
        ModelVersion::V1 => Box::new(SamV1::new(config, device)?),
        ModelVersion::V2 => Box::new(SamV2::new(config, device)?),
    };
    Ok(model)
}
