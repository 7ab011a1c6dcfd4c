use crate::config::{Device, ModelConfig};
use crate::error::Error;
use anyhow::{Context, Result};
use ort::execution_providers::{
    CPUExecutionProvider, CUDAExecutionProvider, CoreMLExecutionProvider,
    ExecutionProviderDispatch, TensorRTExecutionProvider,
};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{DynValue, Tensor};
use std::path::Path;

/// Open an ONNX graph with the configured threads and execution providers
pub fn load_session(path: &Path, config: &ModelConfig, device: Device) -> Result<Session> {
    tracing::info!("Loading {} on {:?}", path.display(), device);

    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(config.intra_threads)?
        .with_execution_providers(execution_providers(device))?
        .commit_from_file(path)
        .with_context(|| format!("Failed to load model from {}", path.display()))?;

    tracing::debug!(
        "Graph inputs: {:?}",
        session.inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>()
    );

    Ok(session)
}

/// Providers in preference order; ONNX Runtime falls back down the list
fn execution_providers(device: Device) -> Vec<ExecutionProviderDispatch> {
    match device {
        Device::Cpu => vec![CPUExecutionProvider::default().build()],
        Device::Cuda => vec![
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ],
        Device::Tensorrt => vec![
            TensorRTExecutionProvider::default().build(),
            CUDAExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ],
        Device::Coreml => vec![
            CoreMLExecutionProvider::default().build(),
            CPUExecutionProvider::default().build(),
        ],
    }
}

/// f32 tensor copied out of a session so it outlives the run that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedTensor {
    pub shape: Vec<i64>,
    pub data: Vec<f32>,
}

impl OwnedTensor {
    /// Copy a named session output
    pub fn extract(value: Option<&DynValue>, name: &str) -> Result<Self> {
        let value = value
            .ok_or_else(|| Error::UnexpectedOutput(format!("graph has no output named {name}")))?;
        let (shape, data) = value
            .try_extract_tensor::<f32>()
            .with_context(|| format!("Failed to read output {name}"))?;

        Ok(Self {
            shape: shape.to_vec(),
            data: data.to_vec(),
        })
    }

    pub fn to_tensor(&self) -> Result<Tensor<f32>> {
        Ok(Tensor::from_array((self.shape.clone(), self.data.clone()))?)
    }

    /// Trailing `(height, width)` of a `[.., H, W]` tensor
    pub fn spatial(&self) -> Result<(u32, u32)> {
        match self.shape.as_slice() {
            [.., h, w] if *h > 0 && *w > 0 => Ok((*h as u32, *w as u32)),
            other => Err(Error::UnexpectedOutput(format!(
                "expected a spatial tensor, got shape {:?}",
                other
            ))
            .into()),
        }
    }

    /// The `index`-th `[H, W]` plane of a `[1, K, H, W]` tensor
    pub fn plane(&self, index: usize) -> Result<&[f32]> {
        let (h, w) = self.spatial()?;
        let size = (h * w) as usize;
        let start = index * size;
        self.data.get(start..start + size).ok_or_else(|| {
            Error::UnexpectedOutput(format!(
                "mask index {} out of range for shape {:?}",
                index, self.shape
            ))
            .into()
        })
    }
}

/// Decoder prompt tensors shared by both model generations
pub struct PromptTensors {
    pub coords: Tensor<f32>,
    pub labels: Tensor<f32>,
    pub mask_input: Tensor<f32>,
    pub has_mask_input: Tensor<f32>,
}

impl PromptTensors {
    /// `points` are already in encoder input coordinates
    pub fn new(points: &[(f32, f32, f32)]) -> Result<Self> {
        let n = points.len();
        let coords: Vec<f32> = points.iter().flat_map(|(x, y, _)| [*x, *y]).collect();
        let labels: Vec<f32> = points.iter().map(|(_, _, label)| *label).collect();

        Ok(Self {
            coords: Tensor::from_array(([1usize, n, 2], coords))?,
            labels: Tensor::from_array(([1usize, n], labels))?,
            mask_input: Tensor::from_array(([1usize, 1, 256, 256], vec![0.0f32; 256 * 256]))?,
            has_mask_input: Tensor::from_array(([1usize], vec![0.0f32]))?,
        })
    }
}
