//! Model configuration

use crate::error::Error;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Segment Anything generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelVersion {
    /// SAM (ViT image encoder)
    V1,
    /// SAM 2 / 2.1 (Hiera image encoder)
    V2,
}

/// ONNX Runtime execution provider to run the graphs on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
    Tensorrt,
    /// Apple Neural Engine / GPU through CoreML (macOS builds)
    Coreml,
}

/// Encoder/decoder graphs plus the preprocessing constants they were exported with
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    pub version: ModelVersion,
    /// Image encoder graph
    pub encoder: PathBuf,
    /// Prompt/mask decoder graph
    pub decoder: PathBuf,
    /// Square side of the encoder input
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// Logit threshold above which a pixel belongs to the mask
    #[serde(default)]
    pub mask_threshold: f32,
    /// Per-channel mean in 0-255 pixel units
    #[serde(default = "default_pixel_mean")]
    pub pixel_mean: [f32; 3],
    /// Per-channel std in 0-255 pixel units
    #[serde(default = "default_pixel_std")]
    pub pixel_std: [f32; 3],
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

fn default_input_size() -> u32 {
    1024
}

fn default_pixel_mean() -> [f32; 3] {
    [123.675, 116.28, 103.53]
}

fn default_pixel_std() -> [f32; 3] {
    [58.395, 57.12, 57.375]
}

fn default_intra_threads() -> usize {
    4
}

impl ModelConfig {
    /// Build the default configuration for a checkpoint directory
    ///
    /// v1 expects `sam_vit_h.encoder.onnx` / `sam_vit_h.decoder.onnx`,
    /// v2 expects `sam2.1_hiera_base_plus.encoder.onnx` / `.decoder.onnx`.
    pub fn preset(version: ModelVersion, checkpoint_dir: &Path) -> Self {
        let stem = match version {
            ModelVersion::V1 => "sam_vit_h",
            ModelVersion::V2 => "sam2.1_hiera_base_plus",
        };

        Self {
            version,
            encoder: checkpoint_dir.join(format!("{stem}.encoder.onnx")),
            decoder: checkpoint_dir.join(format!("{stem}.decoder.onnx")),
            input_size: default_input_size(),
            mask_threshold: 0.0,
            pixel_mean: default_pixel_mean(),
            pixel_std: default_pixel_std(),
            intra_threads: default_intra_threads(),
        }
    }

    /// Load a TOML configuration file
    ///
    /// Relative graph paths are resolved against the directory holding the file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model config {}", path.display()))?;

        let mut config: ModelConfig = toml::from_str(&text)
            .with_context(|| format!("Failed to parse model config {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.encoder = resolve(base, &config.encoder);
        config.decoder = resolve(base, &config.decoder);

        config.validate()?;

        tracing::info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Error> {
        if self.encoder.as_os_str().is_empty() || self.decoder.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "encoder and decoder paths must be set".to_string(),
            ));
        }

        if !(64..=4096).contains(&self.input_size) || self.input_size % 16 != 0 {
            return Err(Error::InvalidConfig(format!(
                "input_size must be a multiple of 16 between 64 and 4096, got {}",
                self.input_size
            )));
        }

        if self.pixel_std.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(Error::InvalidConfig(
                "pixel_std entries must be finite and non-zero".to_string(),
            ));
        }

        if !self.mask_threshold.is_finite() {
            return Err(Error::InvalidConfig("mask_threshold must be finite".to_string()));
        }

        if self.intra_threads == 0 {
            return Err(Error::InvalidConfig("intra_threads must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Make sure both graphs exist before any session is built
    pub fn check_files(&self) -> Result<(), Error> {
        for path in [&self.encoder, &self.decoder] {
            if !path.is_file() {
                return Err(Error::MissingModelFile(path.clone()));
            }
        }
        Ok(())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_preset_file_names() {
        let v1 = ModelConfig::preset(ModelVersion::V1, Path::new("checkpoints"));
        assert_eq!(v1.encoder, PathBuf::from("checkpoints/sam_vit_h.encoder.onnx"));
        assert_eq!(v1.decoder, PathBuf::from("checkpoints/sam_vit_h.decoder.onnx"));

        let v2 = ModelConfig::preset(ModelVersion::V2, Path::new("checkpoints"));
        assert_eq!(
            v2.encoder,
            PathBuf::from("checkpoints/sam2.1_hiera_base_plus.encoder.onnx")
        );
        assert_eq!(v2.input_size, 1024);
        assert!(v2.validate().is_ok());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sam2.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
version = "v2"
encoder = "graphs/encoder.onnx"
decoder = "/abs/decoder.onnx"
mask_threshold = 0.5
"#
        )
        .unwrap();

        let config = ModelConfig::load(&path).unwrap();
        assert_eq!(config.version, ModelVersion::V2);
        assert_eq!(config.encoder, dir.path().join("graphs/encoder.onnx"));
        assert_eq!(config.decoder, PathBuf::from("/abs/decoder.onnx"));
        assert_eq!(config.mask_threshold, 0.5);
        assert_eq!(config.input_size, 1024);
        assert_eq!(config.pixel_mean, default_pixel_mean());
        assert_eq!(config.intra_threads, 4);
    }

    #[test]
    fn test_shipped_configs_parse() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs");

        let v1 = ModelConfig::load(dir.join("sam_vit_h.toml")).unwrap();
        assert_eq!(v1.version, ModelVersion::V1);
        assert!(v1.encoder.ends_with("checkpoints/sam_vit_h.encoder.onnx"));

        let v2 = ModelConfig::load(dir.join("sam2.1_hiera_b+.toml")).unwrap();
        assert_eq!(v2.version, ModelVersion::V2);
        assert_eq!(v2.pixel_std, default_pixel_std());
    }

    #[test]
    fn test_load_missing_file() {
        let err = ModelConfig::load("/nonexistent/model.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/model.toml"));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "version = \"v3\"\nencoder = \"e\"\ndecoder = \"d\"\n").unwrap();
        assert!(ModelConfig::load(&path).is_err());
    }

    #[test]
    fn test_validation_input_size() {
        let mut config = ModelConfig::preset(ModelVersion::V1, Path::new("."));
        config.input_size = 1000;
        assert!(config.validate().is_err());

        config.input_size = 32;
        assert!(config.validate().is_err());

        config.input_size = 512;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_zero_std() {
        let mut config = ModelConfig::preset(ModelVersion::V1, Path::new("."));
        config.pixel_std = [58.0, 0.0, 57.0];
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validation_threads() {
        let mut config = ModelConfig::preset(ModelVersion::V2, Path::new("."));
        config.intra_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_check_files_reports_missing_graph() {
        let dir = tempfile::tempdir().unwrap();
        let config = ModelConfig::preset(ModelVersion::V1, dir.path());
        std::fs::write(&config.encoder, b"onnx").unwrap();

        match config.check_files() {
            Err(Error::MissingModelFile(path)) => assert_eq!(path, config.decoder),
            other => panic!("Expected MissingModelFile, got {:?}", other),
        }

        std::fs::write(&config.decoder, b"onnx").unwrap();
        assert!(config.check_files().is_ok());
    }
}
