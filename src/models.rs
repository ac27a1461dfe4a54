//! Model location and preprocessing metadata
//!
//! A model is either a bare `.onnx` file, whose preprocessing comes from a
//! [`ModelPreset`], or a directory holding a `model.json` descriptor next to
//! the ONNX file:
//!
//! ```json
//! {
//!   "name": "isnet-general-use",
//!   "file": "model.onnx",
//!   "preprocessing": {
//!     "target_size": [1024, 1024],
//!     "normalization": { "mean": [0.5, 0.5, 0.5], "std": [1.0, 1.0, 1.0] }
//!   }
//! }
//! ```

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Preprocessing parameters for a segmentation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Square input size expected by the model, `[width, height]`
    pub target_size: [u32; 2],
    /// Per-channel mean subtracted after scaling to 0-1
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation divided after mean subtraction
    pub normalization_std: [f32; 3],
}

/// Built-in preprocessing presets for common pretrained models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelPreset {
    /// `ISNet` general-use (1024px, mean 0.5, std 1.0)
    #[default]
    Isnet,
    /// U²-Net (320px, `ImageNet` statistics)
    U2net,
    /// `InSPyReNet` (1024px, `ImageNet` statistics)
    Inspyrenet,
}

impl ModelPreset {
    const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
    const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

    #[must_use]
    pub fn preprocessing(self) -> PreprocessingConfig {
        match self {
            Self::Isnet => PreprocessingConfig {
                target_size: [1024, 1024],
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
            Self::U2net => PreprocessingConfig {
                target_size: [320, 320],
                normalization_mean: Self::IMAGENET_MEAN,
                normalization_std: Self::IMAGENET_STD,
            },
            Self::Inspyrenet => PreprocessingConfig {
                target_size: [1024, 1024],
                normalization_mean: Self::IMAGENET_MEAN,
                normalization_std: Self::IMAGENET_STD,
            },
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Isnet => "isnet",
            Self::U2net => "u2net",
            Self::Inspyrenet => "inspyrenet",
        }
    }
}

impl std::fmt::Display for ModelPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Complete model specification: where the weights live and how to feed them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelSpec {
    /// `.onnx` file or directory containing `model.json`; `None` for backends without weights
    pub path: Option<PathBuf>,
    /// Preprocessing used when the path carries no `model.json`
    pub preset: ModelPreset,
}

impl ModelSpec {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P, preset: ModelPreset) -> Self {
        Self {
            path: Some(path.into()),
            preset,
        }
    }

    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match &self.path {
            Some(path) => format!(
                "{}:{}",
                self.preset,
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
            None => format!("{}:none", self.preset),
        }
    }
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub precision: String,
    pub size_bytes: usize,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

#[derive(Debug, Deserialize)]
struct ModelDescriptor {
    name: String,
    #[serde(default = "ModelDescriptor::default_file")]
    file: String,
    #[serde(default)]
    precision: Option<String>,
    preprocessing: DescriptorPreprocessing,
}

impl ModelDescriptor {
    fn default_file() -> String {
        "model.onnx".to_string()
    }
}

#[derive(Debug, Deserialize)]
struct DescriptorPreprocessing {
    target_size: [u32; 2],
    normalization: DescriptorNormalization,
}

#[derive(Debug, Deserialize)]
struct DescriptorNormalization {
    mean: [f32; 3],
    std: [f32; 3],
}

/// Resolved model: ONNX file path, display name and preprocessing
#[derive(Debug, Clone)]
pub struct ModelManager {
    model_path: PathBuf,
    name: String,
    precision: String,
    preprocessing: PreprocessingConfig,
}

impl ModelManager {
    /// Resolve a model specification
    ///
    /// # Errors
    /// - Spec has no path
    /// - Path does not exist
    /// - Directory without a readable, valid `model.json`
    /// - Invalid preprocessing values
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        let path = spec.path.as_ref().ok_or_else(|| {
            BgRemovalError::invalid_config("No model path configured. Use --model <path>")
        })?;

        if !path.exists() {
            return Err(BgRemovalError::model_error_with_context(
                "locate",
                path,
                "path does not exist",
                &["check the --model argument", "download an ONNX model first"],
            ));
        }

        let manager = if path.is_dir() {
            Self::from_directory(path)?
        } else {
            Self::from_file(path, spec.preset)
        };

        validate_preprocessing(&manager.preprocessing)?;
        Ok(manager)
    }

    fn from_file(path: &Path, preset: ModelPreset) -> Self {
        let name = path
            .file_stem()
            .map_or_else(|| preset.name().to_string(), |s| s.to_string_lossy().into_owned());
        Self {
            model_path: path.to_path_buf(),
            name,
            precision: "fp32".to_string(),
            preprocessing: preset.preprocessing(),
        }
    }

    fn from_directory(dir: &Path) -> Result<Self> {
        let descriptor_path = dir.join("model.json");
        let content = fs::read_to_string(&descriptor_path)
            .map_err(|e| BgRemovalError::file_io_error("read model descriptor", &descriptor_path, &e))?;
        let descriptor: ModelDescriptor = serde_json::from_str(&content).map_err(|e| {
            BgRemovalError::invalid_config(format!("Failed to parse model.json: {e}"))
        })?;

        let model_path = dir.join(&descriptor.file);
        if !model_path.is_file() {
            return Err(BgRemovalError::model_error_with_context(
                "locate",
                &model_path,
                "model file named in model.json is missing",
                &["check the \"file\" field in model.json"],
            ));
        }

        Ok(Self {
            model_path,
            name: descriptor.name,
            precision: descriptor.precision.unwrap_or_else(|| "fp32".to_string()),
            preprocessing: PreprocessingConfig {
                target_size: descriptor.preprocessing.target_size,
                normalization_mean: descriptor.preprocessing.normalization.mean,
                normalization_std: descriptor.preprocessing.normalization.std,
            },
        })
    }

    /// Load model data as bytes
    ///
    /// # Errors
    /// - File I/O errors when reading the model
    pub fn load_model(&self) -> Result<Vec<u8>> {
        fs::read(&self.model_path)
            .map_err(|e| BgRemovalError::file_io_error("read model file", &self.model_path, &e))
    }

    /// Get model information
    ///
    /// # Errors
    /// - Model file metadata cannot be read
    pub fn get_info(&self) -> Result<ModelInfo> {
        let size_bytes = fs::metadata(&self.model_path)
            .map_err(|e| BgRemovalError::file_io_error("stat model file", &self.model_path, &e))?
            .len() as usize;
        let [width, height] = self.preprocessing.target_size;
        Ok(ModelInfo {
            name: self.name.clone(),
            precision: self.precision.clone(),
            size_bytes,
            input_shape: (1, 3, height as usize, width as usize),
            output_shape: (1, 1, height as usize, width as usize),
        })
    }

    #[must_use]
    pub fn get_preprocessing_config(&self) -> PreprocessingConfig {
        self.preprocessing.clone()
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn validate_preprocessing(config: &PreprocessingConfig) -> Result<()> {
    let [width, height] = config.target_size;
    if width == 0 || height == 0 || width > 4096 || height > 4096 {
        return Err(BgRemovalError::invalid_config(format!(
            "target_size must be within 1-4096, got [{width}, {height}]"
        )));
    }
    if width != height {
        return Err(BgRemovalError::invalid_config(format!(
            "only square model inputs are supported, got [{width}, {height}]"
        )));
    }
    if config.normalization_std.iter().any(|s| *s <= 0.0) {
        return Err(BgRemovalError::invalid_config(
            "normalization std values must be positive",
        ));
    }
    Ok(())
}
