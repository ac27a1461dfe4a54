//! Mock backend for tests and demo mode
//!
//! Produces a deterministic mask without any model file: a pixel is foreground
//! when its normalized RGB mean is above zero, which with the `ISNet`
//! normalization means "brighter than mid-grey".

use crate::config::RemovalConfig;
use crate::error::{BgRemovalError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelPreset, PreprocessingConfig};
use instant::Duration;
use ndarray::Array4;

/// Mock backend for testing without requiring actual model files
#[derive(Debug, Clone)]
pub struct MockBackend {
    target_size: usize,
    failure: Option<String>,
    initialized: bool,
}

impl MockBackend {
    /// Create a new mock backend using the default 1024px input
    #[must_use]
    pub fn new() -> Self {
        Self::with_target_size(1024)
    }

    /// Create a mock backend with a smaller square input, handy for fast tests
    #[must_use]
    pub fn with_target_size(target_size: usize) -> Self {
        Self {
            target_size: target_size.max(1),
            failure: None,
            initialized: false,
        }
    }

    /// Create a mock backend whose inference always fails with `message`
    #[must_use]
    pub fn failing<S: Into<String>>(message: S) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::with_target_size(32)
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::ZERO))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if let Some(message) = &self.failure {
            return Err(BgRemovalError::inference(message.clone()));
        }

        let (n, c, h, w) = input.dim();
        if c != 3 {
            return Err(BgRemovalError::inference(format!(
                "Mock backend expects 3 input channels, got {c}"
            )));
        }

        let mut output = Array4::<f32>::zeros((n, 1, h, w));
        for ((batch, _, y, x), value) in output.indexed_iter_mut() {
            let sum: f32 = (0..3)
                .filter_map(|channel| input.get([batch, channel, y, x]))
                .sum();
            *value = if sum / 3.0 > 0.0 { 1.0 } else { 0.0 };
        }

        Ok(output)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, self.target_size, self.target_size)
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        (1, 1, self.target_size, self.target_size)
    }

    fn get_preprocessing_config(&self) -> Result<PreprocessingConfig> {
        let size = self.target_size as u32;
        Ok(PreprocessingConfig {
            target_size: [size, size],
            ..ModelPreset::Isnet.preprocessing()
        })
    }

    fn get_model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "Mock Backend".to_string(),
            precision: "mock".to_string(),
            size_bytes: 0,
            input_shape: self.input_shape(),
            output_shape: self.output_shape(),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
