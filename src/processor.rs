//! Background removal processor
//!
//! `BackgroundRemovalProcessor` owns one inference backend and runs the whole
//! pipeline for a decoded image: letterbox preprocessing, inference, mapping
//! the output tensor back to a mask in original coordinates, and alpha
//! compositing.

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
    models::ModelSpec,
    types::{ProcessingMetadata, ProcessingTimings, RemovalResult, SegmentationMask},
    utils::{ImagePreprocessor, Letterbox},
};
use image::DynamicImage;
use instant::Instant;
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Backend type enumeration for runtime selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
    /// Deterministic mock backend, no model file required
    Mock,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type for the given model
    ///
    /// # Errors
    /// - Backend type not compiled in
    /// - Model file missing or invalid
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_spec: &ModelSpec,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Backend factory covering every backend enabled at compile time
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_spec: &ModelSpec,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => {
                let model_manager = crate::models::ModelManager::from_spec(model_spec)?;
                Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                    model_manager,
                )))
            },
            #[cfg(feature = "tract")]
            BackendType::Tract => {
                let model_manager = crate::models::ModelManager::from_spec(model_spec)?;
                Ok(Box::new(crate::backends::TractBackend::with_model_manager(
                    model_manager,
                )))
            },
            BackendType::Mock => Ok(Box::new(crate::backends::MockBackend::new())),
            #[allow(unreachable_patterns)]
            other => Err(BgRemovalError::invalid_config(format!(
                "Backend '{other}' is not compiled into this build"
            ))),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends.push(BackendType::Mock);
        backends
    }
}

/// Configuration for the background removal processor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorConfig {
    /// Backend type to use for inference
    pub backend_type: BackendType,
    /// Model, execution provider and threading options
    pub removal: RemovalConfig,
}

impl ProcessorConfig {
    /// Create a new processor configuration builder
    #[must_use]
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::default()
    }
}

/// Builder for `ProcessorConfig`
#[derive(Debug, Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    /// Set backend type
    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    /// Set the inference configuration
    #[must_use]
    pub fn removal_config(mut self, removal: RemovalConfig) -> Self {
        self.config.removal = removal;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - ONNX or Tract backend selected without a model path
    pub fn build(self) -> Result<ProcessorConfig> {
        let needs_model = matches!(
            self.config.backend_type,
            BackendType::Onnx | BackendType::Tract
        );
        if needs_model && self.config.removal.model_spec.path.is_none() {
            return Err(BgRemovalError::invalid_config(format!(
                "The {} backend requires a model path",
                self.config.backend_type
            )));
        }
        Ok(self.config)
    }
}

/// Runs the background removal pipeline on decoded images
pub struct BackgroundRemovalProcessor {
    config: ProcessorConfig,
    backend_factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn InferenceBackend>>,
    model_name: String,
    pending_model_load_ms: u64,
}

impl BackgroundRemovalProcessor {
    /// Create a new processor with the default backend factory
    #[must_use]
    pub fn new(config: ProcessorConfig) -> Self {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    /// Create a new processor with a custom backend factory
    #[must_use]
    pub fn with_factory(config: ProcessorConfig, backend_factory: Box<dyn BackendFactory>) -> Self {
        Self {
            config,
            backend_factory,
            backend: None,
            model_name: String::new(),
            pending_model_load_ms: 0,
        }
    }

    /// Create a processor around an already constructed backend
    #[must_use]
    pub fn with_backend(config: ProcessorConfig, backend: Box<dyn InferenceBackend>) -> Self {
        let mut processor = Self::new(config);
        processor.backend = Some(backend);
        processor
    }

    /// Create the backend if needed and load its model
    ///
    /// # Errors
    /// - Backend creation failures
    /// - Model loading errors
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        info!(
            backend = %self.config.backend_type,
            model = %self.config.removal.model_spec.display_name(),
            provider = %self.config.removal.execution_provider,
            "Initializing background removal processor"
        );

        let mut backend = match self.backend.take() {
            Some(backend) => backend,
            None => self
                .backend_factory
                .create_backend(self.config.backend_type, &self.config.removal.model_spec)?,
        };

        // Keep the backend even on failure so a later call can retry the load
        let load_result = backend.initialize(&self.config.removal);
        let model_info = backend.get_model_info();
        self.backend = Some(backend);

        if let Some(load_time) = load_result? {
            self.pending_model_load_ms = u64::try_from(load_time.as_millis()).unwrap_or(u64::MAX);
        }
        self.model_name = model_info.map_or_else(|_| "unknown".to_string(), |info| info.name);

        info!(model = %self.model_name, "Background removal processor initialized");
        Ok(())
    }

    /// Remove the background from a decoded image
    ///
    /// # Errors
    /// - Backend initialization failures
    /// - Preprocessing, inference or mask generation errors
    #[instrument(
        skip(self, image),
        fields(
            backend = %self.config.backend_type,
            width = image.width(),
            height = image.height()
        )
    )]
    pub fn process_image(&mut self, image: &DynamicImage) -> Result<RemovalResult> {
        self.initialize()?;

        let total_start = Instant::now();
        let mut timings = ProcessingTimings {
            model_load_ms: std::mem::take(&mut self.pending_model_load_ms),
            ..ProcessingTimings::default()
        };
        let original_dimensions = (image.width(), image.height());

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| BgRemovalError::internal("Backend not initialized"))?;

        let preprocess_start = Instant::now();
        let preprocessing_config = backend.get_preprocessing_config()?;
        let (input_tensor, letterbox) =
            ImagePreprocessor::preprocess_for_inference(image, &preprocessing_config)?;
        timings.preprocessing_ms = elapsed_ms(preprocess_start);
        debug!(shape = ?input_tensor.dim(), "Preprocessed input tensor");

        let inference_start = Instant::now();
        let output_tensor = backend.infer(&input_tensor)?;
        timings.inference_ms = elapsed_ms(inference_start);

        let postprocess_start = Instant::now();
        let mask = tensor_to_mask(&output_tensor, original_dimensions, &letterbox)?;
        let mut result_image = image.to_rgba8();
        mask.apply_to_image(&mut result_image)?;
        timings.postprocessing_ms = elapsed_ms(postprocess_start);
        timings.total_ms = elapsed_ms(total_start);

        let mut metadata =
            ProcessingMetadata::new(self.model_name.clone(), self.config.backend_type.to_string());
        metadata.mask_statistics = Some(mask.statistics());
        metadata.timings = timings;

        let result = RemovalResult::new(result_image, mask, original_dimensions, metadata);
        info!(timings = %result.timing_summary(), "Background removed");
        Ok(result)
    }

    /// Get the current configuration
    #[must_use]
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Check if the backend has been created and loaded
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.backend
            .as_ref()
            .is_some_and(|backend| backend.is_initialized())
    }

    /// Drop the backend so the next call builds and loads a fresh one
    ///
    /// Used after a panic inside the backend left it in an unknown state.
    pub fn reset_backend(&mut self) {
        self.backend = None;
        self.pending_model_load_ms = 0;
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Map an `[1, 1, H, W]` output tensor back to a mask over the original image
///
/// Each original pixel is projected through the letterbox onto the model
/// canvas and from there onto the output grid, which may differ in size from
/// the input canvas.
///
/// # Errors
/// - Tensor shape is not `[1, 1, H, W]` with non-zero spatial size
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn tensor_to_mask(
    tensor: &Array4<f32>,
    original_dimensions: (u32, u32),
    letterbox: &Letterbox,
) -> Result<SegmentationMask> {
    let (batch, channels, mask_height, mask_width) = tensor.dim();
    if batch != 1 || channels != 1 || mask_height == 0 || mask_width == 0 {
        return Err(BgRemovalError::processing_stage_error(
            "mask generation",
            "invalid output tensor shape",
            Some(&format!("{:?}", tensor.shape())),
        ));
    }

    let (orig_width, orig_height) = original_dimensions;
    let target = letterbox.target_size as usize;
    let mut mask_data = Vec::with_capacity(orig_width as usize * orig_height as usize);

    for y in 0..orig_height {
        for x in 0..orig_width {
            let (canvas_x, canvas_y) = letterbox.to_canvas(x, y);
            let tensor_x = (canvas_x as usize * mask_width / target).min(mask_width - 1);
            let tensor_y = (canvas_y as usize * mask_height / target).min(mask_height - 1);
            let value = tensor
                .get([0, 0, tensor_y, tensor_x])
                .copied()
                .unwrap_or(0.0);
            mask_data.push((value.clamp(0.0, 1.0) * 255.0).round() as u8);
        }
    }

    Ok(SegmentationMask::new(mask_data, original_dimensions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockBackend;
    use crate::models::ModelPreset;
    use image::{Rgb, RgbImage, Rgba};

    fn mock_processor(target_size: usize) -> BackgroundRemovalProcessor {
        let config = ProcessorConfig::builder()
            .backend_type(BackendType::Mock)
            .build()
            .unwrap();
        BackgroundRemovalProcessor::with_backend(
            config,
            Box::new(MockBackend::with_target_size(target_size)),
        )
    }

    /// Left half white, right half black
    fn split_image(width: u32, height: u32) -> DynamicImage {
        let image = RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([250, 250, 250])
            } else {
                Rgb([5, 5, 5])
            }
        });
        DynamicImage::ImageRgb8(image)
    }

    #[test]
    fn test_processor_config_requires_model_for_onnx() {
        let result = ProcessorConfig::builder()
            .backend_type(BackendType::Onnx)
            .build();
        assert!(matches!(result, Err(BgRemovalError::InvalidConfig(_))));

        let removal = RemovalConfig::builder()
            .model_spec(ModelSpec::new("model.onnx", ModelPreset::Isnet))
            .build()
            .unwrap();
        let config = ProcessorConfig::builder()
            .backend_type(BackendType::Tract)
            .removal_config(removal)
            .build()
            .unwrap();
        assert_eq!(config.backend_type, BackendType::Tract);
    }

    #[test]
    fn test_mock_pipeline_keeps_bright_half() {
        let mut processor = mock_processor(64);
        let result = processor.process_image(&split_image(40, 20)).unwrap();

        assert_eq!(result.dimensions(), (40, 20));
        assert_eq!(result.original_dimensions, (40, 20));
        assert_eq!(result.image.get_pixel(2, 10), &Rgba([250, 250, 250, 255]));
        assert_eq!(result.image.get_pixel(37, 10), &Rgba([0, 0, 0, 0]));

        let stats = result.metadata.mask_statistics.unwrap();
        assert_eq!(stats.foreground_pixels, stats.background_pixels);
        assert_eq!(result.metadata.backend, "mock");
    }

    #[test]
    fn test_model_load_time_reported_once() {
        let mut processor = mock_processor(16);
        assert!(!processor.is_initialized());
        processor.process_image(&split_image(8, 8)).unwrap();
        assert!(processor.is_initialized());
        let second = processor.process_image(&split_image(8, 8)).unwrap();
        assert_eq!(second.timings().model_load_ms, 0);
    }

    #[test]
    fn test_default_factory_lists_compiled_backends() {
        let backends = DefaultBackendFactory.available_backends();
        assert_eq!(backends.last(), Some(&BackendType::Mock));
        assert_eq!(backends.contains(&BackendType::Onnx), cfg!(feature = "onnx"));
        assert_eq!(backends.contains(&BackendType::Tract), cfg!(feature = "tract"));
    }

    #[test]
    fn test_reset_backend_rebuilds_from_factory() {
        let config = ProcessorConfig::builder()
            .backend_type(BackendType::Mock)
            .build()
            .unwrap();
        let mut processor =
            BackgroundRemovalProcessor::with_backend(config, Box::new(MockBackend::failing("stale")));
        assert!(processor.process_image(&split_image(4, 4)).is_err());

        processor.reset_backend();
        assert!(!processor.is_initialized());
        assert!(processor.process_image(&split_image(4, 4)).is_ok());
    }

    #[test]
    fn test_inference_error_propagates() {
        let mut processor = BackgroundRemovalProcessor::with_backend(
            ProcessorConfig::default(),
            Box::new(MockBackend::failing("no luck")),
        );
        let err = processor.process_image(&split_image(4, 4)).unwrap_err();
        assert!(matches!(err, BgRemovalError::Inference(_)));
    }

    #[test]
    fn test_tensor_to_mask_inverse_letterbox() {
        // 4x2 image on an 8x8 canvas: scale 2, offset_y 2
        let letterbox = Letterbox::compute((4, 2), 8).unwrap();
        let mut tensor = Array4::<f32>::zeros((1, 1, 8, 8));
        for x in 0..8 {
            tensor[[0, 0, 2, x]] = 1.0;
        }
        let mask = tensor_to_mask(&tensor, (4, 2), &letterbox).unwrap();

        assert_eq!(mask.dimensions, (4, 2));
        assert_eq!(&mask.data[..4], &[255, 255, 255, 255]);
        assert_eq!(&mask.data[4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_tensor_to_mask_scales_smaller_output() {
        let letterbox = Letterbox::compute((4, 4), 8).unwrap();
        let tensor = Array4::<f32>::from_elem((1, 1, 4, 4), 0.5);
        let mask = tensor_to_mask(&tensor, (4, 4), &letterbox).unwrap();
        assert!(mask.data.iter().all(|&value| value == 128));
    }

    #[test]
    fn test_tensor_to_mask_rejects_bad_shape() {
        let letterbox = Letterbox::compute((4, 4), 8).unwrap();
        let tensor = Array4::<f32>::zeros((1, 3, 8, 8));
        assert!(tensor_to_mask(&tensor, (4, 4), &letterbox).is_err());
    }
}
