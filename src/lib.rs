#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! # Background Removal Web App
//!
//! A single-page web application that removes the background from an
//! uploaded image with a pretrained segmentation model and hands the result
//! back as a transparent PNG named `removed_background.png`.
//!
//! ## Features
//!
//! - **Multiple Backends**: ONNX Runtime (GPU acceleration) and Tract (pure Rust)
//! - **Hardware Acceleration**: CUDA, `CoreML`, and CPU execution providers
//! - **Model Presets**: `ISNet`, U²-Net and `InSPyReNet` preprocessing, or a `model.json` descriptor
//! - **Two Page Variants**: tabbed `studio` page and single-column `classic` page
//! - **Per-browser Sessions**: cookie-keyed upload and result state with expiry
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_web::{
//!     web, BackendType, BackgroundRemovalProcessor, ModelPreset, ModelSpec, ProcessorConfig,
//!     ProcessorRemover, RemovalConfig, ServerConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let removal = RemovalConfig::builder()
//!     .model_spec(ModelSpec::new("models/isnet.onnx", ModelPreset::Isnet))
//!     .build()?;
//! let processor = BackgroundRemovalProcessor::new(
//!     ProcessorConfig::builder()
//!         .backend_type(BackendType::Onnx)
//!         .removal_config(removal)
//!         .build()?,
//! );
//!
//! let remover = ProcessorRemover::new(processor);
//! remover.warm_up().await?;
//! web::serve(ServerConfig::default(), Arc::new(remover)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend
//! - `cli` (default): `bgremove-web` binary flags and subscriber setup
//! - `tracing-json`: JSON log output
//! - `tracing-files`: log file output

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod models;
pub mod processor;
pub mod remover;
pub mod services;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;
pub mod web;

// Public API exports
pub use backends::*;
pub use config::{ExecutionProvider, RemovalConfig, ServerConfig};
pub use error::{BgRemovalError, Result};
pub use inference::InferenceBackend;
pub use models::{ModelManager, ModelPreset, ModelSpec, PreprocessingConfig};
pub use processor::{
    BackendFactory, BackendType, BackgroundRemovalProcessor, DefaultBackendFactory,
    ProcessorConfig, ProcessorConfigBuilder,
};
pub use remover::{BackgroundRemover, ProcessorRemover};
pub use services::{
    DownloadArtifact, InputFormat, OutputFormatHandler, UploadPolicy, UploadedImage,
    DOWNLOAD_FILE_NAME, DOWNLOAD_MIME_TYPE,
};
pub use session::{SessionId, SessionStore};
pub use types::{ProcessingMetadata, ProcessingTimings, RemovalResult, SegmentationMask};
pub use utils::{ImagePreprocessor, Letterbox};
pub use web::{router, AppState, AppVariant};

#[cfg(feature = "cli")]
pub use tracing_config::{TracingConfig, TracingFormat, TracingGuard, TracingOutput};

/// Remove the background from encoded image bytes and encode the result as PNG
///
/// This is the same path the web page takes for one upload, without the
/// session and page around it.
///
/// # Examples
///
/// ```rust,no_run
/// use bgremove_web::{remove_background_from_bytes, BackgroundRemover};
///
/// # async fn example(remover: &dyn BackgroundRemover, upload: Vec<u8>) -> anyhow::Result<()> {
/// let artifact = remove_background_from_bytes(&upload, remover).await?;
/// std::fs::write(artifact.file_name, &artifact.bytes)?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    remover: &dyn BackgroundRemover,
) -> Result<DownloadArtifact> {
    let image = image::load_from_memory(image_bytes)?;
    let result = remover.remove(image).await?;
    tokio::task::spawn_blocking(move || OutputFormatHandler::encode_png(&result))
        .await
        .map_err(|e| BgRemovalError::internal(format!("png encoding task failed: {e}")))?
}

/// Remove the background from a decoded image with a fresh processor
///
/// Loads the model on every call; long-running callers should keep a
/// [`BackgroundRemovalProcessor`] or [`ProcessorRemover`] instead.
pub fn remove_background_from_image(
    image: &image::DynamicImage,
    config: ProcessorConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(config);
    processor.process_image(image)
}
