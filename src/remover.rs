//! The background removal seam used by the web layer
//!
//! Handlers only see [`BackgroundRemover`]: an image goes in, an RGBA image
//! with a transparent background comes out. [`ProcessorRemover`] is the
//! production implementation on top of [`BackgroundRemovalProcessor`].

use crate::{
    error::{BgRemovalError, Result},
    processor::BackgroundRemovalProcessor,
};
use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, Instrument};

/// Opaque background removal function
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Remove the background from `image`
    ///
    /// # Errors
    /// Any failure inside the removal; the caller renders the message.
    async fn remove(&self, image: DynamicImage) -> Result<RgbaImage>;

    /// Short human-readable description, used in logs and `/healthz`
    fn describe(&self) -> String;
}

/// Runs a [`BackgroundRemovalProcessor`] on the blocking thread pool
///
/// Concurrent calls serialize on the processor.
#[derive(Clone)]
pub struct ProcessorRemover {
    processor: Arc<Mutex<BackgroundRemovalProcessor>>,
    description: String,
}

impl ProcessorRemover {
    /// Wrap a processor
    #[must_use]
    pub fn new(processor: BackgroundRemovalProcessor) -> Self {
        let config = processor.config();
        let description = format!(
            "{} backend, model {}",
            config.backend_type,
            config.removal.model_spec.display_name()
        );
        Self {
            processor: Arc::new(Mutex::new(processor)),
            description,
        }
    }

    /// Load the model ahead of the first request
    ///
    /// # Errors
    /// - Backend creation or model loading failures
    pub async fn warm_up(&self) -> Result<()> {
        let processor = Arc::clone(&self.processor);
        tokio::task::spawn_blocking(move || {
            with_processor(&processor, "model loading", BackgroundRemovalProcessor::initialize)
        })
        .await
        .map_err(|e| BgRemovalError::internal(format!("model loading task failed: {e}")))?
    }
}

/// Run `work` on the locked processor, turning a panic into an error
///
/// A panic inside the backend leaves it in an unknown state, so it is
/// dropped and rebuilt on the next call. The lock is never poisoned because
/// the panic does not unwind through the guard.
fn with_processor<T>(
    processor: &Mutex<BackgroundRemovalProcessor>,
    stage: &str,
    work: impl FnOnce(&mut BackgroundRemovalProcessor) -> Result<T>,
) -> Result<T> {
    let mut guard = processor.lock().unwrap_or_else(PoisonError::into_inner);
    match panic::catch_unwind(AssertUnwindSafe(|| work(&mut guard))) {
        Ok(result) => result,
        Err(payload) => {
            guard.reset_backend();
            let message = panic_message(payload.as_ref());
            error!(stage, panic = %message, "Backend panicked; it will be reloaded on the next request");
            Err(BgRemovalError::internal(format!("{stage} panicked: {message}")))
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[async_trait]
impl BackgroundRemover for ProcessorRemover {
    async fn remove(&self, image: DynamicImage) -> Result<RgbaImage> {
        let processor = Arc::clone(&self.processor);
        let span = tracing::info_span!("remove_background");

        let result = tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            with_processor(&processor, "background removal", |processor| {
                processor.process_image(&image)
            })
        })
        .instrument(tracing::debug_span!("await_inference"))
        .await
        .map_err(|e| BgRemovalError::internal(format!("inference task failed: {e}")))??;

        debug!(summary = %result.timing_summary(), "Removal finished");
        Ok(result.into_image())
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
