//! Core types for background removal operations

use crate::error::{BgRemovalError, Result};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// The processed image with the background made transparent
    pub image: RgbaImage,

    /// The segmentation mask used for removal
    pub mask: SegmentationMask,

    /// Original image dimensions
    pub original_dimensions: (u32, u32),

    /// Processing metadata
    pub metadata: ProcessingMetadata,
}

impl RemovalResult {
    /// Create a new removal result
    #[must_use]
    pub fn new(
        image: RgbaImage,
        mask: SegmentationMask,
        original_dimensions: (u32, u32),
        metadata: ProcessingMetadata,
    ) -> Self {
        Self {
            image,
            mask,
            original_dimensions,
            metadata,
        }
    }

    /// Get the image dimensions
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Get the detailed timings
    #[must_use]
    pub fn timings(&self) -> &ProcessingTimings {
        &self.metadata.timings
    }

    /// One-line timing summary for logs
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.metadata.timings;
        format!(
            "total {}ms (preprocess {}ms, inference {}ms, postprocess {}ms)",
            t.total_ms, t.preprocessing_ms, t.inference_ms, t.postprocessing_ms
        )
    }

    /// Consume the result, keeping only the transparent image
    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }
}

/// Grayscale segmentation mask in original image coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationMask {
    /// Mask data as grayscale values (0-255), row-major
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    /// Create a new segmentation mask
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Combine the mask with the alpha channel of `image`
    ///
    /// The new alpha is the smaller of the existing alpha and the mask, so
    /// transparency already present in the upload survives. Pixels whose
    /// alpha ends up at zero are cleared to `(0, 0, 0, 0)`.
    ///
    /// # Errors
    /// - Image and mask dimensions differ
    pub fn apply_to_image(&self, image: &mut RgbaImage) -> Result<()> {
        let (width, height) = self.dimensions;
        if image.dimensions() != self.dimensions
            || self.data.len() != width as usize * height as usize
        {
            return Err(BgRemovalError::processing(format!(
                "Image and mask dimensions do not match: {:?} vs {:?}",
                image.dimensions(),
                self.dimensions
            )));
        }

        for (pixel, &mask) in image.pixels_mut().zip(&self.data) {
            let alpha = pixel[3].min(mask);
            *pixel = if alpha == 0 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([pixel[0], pixel[1], pixel[2], alpha])
            };
        }

        Ok(())
    }

    /// Get mask statistics
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&x| x > 127).count();
        let background_pixels = total_pixels - foreground_pixels;
        let ratio = |count: usize| {
            if total_pixels == 0 {
                0.0
            } else {
                count as f32 / total_pixels as f32
            }
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio: ratio(foreground_pixels),
            background_ratio: ratio(background_pixels),
        }
    }
}

/// Statistics about a segmentation mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

/// Detailed timing breakdown for background removal processing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Model loading time (first call only)
    pub model_load_ms: u64,

    /// Image preprocessing (resize, normalize, tensor conversion)
    pub preprocessing_ms: u64,

    /// Backend inference execution
    pub inference_ms: u64,

    /// Postprocessing (mask generation, alpha application)
    pub postprocessing_ms: u64,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Fraction of the total spent in inference
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }

    /// Time not attributed to any measured stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured = self.model_load_ms
            + self.preprocessing_ms
            + self.inference_ms
            + self.postprocessing_ms;
        self.total_ms.saturating_sub(measured)
    }
}

/// Metadata about the processing operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    /// Detailed timing breakdown
    pub timings: ProcessingTimings,

    /// Model used for inference
    pub model_name: String,

    /// Backend that ran the model
    pub backend: String,

    /// Mask coverage for the processed image
    pub mask_statistics: Option<MaskStatistics>,
}

impl ProcessingMetadata {
    /// Create new processing metadata
    #[must_use]
    pub fn new(model_name: String, backend: String) -> Self {
        Self {
            timings: ProcessingTimings::default(),
            model_name,
            backend,
            mask_statistics: None,
        }
    }
}
