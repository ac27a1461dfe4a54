//! Letterbox preprocessing shared by every backend
//!
//! The image is scaled to fit the model's square input, centered on a white
//! canvas and normalized into an NCHW tensor. [`Letterbox`] records the
//! geometry so the processor can map the output mask back to the original
//! image coordinates.

use crate::{
    error::{BgRemovalError, Result},
    models::PreprocessingConfig,
};
use image::{imageops::FilterType, DynamicImage, ImageBuffer, Rgb, RgbImage};
use ndarray::Array4;

/// Canvas color used around the scaled image
pub const PADDING_COLOR: [u8; 3] = [255, 255, 255];

/// Geometry of the aspect-preserving resize into the model's square input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Square canvas side length in pixels
    pub target_size: u32,
    /// Scale applied to the original image
    pub scale: f32,
    /// Scaled image width
    pub scaled_width: u32,
    /// Scaled image height
    pub scaled_height: u32,
    /// Horizontal centering offset
    pub offset_x: u32,
    /// Vertical centering offset
    pub offset_y: u32,
}

impl Letterbox {
    /// Compute the letterbox for an image of `original` (width, height)
    ///
    /// # Errors
    /// - Zero-sized image or target
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn compute(original: (u32, u32), target_size: u32) -> Result<Self> {
        let (orig_width, orig_height) = original;
        if orig_width == 0 || orig_height == 0 {
            return Err(BgRemovalError::processing_stage_error(
                "preprocessing",
                "image has zero width or height",
                Some(&format!("{orig_width}x{orig_height}")),
            ));
        }
        if target_size == 0 {
            return Err(BgRemovalError::processing("Model target size must be positive"));
        }

        let target = target_size as f32;
        let scale = (target / orig_width as f32).min(target / orig_height as f32);

        // Rounding can overshoot by one pixel on extreme aspect ratios
        let scaled_width = ((orig_width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((orig_height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            target_size,
            scale,
            scaled_width,
            scaled_height,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
        })
    }

    /// Map an original-image pixel to its canvas coordinate
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    #[must_use]
    pub fn to_canvas(&self, x: u32, y: u32) -> (u32, u32) {
        let scaled_x = ((x as f32 * self.scale).round() as u32).min(self.scaled_width - 1);
        let scaled_y = ((y as f32 * self.scale).round() as u32).min(self.scaled_height - 1);
        (scaled_x + self.offset_x, scaled_y + self.offset_y)
    }
}

/// Image to tensor conversion for model inference
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Letterbox an image onto the model canvas
    ///
    /// # Errors
    /// - Zero-sized image or target
    pub fn letterbox(image: &DynamicImage, target_size: u32) -> Result<(RgbImage, Letterbox)> {
        let rgb_image = image.to_rgb8();
        let letterbox = Letterbox::compute(rgb_image.dimensions(), target_size)?;

        let resized = image::imageops::resize(
            &rgb_image,
            letterbox.scaled_width,
            letterbox.scaled_height,
            FilterType::Triangle,
        );

        let mut canvas = ImageBuffer::from_pixel(target_size, target_size, Rgb(PADDING_COLOR));
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset_x),
            i64::from(letterbox.offset_y),
        );

        Ok((canvas, letterbox))
    }

    /// Preprocess an image into a normalized `[1, 3, size, size]` tensor
    ///
    /// # Errors
    /// - Zero-sized image
    /// - Non-square target size
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<(Array4<f32>, Letterbox)> {
        let [width, height] = preprocessing_config.target_size;
        if width != height {
            return Err(BgRemovalError::invalid_config(format!(
                "Model input must be square, got {width}x{height}"
            )));
        }

        let (canvas, letterbox) = Self::letterbox(image, width)?;
        let tensor = Self::canvas_to_tensor(&canvas, preprocessing_config);
        Ok((tensor, letterbox))
    }

    fn canvas_to_tensor(canvas: &RgbImage, preprocessing_config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mean = preprocessing_config.normalization_mean;
        let std = preprocessing_config.normalization_std;

        Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
            #[allow(clippy::cast_possible_truncation)]
            let pixel = canvas.get_pixel(x as u32, y as u32);
            (f32::from(pixel[c]) / 255.0 - mean[c]) / std[c]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelPreset;
    use image::Rgb;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(color)))
    }

    #[test]
    fn test_landscape_letterbox_geometry() {
        let letterbox = Letterbox::compute((200, 100), 64).unwrap();
        assert_eq!(letterbox.scaled_width, 64);
        assert_eq!(letterbox.scaled_height, 32);
        assert_eq!(letterbox.offset_x, 0);
        assert_eq!(letterbox.offset_y, 16);
        assert_eq!(letterbox.to_canvas(0, 0), (0, 16));
        assert_eq!(letterbox.to_canvas(199, 99), (63, 47));
    }

    #[test]
    fn test_zero_sized_image_rejected() {
        assert!(Letterbox::compute((0, 10), 64).is_err());
        assert!(Letterbox::compute((10, 10), 0).is_err());
    }

    #[test]
    fn test_tensor_shape_and_normalization() {
        let config = PreprocessingConfig {
            target_size: [32, 32],
            ..ModelPreset::Isnet.preprocessing()
        };
        let (tensor, letterbox) =
            ImagePreprocessor::preprocess_for_inference(&solid(32, 16, [0, 0, 0]), &config)
                .unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 32, 32]);
        assert_eq!(letterbox.offset_y, 8);
        // black image pixel: (0 - 0.5) / 1.0
        assert!((tensor[[0, 0, 16, 16]] + 0.5).abs() < 1e-6);
        // white padding: (1 - 0.5) / 1.0
        assert!((tensor[[0, 2, 0, 0]] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_non_square_target_rejected() {
        let config = PreprocessingConfig {
            target_size: [32, 16],
            ..ModelPreset::Isnet.preprocessing()
        };
        let result = ImagePreprocessor::preprocess_for_inference(&solid(4, 4, [1, 2, 3]), &config);
        assert!(matches!(result, Err(BgRemovalError::InvalidConfig(_))));
    }
}
