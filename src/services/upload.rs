//! Upload validation and decoding
//!
//! An upload becomes an [`UploadedImage`] only after the file name, the
//! sniffed container format, the byte size and the pixel count have all been
//! checked against the [`UploadPolicy`] and the image has decoded cleanly.

use crate::{
    config::ServerConfig,
    error::{BgRemovalError, Result},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::{io::Cursor, path::Path};
use tracing::debug;

/// Image container formats accepted for upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Png,
    Jpeg,
    Bmp,
    Gif,
}

impl InputFormat {
    /// Parse a file extension, case-insensitively and without the leading dot
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "bmp" => Some(Self::Bmp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Format implied by a file name's extension
    #[must_use]
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Map a sniffed container format
    #[must_use]
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Bmp => Some(Self::Bmp),
            ImageFormat::Gif => Some(Self::Gif),
            _ => None,
        }
    }

    /// Decoder format for this container
    #[must_use]
    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Bmp => ImageFormat::Bmp,
            Self::Gif => ImageFormat::Gif,
        }
    }

    /// File extensions that select this format
    #[must_use]
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Png => &["png"],
            Self::Jpeg => &["jpg", "jpeg"],
            Self::Bmp => &["bmp"],
            Self::Gif => &["gif"],
        }
    }

    /// MIME type of this container
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Bmp => "image/bmp",
            Self::Gif => "image/gif",
        }
    }
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "PNG"),
            Self::Jpeg => write!(f, "JPEG"),
            Self::Bmp => write!(f, "BMP"),
            Self::Gif => write!(f, "GIF"),
        }
    }
}

/// Limits applied to every upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Formats the current page variant accepts
    pub accepted_formats: &'static [InputFormat],
    /// Maximum upload size in bytes
    pub max_bytes: usize,
    /// Maximum decoded pixel count (width * height)
    pub max_pixels: u64,
}

impl UploadPolicy {
    /// Derive the policy from server settings
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            accepted_formats: config.accepted_formats(),
            max_bytes: config.max_upload_bytes,
            max_pixels: config.max_pixels,
        }
    }

    /// Whether `format` may be uploaded
    #[must_use]
    pub fn accepts(&self, format: InputFormat) -> bool {
        self.accepted_formats.contains(&format)
    }

    /// Comma-separated accepted extensions, e.g. `png, jpg, jpeg, bmp`
    #[must_use]
    pub fn extension_list(&self) -> String {
        self.accepted_formats
            .iter()
            .flat_map(|format| format.extensions().iter().copied())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A validated, decoded upload
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// File name as sent by the browser
    pub file_name: String,
    /// Container format, confirmed by content sniffing
    pub format: InputFormat,
    /// Raw upload bytes
    pub bytes: Vec<u8>,
    /// Decoded image
    pub image: DynamicImage,
}

impl UploadedImage {
    /// Validate and decode an upload
    ///
    /// # Errors
    /// - `NoUpload` when no file was selected or the file is empty
    /// - `UnsupportedFormat` when the extension or the content is not accepted
    /// - `InvalidUpload` when the size or pixel limit is exceeded
    /// - `Image` when decoding fails
    pub fn from_upload(
        file_name: Option<&str>,
        bytes: Vec<u8>,
        policy: &UploadPolicy,
    ) -> Result<Self> {
        let file_name = match file_name.map(str::trim) {
            Some(name) if !name.is_empty() && !bytes.is_empty() => name.to_string(),
            _ => return Err(BgRemovalError::NoUpload),
        };

        let format = InputFormat::from_file_name(&file_name)
            .filter(|format| policy.accepts(*format))
            .ok_or_else(|| {
                BgRemovalError::unsupported_format(format!(
                    "'{file_name}' is not one of: {}",
                    policy.extension_list()
                ))
            })?;

        let sniffed = image::guess_format(&bytes)
            .ok()
            .and_then(InputFormat::from_image_format)
            .filter(|sniffed| policy.accepts(*sniffed))
            .ok_or_else(|| {
                BgRemovalError::unsupported_format(format!(
                    "'{file_name}' does not contain a supported image"
                ))
            })?;
        if sniffed != format {
            debug!(%file_name, extension = %format, content = %sniffed, "Extension and content disagree, trusting content");
        }

        if bytes.len() > policy.max_bytes {
            return Err(BgRemovalError::invalid_upload(format!(
                "file is {} bytes, limit is {} bytes",
                bytes.len(),
                policy.max_bytes
            )));
        }

        let (width, height) =
            ImageReader::with_format(Cursor::new(&bytes), sniffed.image_format()).into_dimensions()?;
        let pixels = u64::from(width) * u64::from(height);
        if pixels > policy.max_pixels {
            return Err(BgRemovalError::invalid_upload(format!(
                "image is {width}x{height} ({pixels} pixels), limit is {} pixels",
                policy.max_pixels
            )));
        }

        let image = image::load_from_memory_with_format(&bytes, sniffed.image_format())?;
        debug!(%file_name, format = %sniffed, width, height, "Decoded upload");

        Ok(Self {
            file_name,
            format: sniffed,
            bytes,
            image,
        })
    }

    /// Image dimensions (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Original bytes as a `data:` URI for inline preview
    #[must_use]
    pub fn data_uri(&self) -> String {
        data_uri(self.format.mime_type(), &self.bytes)
    }
}

/// Encode bytes as a base64 `data:` URI
#[must_use]
pub fn data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(bytes))
}
