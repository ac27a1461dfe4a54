//! Download artifact encoding
//!
//! Results are always delivered as PNG so the alpha channel survives.

use crate::error::{BgRemovalError, Result};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;

/// File name offered for every download
pub const DOWNLOAD_FILE_NAME: &str = "removed_background.png";

/// MIME type of every download
pub const DOWNLOAD_MIME_TYPE: &str = "image/png";

/// An encoded result ready to be sent to the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    /// Encoded PNG bytes
    pub bytes: Vec<u8>,
    /// Suggested file name
    pub file_name: &'static str,
    /// Content type
    pub mime_type: &'static str,
}

impl DownloadArtifact {
    /// `Content-Disposition` header value that triggers a download
    #[must_use]
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.file_name)
    }

    /// The PNG as a `data:` URI for the inline result preview
    #[must_use]
    pub fn data_uri(&self) -> String {
        super::upload::data_uri(self.mime_type, &self.bytes)
    }

    /// Encoded size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the artifact holds no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Encodes removal results for download
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Encode an RGBA image as a PNG download
    ///
    /// # Errors
    /// - PNG encoding failures
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_web::services::OutputFormatHandler;
    /// use image::RgbaImage;
    ///
    /// let artifact = OutputFormatHandler::encode_png(&RgbaImage::new(4, 4)).unwrap();
    /// assert_eq!(artifact.file_name, "removed_background.png");
    /// assert_eq!(artifact.mime_type, "image/png");
    /// ```
    pub fn encode_png(image: &RgbaImage) -> Result<DownloadArtifact> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| {
                BgRemovalError::processing_stage_error(
                    "png encoding",
                    &e.to_string(),
                    Some(&format!("{}x{}", image.width(), image.height())),
                )
            })?;

        Ok(DownloadArtifact {
            bytes,
            file_name: DOWNLOAD_FILE_NAME,
            mime_type: DOWNLOAD_MIME_TYPE,
        })
    }
}
