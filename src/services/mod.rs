//! Upload and download services used by the web layer

pub mod format;
pub mod upload;

pub use format::{DownloadArtifact, OutputFormatHandler, DOWNLOAD_FILE_NAME, DOWNLOAD_MIME_TYPE};
pub use upload::{InputFormat, UploadPolicy, UploadedImage};
