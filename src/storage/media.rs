//! Media classification
//!
//! Maps probed content types to media kinds and file names to content
//! types. Classification is recomputed from a fresh probe every time;
//! nothing is persisted.

use std::path::Path;

use crate::data::MediaUpload;
use crate::error::AppError;

/// How a stored media item should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    /// No content type, or one that is neither image nor video
    Unknown,
}

impl MediaKind {
    /// Classify a probed content type
    ///
    /// `image/*` is an image and `video/*` a video.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type.map(str::trim) {
            Some(content_type) if content_type.starts_with("image/") => MediaKind::Image,
            Some(content_type) if content_type.starts_with("video/") => MediaKind::Video,
            _ => MediaKind::Unknown,
        }
    }
}

/// Content type for a file name, by extension
pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}

impl MediaUpload {
    /// Upload with the content type inferred from the file name
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = content_type_for(&file_name).to_string();
        Self {
            file_name,
            content_type,
            bytes,
        }
    }

    /// Read a local file for upload
    ///
    /// # Errors
    /// Returns `AppError::Validation` on `file` if the file cannot be read
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::validation("file", format!("cannot read {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self::new(file_name, bytes))
    }
}
