//! On-disk storage for uploaded images.
//!
//! Files are written under a root directory with a generated name; the
//! format is sniffed from the bytes rather than trusted from the client.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use avicast_core::error::CoreError;
use image::{ImageFormat, ImageReader};

/// Default upload size cap (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// A file written to the store.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

/// Directory-backed image store.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
    max_bytes: usize,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate and write an upload, returning where it landed.
    pub async fn save(&self, bytes: &[u8]) -> Result<StoredImage, CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::Validation("Uploaded file is empty".to_string()));
        }
        if bytes.len() > self.max_bytes {
            return Err(CoreError::Validation(format!(
                "Uploaded file exceeds the {} byte limit",
                self.max_bytes
            )));
        }

        let (format, width, height) = inspect(bytes)?;
        let (content_type, extension) = match format {
            ImageFormat::Jpeg => ("image/jpeg", "jpg"),
            ImageFormat::Png => ("image/png", "png"),
            ImageFormat::WebP => ("image/webp", "webp"),
            other => {
                return Err(CoreError::Validation(format!(
                    "Unsupported image format {other:?}. Upload JPEG, PNG or WebP"
                )))
            }
        };

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CoreError::Internal(format!("Failed to create upload dir: {e}")))?;

        let dest = self
            .root
            .join(format!("{}.{extension}", uuid::Uuid::new_v4()));
        tokio::fs::write(&dest, bytes)
            .await
            .map_err(|e| CoreError::Internal(format!("Failed to write upload: {e}")))?;

        Ok(StoredImage {
            path: dest.to_string_lossy().to_string(),
            content_type: content_type.to_string(),
            size_bytes: bytes.len() as i64,
            width: Some(i64::from(width)),
            height: Some(i64::from(height)),
        })
    }

    /// Read a stored file back.
    pub async fn read(&self, path: &str) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    /// Best-effort removal of a stored file.
    pub async fn remove(&self, path: &str) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path, error = %e, "Failed to remove stored upload");
        }
    }
}

/// Sniff the format and read the dimensions from the image header.
fn inspect(bytes: &[u8]) -> Result<(ImageFormat, u32, u32), CoreError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CoreError::Validation(format!("Unreadable image: {e}")))?;
    let format = reader
        .format()
        .ok_or_else(|| CoreError::Validation("Unrecognised image format".to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| CoreError::Validation(format!("Corrupt image header: {e}")))?;
    Ok((format, width, height))
}
