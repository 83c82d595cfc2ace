//! Object storage uploads.

use std::path::Path;

use hwmarket_core::{UserId, ValidationError};
use tracing::instrument;
use uuid::Uuid;

use crate::backend::{Backend, PRODUCT_IMAGES_BUCKET};
use crate::error::Result;

/// Largest accepted listing photo.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Client for the storage API.
pub struct StorageClient<'a> {
    backend: &'a dyn Backend,
}

impl<'a> StorageClient<'a> {
    #[must_use]
    pub const fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Upload an object and return its public URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        self.backend.upload(bucket, path, bytes, content_type).await
    }

    /// Upload a listing photo under `{user_id}/{uuid}.{ext}`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for unsupported or oversized files.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_product_image(
        &self,
        user_id: UserId,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let (extension, content_type) = image_type(file_name)?;
        if bytes.is_empty() || bytes.len() > MAX_IMAGE_BYTES {
            return Err(ValidationError::Invalid {
                field: "images",
                message: format!("{file_name} must be between 1 byte and 10 MB"),
            }
            .into());
        }
        let path = format!("{user_id}/{}.{extension}", Uuid::new_v4());
        self.upload(PRODUCT_IMAGES_BUCKET, &path, bytes, content_type)
            .await
    }
}

/// Extension and MIME type for a supported photo.
fn image_type(file_name: &str) -> std::result::Result<(&'static str, &'static str), ValidationError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => Ok(("jpg", "image/jpeg")),
        Some("png") => Ok(("png", "image/png")),
        Some("webp") => Ok(("webp", "image/webp")),
        Some("heic") => Ok(("heic", "image/heic")),
        _ => Err(ValidationError::Invalid {
            field: "images",
            message: format!("{file_name} is not a JPEG, PNG, WebP or HEIC image"),
        }),
    }
}
