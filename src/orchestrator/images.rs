//! Validation of images before upload

use super::OrchestratorError;
use crate::backend::ImageUpload;
use std::path::Path;

/// Image types the vision endpoint accepts
pub const ALLOWED_IMAGE_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/heic",
    "image/webp",
];

/// Largest accepted upload
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

fn invalid(path: &Path, reason: impl Into<String>) -> OrchestratorError {
    OrchestratorError::InvalidImage {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Check type and size, then read the file
pub async fn load_image(path: &Path) -> Result<ImageUpload, OrchestratorError> {
    let mime = mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .ok_or_else(|| invalid(path, "unknown file type"))?;
    if !ALLOWED_IMAGE_TYPES.contains(&mime.as_str()) {
        return Err(invalid(
            path,
            format!(
                "unsupported type {mime}, allowed: {}",
                ALLOWED_IMAGE_TYPES.join(", ")
            ),
        ));
    }

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| invalid(path, e.to_string()))?;
    if metadata.len() > MAX_IMAGE_BYTES {
        return Err(invalid(
            path,
            format!("file too large, max size {}MB", MAX_IMAGE_BYTES / (1024 * 1024)),
        ));
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| invalid(path, e.to_string()))?;
    let file_name = path
        .file_name()
        .map_or_else(|| "image".to_string(), |n| n.to_string_lossy().into_owned());

    Ok(ImageUpload {
        file_name,
        mime,
        bytes,
    })
}
