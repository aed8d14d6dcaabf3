use crate::api::models::UploadFile;
use crate::error::{ClientError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Mime type for a supported image extension.
pub fn image_mime(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Read an image from disk and encode it as a `data:` URL for a message part.
pub async fn load_image(path: &Path) -> Result<String> {
    let mime = image_mime(path).ok_or_else(|| {
        ClientError::validation(format!("Unsupported image type: {}", path.display()))
    })?;
    let bytes = tokio::fs::read(path).await?;
    if bytes.is_empty() {
        return Err(ClientError::validation("Image file is empty"));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ClientError::validation(format!(
            "Image is larger than {} MB",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(to_data_url(mime, &bytes))
}

/// Read a document for a knowledge-base upload.
pub async fn load_upload(path: &Path) -> Result<UploadFile> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ClientError::validation(format!("Not a file: {}", path.display())))?
        .to_string();
    let bytes = tokio::fs::read(path).await?;
    Ok(UploadFile { file_name, bytes })
}
