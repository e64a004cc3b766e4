//! Image decoding and validation.
//!
//! Every ingestion path funnels raw bytes through here before the
//! pipeline will touch them: base64/data-URL unwrapping, size limits,
//! mime sniffing, and a real decode to prove the payload is an image.

use crate::error::SnapflowError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::GenericImageView;
use std::sync::Arc;

/// Maximum accepted image size (15MB)
pub const MAX_IMAGE_BYTES: usize = 15 * 1024 * 1024;

/// Minimum accepted image size; anything smaller is a truncated upload
pub const MIN_IMAGE_BYTES: usize = 1024;

/// A validated image ready for the pipeline.
/// Bytes are shared because the history record, the analyzer, and the
/// notifier all hold onto the same payload.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub bytes: Arc<Vec<u8>>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Strip a `data:image/...;base64,` prefix if present
pub fn strip_data_url(input: &str) -> Result<&str, SnapflowError> {
    if input.starts_with("data:image") {
        input.split(',').nth(1).ok_or_else(|| {
            SnapflowError::Validation("Invalid data URL format".to_string())
        })
    } else {
        Ok(input)
    }
}

/// Decode a base64 payload, tolerating a data-URL wrapper and
/// surrounding whitespace
pub fn decode_base64(input: &str) -> Result<Vec<u8>, SnapflowError> {
    let clean = strip_data_url(input.trim())?;
    BASE64
        .decode(clean.trim())
        .map_err(|e| SnapflowError::Validation(format!("Invalid base64 image data: {}", e)))
}

/// Determine media type from magic bytes, defaulting to PNG
pub fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/png"
    }
}

pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Filename used when the caller supplied none
pub fn synthesize_name(id: &str, mime_type: &str) -> String {
    let short_id: String = id.chars().take(8).collect();
    format!("screenshot-{}.{}", short_id, extension_for(mime_type))
}

/// Validate size limits and decode the image to prove it is real.
///
/// Limits are checked before decoding so oversized garbage is rejected
/// without paying for a decode attempt.
pub fn decode_image(bytes: Vec<u8>, max_bytes: usize) -> Result<DecodedImage, SnapflowError> {
    if bytes.len() > max_bytes {
        return Err(SnapflowError::Decode(format!(
            "Image too large ({} bytes, max {} bytes)",
            bytes.len(),
            max_bytes
        )));
    }
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(SnapflowError::Decode(format!(
            "Image too small ({} bytes, min {} bytes)",
            bytes.len(),
            MIN_IMAGE_BYTES
        )));
    }

    let mime_type = sniff_mime_type(&bytes);
    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| SnapflowError::Decode(format!("Failed to decode image: {}", e)))?;
    let (width, height) = decoded.dimensions();

    Ok(DecodedImage {
        bytes: Arc::new(bytes),
        mime_type,
        width,
        height,
    })
}
