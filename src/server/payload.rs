//! Decoding inbound frame payloads into images.
//!
//! Text messages carry a base64-encoded JPEG or PNG, optionally wrapped in a
//! `data:image/...;base64,` URI. Binary messages carry the encoded image bytes
//! directly.

use crate::pipeline::error::StageError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::RgbImage;

/// Decode a text frame.
pub fn decode_text(text: &str) -> Result<RgbImage, StageError> {
    let text = text.trim();
    let encoded = match text.strip_prefix("data:") {
        Some(uri) => uri
            .split_once(',')
            .map(|(_, data)| data)
            .ok_or_else(|| StageError::Decode("data URI without payload".to_string()))?,
        None => text,
    };
    if encoded.is_empty() {
        return Err(StageError::Decode("empty payload".to_string()));
    }
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| StageError::Decode(format!("invalid base64: {}", e)))?;
    decode_bytes(&bytes)
}

/// Decode a binary frame.
pub fn decode_bytes(bytes: &[u8]) -> Result<RgbImage, StageError> {
    if bytes.is_empty() {
        return Err(StageError::Decode("empty payload".to_string()));
    }
    let image = image::load_from_memory(bytes)
        .map_err(|e| StageError::Decode(format!("unreadable image: {}", e)))?;
    Ok(image.to_rgb8())
}
