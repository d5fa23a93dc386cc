//! Tile encoding: `DynamicImage` → base64 JPEG wrapped in `ImageData`.
//!
//! Composite tiles can stack several pages, so JPEG at a configurable
//! quality keeps the request body small. `detail: "high"` asks GPT-4-class
//! models to use the full tile budget; without it small print on a
//! stitched page is lost.

use crate::error::PipelineError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// MIME type of every encoded tile.
pub const TILE_MIME: &str = "image/jpeg";

/// Encode a tile as raw JPEG bytes.
pub fn jpeg_bytes(img: &DynamicImage, quality: u8, tile: usize) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    // JPEG has no alpha channel; flatten first.
    let rgb = img.to_rgb8();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| PipelineError::EncodeFailed {
            tile,
            detail: e.to_string(),
        })?;
    Ok(buf)
}

/// Encode a tile as a base64 JPEG ready for the chat API.
pub fn encode_tile(img: &DynamicImage, quality: u8, tile: usize) -> Result<ImageData, PipelineError> {
    let buf = jpeg_bytes(img, quality, tile)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded tile {} → {} bytes base64", tile, b64.len());

    Ok(ImageData::new(b64, TILE_MIME).with_detail("high"))
}
