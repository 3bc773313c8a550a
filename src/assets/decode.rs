use std::io::Cursor;
use std::sync::Arc;

use base64::Engine as _;
use image::{ImageFormat, ImageReader, Limits};

use crate::foundation::error::PayloadError;

/// Decoded tile in straight-alpha RGBA8.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileBitmap {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major, tightly packed RGBA8.
    pub rgba8: Arc<Vec<u8>>,
}

impl TileBitmap {
    pub fn byte_len(&self) -> usize {
        self.rgba8.len()
    }

    /// RGBA of pixel `(x, y)`; caller keeps coordinates in range.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [
            self.rgba8[idx],
            self.rgba8[idx + 1],
            self.rgba8[idx + 2],
            self.rgba8[idx + 3],
        ]
    }
}

pub(crate) fn decode_base64(body: &str) -> Result<Vec<u8>, PayloadError> {
    base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| PayloadError::InvalidBase64(e.to_string()))
}

/// Widest or tallest tile the decoder accepts, in pixels.
pub const MAX_TILE_SIDE: u32 = 4096;
/// Allocation ceiling for one tile decode.
const MAX_DECODE_ALLOC: u64 = 64 * 1024 * 1024;

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_TILE_SIDE);
    limits.max_image_height = Some(MAX_TILE_SIDE);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits
}

/// Decode a PNG tile into straight RGBA8.
///
/// Other formats are rejected even when `image` could read them. Header dimensions are checked
/// against [`MAX_TILE_SIDE`] before any pixel buffer is allocated.
pub fn decode_bitmap(bytes: &[u8]) -> Result<TileBitmap, PayloadError> {
    let mut reader = ImageReader::with_format(Cursor::new(bytes), ImageFormat::Png);
    reader.limits(decode_limits());
    let dyn_img = reader
        .decode()
        .map_err(|e| PayloadError::ImageDecodeFailed(e.to_string()))?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(PayloadError::ImageDecodeFailed(
            "decoded image has zero size".to_string(),
        ));
    }
    Ok(TileBitmap {
        width,
        height,
        rgba8: Arc::new(rgba.into_raw()),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
