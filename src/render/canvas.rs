use std::sync::Arc;

use base64::Engine as _;
use image::ImageEncoder as _;

use crate::assets::decode::TileBitmap;
use crate::foundation::core::Rgba8;
use crate::foundation::error::{TileMapError, TileMapResult};
use crate::render::composite::over_span;

/// Light and dark checkerboard squares.
const CHECKER_LIGHT: [u8; 4] = [255, 255, 255, 255];
const CHECKER_DARK: [u8; 4] = [200, 200, 200, 255];

/// Largest canvas the compositor will allocate (1 GiB of RGBA8).
pub const MAX_CANVAS_PIXELS: u64 = 1 << 28;

/// Raster format of an [`EncodedImage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodedFormat {
    Png,
}

impl EncodedFormat {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
        }
    }
}

/// Encoded render output, cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    pub format: EncodedFormat,
    pub bytes: Arc<Vec<u8>>,
}

impl EncodedImage {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.bytes.as_slice())
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.format.mime(), self.to_base64())
    }
}

/// Straight-alpha RGBA8 pixel buffer the compositor paints into.
#[derive(Clone, Debug)]
pub struct TileCanvas {
    width: u32,
    height: u32,
    rgba8: Vec<u8>,
}

impl TileCanvas {
    pub fn new(width: u32, height: u32, fill: Rgba8) -> TileMapResult<Self> {
        if u64::from(width) * u64::from(height) > MAX_CANVAS_PIXELS {
            return Err(TileMapError::validation(format!(
                "canvas {width}x{height} exceeds {MAX_CANVAS_PIXELS} pixels"
            )));
        }
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(4))
            .ok_or_else(|| TileMapError::validation("canvas buffer size overflow"))?;
        let rgba8 = fill.0.iter().copied().cycle().take(len).collect();
        Ok(Self {
            width,
            height,
            rgba8,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_rgba8(&self) -> &[u8] {
        &self.rgba8
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = self.index(x, y);
        [
            self.rgba8[idx],
            self.rgba8[idx + 1],
            self.rgba8[idx + 2],
            self.rgba8[idx + 3],
        ]
    }

    fn index(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + (x as usize)) * 4
    }

    fn set(&mut self, x: u32, y: u32, px: [u8; 4]) {
        let idx = self.index(x, y);
        self.rgba8[idx..idx + 4].copy_from_slice(&px);
    }

    /// Overwrite the canvas with `cell`-pixel squares.
    ///
    /// `origin` is the canvas's top-left corner in map pixel space, so a region canvas shares the
    /// full map's phase.
    pub fn fill_checkerboard(&mut self, cell: u32, origin: (i64, i64)) {
        let cell = i64::from(cell.max(1));
        for y in 0..self.height {
            let row = (origin.1 + i64::from(y)).div_euclid(cell);
            for x in 0..self.width {
                let col = (origin.0 + i64::from(x)).div_euclid(cell);
                let px = if (row + col).rem_euclid(2) == 0 {
                    CHECKER_LIGHT
                } else {
                    CHECKER_DARK
                };
                self.set(x, y, px);
            }
        }
    }

    /// Blend `bitmap` over the `cell`-sized square at `(left, top)`.
    ///
    /// The bitmap is not scaled: it is clipped to the cell, to its own bounds, and to the canvas.
    /// Returns `false` when nothing was covered.
    pub fn paint_tile(&mut self, bitmap: &TileBitmap, left: u32, top: u32, cell: u32) -> bool {
        let w = cell
            .min(bitmap.width)
            .min(self.width.saturating_sub(left)) as usize;
        let h = cell
            .min(bitmap.height)
            .min(self.height.saturating_sub(top));
        if w == 0 || h == 0 {
            return false;
        }

        let src_stride = bitmap.width as usize * 4;
        for row in 0..h {
            let src_start = row as usize * src_stride;
            let src = &bitmap.rgba8[src_start..src_start + w * 4];
            let dst_start = self.index(left, top + row);
            over_span(&mut self.rgba8[dst_start..dst_start + w * 4], src);
        }
        true
    }

    /// 1px lines at every multiple of `tile_size`, written without blending.
    pub fn draw_grid(&mut self, tile_size: u32, color: Rgba8) {
        let step = tile_size.max(1) as usize;
        for x in (0..self.width).step_by(step) {
            for y in 0..self.height {
                self.set(x, y, color.0);
            }
        }
        for y in (0..self.height).step_by(step) {
            for x in 0..self.width {
                self.set(x, y, color.0);
            }
        }
    }

    pub fn encode_png(&self) -> TileMapResult<EncodedImage> {
        let mut bytes = Vec::new();
        image::codecs::png::PngEncoder::new(&mut bytes)
            .write_image(
                &self.rgba8,
                self.width,
                self.height,
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| TileMapError::encode(format!("png encode failed: {e}")))?;
        Ok(EncodedImage {
            width: self.width,
            height: self.height,
            format: EncodedFormat::Png,
            bytes: Arc::new(bytes),
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/canvas.rs"]
mod tests;
