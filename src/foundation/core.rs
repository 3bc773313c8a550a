use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::foundation::error::{TileMapError, TileMapResult};

/// Straight-alpha RGBA8 color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8(pub [u8; 4]);

impl Rgba8 {
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const TRANSPARENT: Self = Self([0, 0, 0, 0]);

    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }
}

/// Half-open rectangle of tile cells `[x, x + w) × [y, y + h)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TileRegion {
    /// Leftmost tile column.
    pub x: i32,
    /// Topmost tile row.
    pub y: i32,
    /// Width in tiles.
    pub w: u32,
    /// Height in tiles.
    pub h: u32,
}

impl TileRegion {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Whole map `[0, width) × [0, height)`.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn contains(self, x: i32, y: i32) -> bool {
        i64::from(x) >= i64::from(self.x)
            && i64::from(x) < i64::from(self.x) + i64::from(self.w)
            && i64::from(y) >= i64::from(self.y)
            && i64::from(y) < i64::from(self.y) + i64::from(self.h)
    }

    pub fn is_empty(self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Cell coordinates in column-major order. Cells beyond the `i32` range are dropped.
    pub fn cells(self) -> impl Iterator<Item = (i32, i32)> {
        let (x0, y0) = (i64::from(self.x), i64::from(self.y));
        let (w, h) = (i64::from(self.w), i64::from(self.h));
        (0..w).flat_map(move |dx| {
            (0..h).filter_map(move |dy| {
                Some((i32::try_from(x0 + dx).ok()?, i32::try_from(y0 + dy).ok()?))
            })
        })
    }

    /// Overlap of `self` and `other`; empty when they are disjoint.
    pub fn intersect(self, other: Self) -> Self {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (i64::from(self.x) + i64::from(self.w)).min(i64::from(other.x) + i64::from(other.w));
        let y1 = (i64::from(self.y) + i64::from(self.h)).min(i64::from(other.y) + i64::from(other.h));
        let w = (x1 - i64::from(x0)).max(0) as u32;
        let h = (y1 - i64::from(y0)).max(0) as u32;
        if w == 0 || h == 0 {
            return Self::new(x0, y0, 0, 0);
        }
        Self::new(x0, y0, w, h)
    }

    /// Pixel dimensions of this region at `tile_size`.
    pub fn pixel_size(self, tile_size: u32) -> TileMapResult<(u32, u32)> {
        let w = self.w.checked_mul(tile_size);
        let h = self.h.checked_mul(tile_size);
        match (w, h) {
            (Some(w), Some(h)) => Ok((w, h)),
            _ => Err(TileMapError::validation("canvas size overflows u32")),
        }
    }
}

/// Shared cancellation flag handed to timed work.
///
/// Cancelling is sticky; clones observe the same flag. A [`CancelToken::child`] is cancelled
/// when it or any ancestor is.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<CancelNode>);

#[derive(Debug, Default)]
struct CancelNode {
    flag: AtomicBool,
    parent: Option<Arc<CancelNode>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that can be cancelled on its own without affecting `self`.
    pub fn child(&self) -> Self {
        Self(Arc::new(CancelNode {
            flag: AtomicBool::new(false),
            parent: Some(self.0.clone()),
        }))
    }

    pub fn cancel(&self) {
        self.0.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        let mut node = Some(&self.0);
        while let Some(n) = node {
            if n.flag.load(Ordering::Acquire) {
                return true;
            }
            node = n.parent.as_ref();
        }
        false
    }
}

/// Seconds since the Unix epoch, `0` if the clock is before it.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Bounded prefix of a payload for log lines.
pub(crate) fn preview(payload: &str) -> &str {
    const PREVIEW_CHARS: usize = 32;
    match payload.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => &payload[..idx],
        None => payload,
    }
}

/// Serde adapter: `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
