use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::foundation::core::TileRegion;
use crate::foundation::error::{TileMapError, TileMapResult};

/// One placed tile: a grid coordinate plus its embedded image payload.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Tile {
    /// Tile column.
    pub x: i32,
    /// Tile row.
    pub y: i32,
    /// Raw base64 image or a `data:image/<fmt>;base64,<payload>` URL.
    #[serde(rename = "tileId")]
    pub tile_id: String,
}

impl Tile {
    pub fn new(x: i32, y: i32, tile_id: impl Into<String>) -> Self {
        Self {
            x,
            y,
            tile_id: tile_id.into(),
        }
    }
}

/// A stackable collection of tiles.
///
/// `locked` is editor metadata; the compositor does not look at it. A layer without `visible`
/// in its JSON is hidden.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Layer {
    /// Caller-assigned layer id.
    pub id: i32,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Hidden layers are skipped by every render path.
    #[serde(default)]
    pub visible: bool,
    /// Advisory edit lock.
    #[serde(default)]
    pub locked: bool,
    /// Tiles; a later entry at the same coordinate wins.
    #[serde(default)]
    pub tiles: Vec<Tile>,
}

/// Full-map render request.
///
/// `width`/`height` are in tiles; output is `width * tile_size` by `height * tile_size` pixels.
/// Layers are painted in the order given (first is bottom).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    /// Map width in tiles.
    pub width: u32,
    /// Map height in tiles.
    pub height: u32,
    /// Edge length of one tile in pixels.
    pub tile_size: u32,
    /// Bottom-to-top layer stack.
    #[serde(default)]
    pub layers: Vec<Layer>,
    /// Draw 1px lines at every tile boundary.
    #[serde(default)]
    pub show_grid: bool,
    /// Paint a two-tone checkerboard under the tiles.
    #[serde(default)]
    pub show_checkerboard: bool,
}

impl RenderRequest {
    /// Parse a render request from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> TileMapResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| TileMapError::validation(format!("parse render request JSON: {e}")))
    }

    /// Parse a render request from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> TileMapResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            TileMapError::validation(format!("open render request '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Reject requests that cannot produce a canvas.
    pub fn validate(&self) -> TileMapResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(TileMapError::validation(
                "map width and height must be > 0",
            ));
        }
        if self.tile_size == 0 {
            return Err(TileMapError::validation("tile size must be > 0"));
        }
        self.bounds().pixel_size(self.tile_size)?;
        Ok(())
    }

    /// The whole map as a tile region.
    pub fn bounds(&self) -> TileRegion {
        TileRegion::full(self.width, self.height)
    }

    /// Number of tiles across visible layers (before de-duplication).
    pub fn visible_tile_count(&self) -> usize {
        self.layers
            .iter()
            .filter(|l| l.visible)
            .map(|l| l.tiles.len())
            .sum()
    }
}

/// Brush used by a stamp edit.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedTile {
    /// Palette id of the brush.
    #[serde(default)]
    pub id: String,
    /// Palette display name.
    #[serde(default)]
    pub name: String,
    /// Payload used for every footprint cell without a sub-tile.
    #[serde(default)]
    pub image: String,
    /// Footprint width in tiles; `0` means 1.
    #[serde(default)]
    pub width: u32,
    /// Footprint height in tiles; `0` means 1.
    #[serde(default)]
    pub height: u32,
    /// Per-cell payloads indexed `[dx][dy]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_tiles: Option<Vec<Vec<String>>>,
}

impl SelectedTile {
    /// Footprint in tiles with zero dimensions promoted to 1.
    pub fn footprint(&self) -> (u32, u32) {
        (self.width.max(1), self.height.max(1))
    }

    /// Payload for footprint cell `(dx, dy)`.
    pub fn payload_at(&self, dx: u32, dy: u32) -> &str {
        self.sub_tiles
            .as_ref()
            .and_then(|cols| cols.get(dx as usize))
            .and_then(|col| col.get(dy as usize))
            .map(String::as_str)
            .unwrap_or(&self.image)
    }
}

/// A brush stamp applied to one layer at one anchor.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampRequest {
    /// Brush; `None` is rejected.
    pub selected_tile: Option<SelectedTile>,
    /// Anchor column (top-left of the footprint).
    pub x: i32,
    /// Anchor row.
    pub y: i32,
    /// Map width in tiles.
    pub width: u32,
    /// Map height in tiles.
    pub height: u32,
    /// Full layer stack; returned updated.
    #[serde(default)]
    pub layers: Vec<Layer>,
    /// Id of the layer being edited.
    pub active_layer_id: i32,
    /// Tile size for the rendered patch.
    #[serde(default = "default_stamp_tile_size")]
    pub tile_size: u32,
    /// Draw grid lines on the patch.
    #[serde(default = "default_true")]
    pub show_grid: bool,
    /// Draw the checkerboard under the patch.
    #[serde(default = "default_true")]
    pub show_checkerboard: bool,
}

impl StampRequest {
    /// Parse a stamp request from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> TileMapResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| TileMapError::validation(format!("parse stamp request JSON: {e}")))
    }

    /// Parse a stamp request from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> TileMapResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            TileMapError::validation(format!("open stamp request '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }
}

/// Unique non-empty payloads across `layers`, in first-seen order.
pub fn collect_tile_ids(layers: &[Layer]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tile in layers.iter().flat_map(|l| l.tiles.iter()) {
        if tile.tile_id.is_empty() {
            continue;
        }
        if seen.insert(tile.tile_id.as_str()) {
            out.push(tile.tile_id.clone());
        }
    }
    out
}

fn default_true() -> bool {
    true
}

fn default_stamp_tile_size() -> u32 {
    32
}

#[cfg(test)]
#[path = "../../tests/unit/model/map.rs"]
mod tests;
