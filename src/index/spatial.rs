use std::collections::HashMap;

use crate::model::map::Tile;

/// Sparse per-layer tile lookup keyed by `(x, y)`.
///
/// Built fresh for each render or stamp; not shared across threads. Coordinates are not
/// bounds-checked, so callers filter against map dimensions themselves.
#[derive(Clone, Debug, Default)]
pub struct SpatialIndex {
    tiles: HashMap<(i32, i32), Tile>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `tiles` with last-write-wins on duplicate coordinates.
    pub fn from_tiles<'a>(tiles: impl IntoIterator<Item = &'a Tile>) -> Self {
        let mut index = Self::new();
        for tile in tiles {
            index.set_tile(tile.x, tile.y, tile.clone());
        }
        index
    }

    /// Insert or overwrite the tile at `(x, y)`.
    pub fn set_tile(&mut self, x: i32, y: i32, tile: Tile) {
        self.tiles.insert((x, y), tile);
    }

    pub fn get_tile(&self, x: i32, y: i32) -> Option<&Tile> {
        self.tiles.get(&(x, y))
    }

    /// Remove the tile at `(x, y)`; no-op when absent.
    pub fn remove_tile(&mut self, x: i32, y: i32) {
        self.tiles.remove(&(x, y));
    }

    /// Borrowing iterator over all tiles, order unspecified.
    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// Snapshot of all tiles, order unspecified.
    pub fn all_tiles(&self) -> Vec<Tile> {
        self.tiles.values().cloned().collect()
    }

    pub fn into_tiles(self) -> Vec<Tile> {
        self.tiles.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/index/spatial.rs"]
mod tests;
