use std::sync::Arc;

use crate::foundation::core::TileRegion;
use crate::foundation::error::{TileMapError, TileMapResult};
use crate::index::spatial::SpatialIndex;
use crate::model::map::{Layer, RenderRequest, StampRequest, Tile};
use crate::render::canvas::EncodedImage;
use crate::render::compositor::Compositor;

/// Result of a stamp: the edited layer stack and a render of the brush footprint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StampOutcome {
    /// Every layer of the request, with the target layer's tiles replaced.
    pub layers: Vec<Layer>,
    /// Footprint box the patch covers, anchored at the stamp position.
    pub region: TileRegion,
    /// Patch of `region`, `region.w * tile_size` by `region.h * tile_size` pixels.
    pub image: EncodedImage,
}

/// Applies multi-cell brushes to one layer and re-renders only the footprint.
pub struct StampEditor {
    compositor: Arc<Compositor>,
}

impl StampEditor {
    pub fn new(compositor: Arc<Compositor>) -> Self {
        Self { compositor }
    }

    /// Remove then re-insert every in-bounds footprint cell on the active layer.
    ///
    /// Cells outside the map are left alone. The target layer's tiles come back sorted by
    /// `(y, x)`; other layers are returned untouched.
    #[tracing::instrument(skip_all, fields(x = req.x, y = req.y, layer = req.active_layer_id))]
    pub fn apply(&self, req: StampRequest) -> TileMapResult<StampOutcome> {
        let StampRequest {
            selected_tile,
            x,
            y,
            width,
            height,
            mut layers,
            active_layer_id,
            tile_size,
            show_grid,
            show_checkerboard,
        } = req;

        let brush =
            selected_tile.ok_or_else(|| TileMapError::validation("stamp requires a selected tile"))?;
        if x < 0 || y < 0 {
            return Err(TileMapError::validation(format!(
                "stamp anchor ({x}, {y}) must be non-negative"
            )));
        }
        let (w, h) = brush.footprint();
        let region = TileRegion::new(x, y, w, h);
        let editable = region.intersect(TileRegion::full(width, height));

        let layer = layers
            .iter_mut()
            .find(|l| l.id == active_layer_id)
            .ok_or(TileMapError::LayerNotFound(active_layer_id))?;

        let mut index = SpatialIndex::from_tiles(&layer.tiles);
        for (cx, cy) in editable.cells() {
            index.remove_tile(cx, cy);
        }
        for (cx, cy) in editable.cells() {
            // Non-negative: `editable` lies inside `region`.
            let (dx, dy) = ((cx - x) as u32, (cy - y) as u32);
            index.set_tile(cx, cy, Tile::new(cx, cy, brush.payload_at(dx, dy)));
        }
        let mut tiles = index.into_tiles();
        tiles.sort_by_key(|t| (t.y, t.x));
        tracing::debug!(
            cells = u64::from(editable.w) * u64::from(editable.h),
            layer_tiles = tiles.len(),
            "stamp applied"
        );
        layer.tiles = tiles;

        let render = RenderRequest {
            width,
            height,
            tile_size,
            layers,
            show_grid,
            show_checkerboard,
        };
        let image = self.compositor.render_region(&render, region)?;
        Ok(StampOutcome {
            layers: render.layers,
            region,
            image,
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/edit/stamp.rs"]
mod tests;
