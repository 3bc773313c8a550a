use crate::assets::decode::TileBitmap;
use crate::assets::loader::TilePayloadLoader;
use crate::foundation::core::{CancelToken, Rgba8, TileRegion, duration_ms};
use crate::foundation::error::{PayloadError, TileMapError, TileMapResult};
use crate::index::spatial::SpatialIndex;
use crate::model::map::{RenderRequest, Tile};
use crate::render::canvas::{EncodedImage, TileCanvas};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tiles resolved together before painting.
const RESOLVE_CHUNK: usize = 10;
/// Tile progress is reported every this many tiles.
const TILE_PROGRESS_EVERY: usize = 10;
/// Last percentage the tile phase may report.
const TILE_PHASE_MAX: u32 = 85;

/// Options controlling [`Compositor`] rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompositorOpts {
    /// Wait budget for resolving one tile.
    #[serde(with = "duration_ms")]
    pub tile_timeout: Duration,
    /// Wall-clock budget for the whole tile phase of one render.
    #[serde(with = "duration_ms")]
    pub render_budget: Duration,
    /// Checkerboard square edge in pixels.
    pub checker_size: u32,
    /// Grid line color, written as-is.
    pub grid_rgba: Rgba8,
    /// Canvas fill before anything else is drawn.
    pub background_rgba: Rgba8,
    /// Resolve each chunk of tiles on the rayon pool.
    pub parallel: bool,
}

impl Default for CompositorOpts {
    fn default() -> Self {
        Self {
            tile_timeout: Duration::from_secs(5),
            render_budget: Duration::from_secs(30),
            checker_size: 8,
            grid_rgba: Rgba8::new(51, 65, 85, 76),
            background_rgba: Rgba8::WHITE,
            parallel: true,
        }
    }
}

/// Receives staged render progress as `(current, total, message)`.
pub trait ProgressObserver: Sync {
    fn progress(&self, current: u32, total: u32, message: &str);
}

/// Observer that drops every report.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn progress(&self, _current: u32, _total: u32, _message: &str) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(u32, u32, &str) + Sync,
{
    fn progress(&self, current: u32, total: u32, message: &str) {
        self(current, total, message)
    }
}

/// Per-render tile accounting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStats {
    /// Tiles blended onto the canvas.
    pub tiles_painted: u64,
    /// Tiles rejected before loading (out of bounds or failed screening).
    pub tiles_skipped: u64,
    /// Tiles whose load failed or timed out.
    pub tiles_failed: u64,
    /// The render budget ran out and remaining tiles were not painted.
    pub budget_exhausted: bool,
}

/// Encoded image plus the accounting of the render that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderOutput {
    pub image: EncodedImage,
    pub stats: RenderStats,
}

/// Full-map rendering seam used by [`crate::RenderSession`].
pub trait MapRenderer: Send + Sync {
    fn render_map(
        &self,
        req: &RenderRequest,
        observer: &dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> TileMapResult<RenderOutput>;
}

/// Paints layered tile maps onto a canvas and encodes the result as PNG.
///
/// Per-tile failures are logged and skipped; only validation of the request and the final encode
/// can fail a render.
pub struct Compositor {
    loader: Arc<TilePayloadLoader>,
    opts: CompositorOpts,
}

impl Compositor {
    pub fn new(loader: Arc<TilePayloadLoader>, opts: CompositorOpts) -> Self {
        Self { loader, opts }
    }

    pub fn loader(&self) -> &Arc<TilePayloadLoader> {
        &self.loader
    }

    pub fn opts(&self) -> &CompositorOpts {
        &self.opts
    }

    /// Render the whole map.
    #[tracing::instrument(skip_all, fields(width = req.width, height = req.height, layers = req.layers.len()))]
    pub fn render(&self, req: &RenderRequest) -> TileMapResult<EncodedImage> {
        Ok(self
            .render_with_progress(req, &NoProgress, &CancelToken::new())?
            .image)
    }

    /// Render the whole map, reporting staged progress and honoring `cancel`.
    ///
    /// The last stage reported is 90 ("encoding image"); 100 belongs to whoever publishes the
    /// finished image.
    pub fn render_with_progress(
        &self,
        req: &RenderRequest,
        observer: &dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> TileMapResult<RenderOutput> {
        req.validate()?;
        observer.progress(0, 100, "starting");
        let out = self.compose(req, req.bounds(), observer, cancel)?;
        tracing::debug!(stats = ?out.stats, bytes = out.image.bytes.len(), "map rendered");
        Ok(out)
    }

    /// Render only the cells of `region`, as a `region.w * tile_size` by `region.h * tile_size`
    /// patch.
    ///
    /// Background phase and grid lines line up with the full map, so the patch matches the same
    /// rectangle cropped out of [`Compositor::render`].
    #[tracing::instrument(skip(self, req))]
    pub fn render_region(
        &self,
        req: &RenderRequest,
        region: TileRegion,
    ) -> TileMapResult<EncodedImage> {
        req.validate()?;
        if region.is_empty() {
            return Err(TileMapError::validation(
                "region must cover at least one tile",
            ));
        }
        Ok(self
            .compose(req, region, &NoProgress, &CancelToken::new())?
            .image)
    }

    fn compose(
        &self,
        req: &RenderRequest,
        region: TileRegion,
        observer: &dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> TileMapResult<RenderOutput> {
        let ts = req.tile_size;

        observer.progress(10, 100, "creating canvas");
        let (pw, ph) = region.pixel_size(ts)?;
        let mut canvas = TileCanvas::new(pw, ph, self.opts.background_rgba)?;

        observer.progress(15, 100, "drawing background");
        if req.show_checkerboard {
            let origin = (
                i64::from(region.x) * i64::from(ts),
                i64::from(region.y) * i64::from(ts),
            );
            canvas.fill_checkerboard(self.opts.checker_size, origin);
        }

        observer.progress(20, 100, "building spatial indices");
        let indices: Vec<SpatialIndex> = req
            .layers
            .iter()
            .map(|layer| SpatialIndex::from_tiles(&layer.tiles))
            .collect();

        let mut stats = RenderStats::default();
        let plan: Vec<(usize, Vec<&Tile>)> = req
            .layers
            .iter()
            .zip(&indices)
            .enumerate()
            .filter(|(_, (layer, _))| layer.visible)
            .map(|(i, (_, index))| (i, self.candidates(req, region, index, &mut stats)))
            .collect();
        let total: usize = plan.iter().map(|(_, tiles)| tiles.len()).sum();

        let mut pass = PaintPass {
            canvas: &mut canvas,
            region,
            tile_size: ts,
            observer,
            cancel,
            deadline: Instant::now() + self.opts.render_budget,
            total,
            done: 0,
            stats: &mut stats,
        };
        for (layer_index, tiles) in &plan {
            let layer = &req.layers[*layer_index];
            observer.progress(
                layer_stage(*layer_index),
                100,
                &format!("rendering layer {}", layer.name),
            );
            if !self.paint_layer(&mut pass, *layer_index, tiles)? {
                break;
            }
        }

        observer.progress(TILE_PHASE_MAX, 100, "drawing grid");
        if req.show_grid {
            canvas.draw_grid(ts, self.opts.grid_rgba);
        }

        observer.progress(90, 100, "encoding image");
        let image = canvas.encode_png()?;
        Ok(RenderOutput { image, stats })
    }

    /// Tiles of one layer that are inside both the map and `region` and pass screening.
    fn candidates<'a>(
        &self,
        req: &RenderRequest,
        region: TileRegion,
        index: &'a SpatialIndex,
        stats: &mut RenderStats,
    ) -> Vec<&'a Tile> {
        let bounds = req.bounds();
        let found: Vec<&Tile> = if region == bounds {
            index.iter().collect()
        } else {
            region
                .cells()
                .filter_map(|(x, y)| index.get_tile(x, y))
                .collect()
        };

        found
            .into_iter()
            .filter(|tile| {
                if !bounds.contains(tile.x, tile.y) || !region.contains(tile.x, tile.y) {
                    tracing::debug!(x = tile.x, y = tile.y, "tile outside map bounds; skipped");
                    stats.tiles_skipped += 1;
                    return false;
                }
                if let Err(err) = self.loader.screen(&tile.tile_id) {
                    tracing::debug!(x = tile.x, y = tile.y, %err, "tile payload rejected");
                    stats.tiles_skipped += 1;
                    return false;
                }
                true
            })
            .collect()
    }

    /// Resolve and paint one layer's tiles. Returns `false` once the render budget is spent.
    fn paint_layer(
        &self,
        pass: &mut PaintPass<'_>,
        layer_index: usize,
        tiles: &[&Tile],
    ) -> TileMapResult<bool> {
        for chunk in tiles.chunks(RESOLVE_CHUNK) {
            if pass.cancel.is_cancelled() {
                return Err(TileMapError::Cancelled);
            }
            let now = Instant::now();
            if now >= pass.deadline {
                tracing::warn!(
                    painted = pass.stats.tiles_painted,
                    remaining = pass.total - pass.done,
                    "render budget exhausted; finishing with tiles painted so far"
                );
                pass.stats.budget_exhausted = true;
                return Ok(false);
            }

            let resolved: Vec<Result<TileBitmap, PayloadError>> = if self.opts.parallel {
                // Tiles of a chunk wait side by side, so one budget covers all of them.
                let budget = tile_budget(self.opts.tile_timeout, pass.deadline, now)
                    .unwrap_or(Duration::ZERO);
                chunk
                    .par_iter()
                    .map(|tile| self.loader.resolve_within(&tile.tile_id, budget, pass.cancel))
                    .collect()
            } else {
                chunk
                    .iter()
                    .map(|tile| {
                        match tile_budget(self.opts.tile_timeout, pass.deadline, Instant::now()) {
                            Some(budget) => {
                                self.loader.resolve_within(&tile.tile_id, budget, pass.cancel)
                            }
                            None => {
                                pass.stats.budget_exhausted = true;
                                Err(PayloadError::LoadTimeout(Duration::ZERO))
                            }
                        }
                    })
                    .collect()
            };

            for (tile, res) in chunk.iter().zip(resolved) {
                match res {
                    Ok(bitmap) => pass.paint(tile, &bitmap),
                    Err(PayloadError::Cancelled) => return Err(TileMapError::Cancelled),
                    Err(err) => {
                        tracing::warn!(x = tile.x, y = tile.y, %err, "tile failed to load; skipped");
                        pass.stats.tiles_failed += 1;
                    }
                }
                pass.tick(layer_index);
            }
        }
        Ok(true)
    }
}

impl MapRenderer for Compositor {
    fn render_map(
        &self,
        req: &RenderRequest,
        observer: &dyn ProgressObserver,
        cancel: &CancelToken,
    ) -> TileMapResult<RenderOutput> {
        self.render_with_progress(req, observer, cancel)
    }
}

struct PaintPass<'a> {
    canvas: &'a mut TileCanvas,
    region: TileRegion,
    tile_size: u32,
    observer: &'a dyn ProgressObserver,
    cancel: &'a CancelToken,
    deadline: Instant,
    total: usize,
    done: usize,
    stats: &'a mut RenderStats,
}

impl PaintPass<'_> {
    fn paint(&mut self, tile: &Tile, bitmap: &TileBitmap) {
        // Candidates are inside `region`, so both offsets are in range of the canvas.
        let col = (i64::from(tile.x) - i64::from(self.region.x)) as u32;
        let row = (i64::from(tile.y) - i64::from(self.region.y)) as u32;
        if self.canvas.paint_tile(
            bitmap,
            col * self.tile_size,
            row * self.tile_size,
            self.tile_size,
        ) {
            self.stats.tiles_painted += 1;
        }
    }

    fn tick(&mut self, layer_index: usize) {
        self.done += 1;
        if self.done.is_multiple_of(TILE_PROGRESS_EVERY) || self.done == self.total {
            self.observer.progress(
                tile_stage(layer_index, self.done, self.total),
                100,
                &format!("Rendering tiles... ({}/{})", self.done, self.total),
            );
        }
    }
}

/// Wait allowed for one tile started at `now`: the tile timeout, cut short by the render deadline.
/// `None` once the deadline has passed.
fn tile_budget(tile_timeout: Duration, deadline: Instant, now: Instant) -> Option<Duration> {
    let left = deadline.checked_duration_since(now)?;
    (!left.is_zero()).then(|| tile_timeout.min(left))
}

fn layer_stage(layer_index: usize) -> u32 {
    let stage = 25u64.saturating_add((layer_index as u64).saturating_mul(15));
    stage.min(u64::from(TILE_PHASE_MAX)) as u32
}

fn tile_stage(layer_index: usize, done: usize, total: usize) -> u32 {
    let share = if total == 0 {
        60
    } else {
        (done as u64).saturating_mul(60) / total as u64
    };
    let stage = u64::from(layer_stage(layer_index)).saturating_add(share);
    stage.min(u64::from(TILE_PHASE_MAX)) as u32
}

#[cfg(test)]
#[path = "../../tests/unit/render/compositor.rs"]
mod tests;
