use std::sync::Arc;
use std::sync::mpsc::Receiver;

use crate::assets::cache::{CacheStats, TileDecodeCache};
use crate::assets::loader::TilePayloadLoader;
use crate::config::EngineOpts;
use crate::edit::stamp::{StampEditor, StampOutcome};
use crate::foundation::error::TileMapResult;
use crate::model::map::{RenderRequest, StampRequest};
use crate::render::canvas::EncodedImage;
use crate::render::compositor::Compositor;
use crate::session::events::{PreloadEvent, RenderEvent};
use crate::session::preload_session::{PreloadHandle, PreloadSession};
use crate::session::progress::ProgressSnapshot;
use crate::session::render_session::{RenderHandle, RenderSession};

/// One map-editing backend: a decode cache shared by a compositor, a stamp editor, and the
/// render and preload sessions.
///
/// Instances are independent; nothing is process-global.
pub struct MapService {
    opts: EngineOpts,
    loader: Arc<TilePayloadLoader>,
    compositor: Arc<Compositor>,
    stamp: StampEditor,
    render: Arc<RenderSession>,
    preload: Arc<PreloadSession>,
}

impl Default for MapService {
    fn default() -> Self {
        Self::new(EngineOpts::default())
    }
}

impl MapService {
    pub fn new(opts: EngineOpts) -> Self {
        let cache = Arc::new(TileDecodeCache::new(opts.cache));
        let loader = Arc::new(TilePayloadLoader::new(opts.loader, cache));
        let compositor = Arc::new(Compositor::new(loader.clone(), opts.compositor));
        let render = Arc::new(RenderSession::new(compositor.clone(), opts.session));
        let preload = Arc::new(PreloadSession::new(
            loader.clone(),
            render.clone(),
            opts.session,
        ));
        Self {
            opts,
            loader,
            stamp: StampEditor::new(compositor.clone()),
            compositor,
            render,
            preload,
        }
    }

    pub fn opts(&self) -> &EngineOpts {
        &self.opts
    }

    pub fn loader(&self) -> &Arc<TilePayloadLoader> {
        &self.loader
    }

    /// Render on the calling thread, without touching the render session record.
    pub fn render_map(&self, req: &RenderRequest) -> TileMapResult<EncodedImage> {
        self.compositor.render(req)
    }

    /// Render through the tracked render session.
    pub fn start_render(&self, req: RenderRequest) -> TileMapResult<RenderHandle> {
        self.render.start(req)
    }

    /// Warm the cache for `tile_ids`, then render `req` through the render session.
    pub fn preload_and_render(
        &self,
        tile_ids: Vec<String>,
        req: RenderRequest,
    ) -> TileMapResult<PreloadHandle> {
        self.preload.start(tile_ids, req)
    }

    pub fn stamp_tile(&self, req: StampRequest) -> TileMapResult<StampOutcome> {
        self.stamp.apply(req)
    }

    pub fn clear_tile_cache(&self) {
        self.loader.cache().clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.loader.cache().stats()
    }

    pub fn render_progress(&self) -> ProgressSnapshot {
        self.render.progress()
    }

    pub fn preload_progress(&self) -> ProgressSnapshot {
        self.preload.progress()
    }

    pub fn subscribe_render(&self) -> Receiver<RenderEvent> {
        self.render.subscribe()
    }

    pub fn subscribe_preload(&self) -> Receiver<PreloadEvent> {
        self.preload.subscribe()
    }
}
