use crate::assets::loader::TilePayloadLoader;
use crate::foundation::core::{CancelToken, preview};
use crate::foundation::error::{TileMapError, TileMapResult};
use crate::model::map::RenderRequest;
use crate::render::canvas::EncodedImage;
use crate::session::events::{EventBus, PreloadEvent};
use crate::session::progress::{Progress, ProgressRecord, ProgressSnapshot, SessionState};
use crate::session::render_session::{RenderSession, SessionOpts};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;

/// Warms the decode cache for a set of tile ids in bounded batches, then runs a render.
///
/// The preload record stays running until the triggered render finishes.
pub struct PreloadSession {
    loader: Arc<TilePayloadLoader>,
    render: Arc<RenderSession>,
    opts: SessionOpts,
    record: ProgressRecord,
    events: EventBus<PreloadEvent>,
}

/// Waits for the render that follows a preload.
pub struct PreloadHandle {
    rx: Receiver<TileMapResult<EncodedImage>>,
}

impl PreloadHandle {
    pub fn wait(self) -> TileMapResult<EncodedImage> {
        self.rx.recv().unwrap_or_else(|_| {
            Err(TileMapError::Other(anyhow::anyhow!(
                "preload session ended without reporting a result"
            )))
        })
    }
}

impl PreloadSession {
    pub fn new(
        loader: Arc<TilePayloadLoader>,
        render: Arc<RenderSession>,
        opts: SessionOpts,
    ) -> Self {
        Self {
            loader,
            render,
            opts,
            record: ProgressRecord::new(),
            events: EventBus::new(),
        }
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.record.snapshot()
    }

    pub fn subscribe(&self) -> Receiver<PreloadEvent> {
        self.events.subscribe()
    }

    /// Preload `tile_ids` in the background, then render `req` through the render session.
    #[tracing::instrument(skip_all, fields(tiles = tile_ids.len()))]
    pub fn start(
        self: &Arc<Self>,
        tile_ids: Vec<String>,
        req: RenderRequest,
    ) -> TileMapResult<PreloadHandle> {
        let total = u32::try_from(tile_ids.len())
            .map_err(|_| TileMapError::validation("too many tile ids to preload"))?;
        let generation = self
            .record
            .begin(Progress::new(
                0,
                total,
                "Starting tile preloading and map rendering...",
            ))
            .ok_or(TileMapError::SessionBusy("preload"))?;
        tracing::info!(generation, total, "preload session started");

        let (tx, rx) = mpsc::sync_channel(1);
        let session = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("preload-session".to_string())
            .spawn(move || {
                let outcome = session.run(generation, &tile_ids, req);
                let _ = tx.send(outcome);
            });
        if let Err(e) = spawned {
            let reason = format!("spawn preload session: {e}");
            self.fail(generation, &reason);
            return Err(TileMapError::Other(anyhow::anyhow!(reason)));
        }
        Ok(PreloadHandle { rx })
    }

    fn run(
        &self,
        generation: u64,
        tile_ids: &[String],
        req: RenderRequest,
    ) -> TileMapResult<EncodedImage> {
        let total = tile_ids.len() as u32;
        let batch_size = self.opts.preload_batch_size.max(1);
        let cancel = CancelToken::new();
        let mut done = 0u32;

        for batch in tile_ids.chunks(batch_size) {
            batch.par_iter().for_each(|id| self.warm(id, &cancel));
            done += batch.len() as u32;

            let message = format!("Preloading tiles... ({done}/{total})");
            self.emit_progress(generation, done, total, &message);
            if done < total && !self.opts.preload_batch_pause.is_zero() {
                thread::sleep(self.opts.preload_batch_pause);
            }
        }

        self.emit_progress(
            generation,
            total,
            total,
            "Tiles preloaded, starting map rendering...",
        );
        self.events.emit(PreloadEvent::Complete { total });
        tracing::info!(generation, total, "tile preload complete");

        match self.render.run(req) {
            Ok(image) => {
                self.record.finish(
                    generation,
                    SessionState::Completed,
                    Progress::new(total, total, "completed").with_image(image.clone()),
                    |_| {},
                );
                Ok(image)
            }
            Err(err) => {
                self.fail(generation, &err.reason());
                Err(err)
            }
        }
    }

    fn warm(&self, id: &str, cancel: &CancelToken) {
        if let Err(err) = self.loader.screen(id) {
            tracing::debug!(tile = preview(id), %err, "preload skipped tile");
            return;
        }
        if let Err(err) = self
            .loader
            .resolve_within(id, self.opts.preload_tile_timeout, cancel)
        {
            tracing::warn!(tile = preview(id), %err, "preload failed for tile");
        }
    }

    fn emit_progress(&self, generation: u64, current: u32, total: u32, message: &str) {
        self.record.update(generation, |p| {
            p.set(current, total, message);
            self.events.emit(PreloadEvent::Progress {
                current,
                total,
                message: message.to_string(),
            });
        });
    }

    fn fail(&self, generation: u64, reason: &str) {
        let done = self.record.finish(
            generation,
            SessionState::Failed,
            Progress::failed(reason),
            |_| self.events.emit(PreloadEvent::Error(reason.to_string())),
        );
        if done {
            tracing::warn!(generation, reason, "preload session failed");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/preload_session.rs"]
mod tests;
