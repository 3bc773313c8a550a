use crate::foundation::core::{CancelToken, duration_ms};
use crate::foundation::error::{TileMapError, TileMapResult};
use crate::foundation::timed::{RaceError, race};
use crate::model::map::RenderRequest;
use crate::render::canvas::EncodedImage;
use crate::render::compositor::{MapRenderer, ProgressObserver};
use crate::session::events::{EventBus, RenderEvent};
use crate::session::progress::{Progress, ProgressRecord, ProgressSnapshot, SessionState};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Options for [`RenderSession`] and [`crate::PreloadSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionOpts {
    /// Wall-clock limit for one background render.
    #[serde(with = "duration_ms")]
    pub hard_timeout: Duration,
    /// Tile ids warmed per preload batch.
    pub preload_batch_size: usize,
    /// Wait budget for preloading one tile.
    #[serde(with = "duration_ms")]
    pub preload_tile_timeout: Duration,
    /// Pause between preload batches.
    #[serde(with = "duration_ms")]
    pub preload_batch_pause: Duration,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            hard_timeout: Duration::from_secs(60),
            preload_batch_size: 10,
            preload_tile_timeout: Duration::from_secs(2),
            preload_batch_pause: Duration::from_millis(10),
        }
    }
}

/// Tracked background render with a single live progress record.
///
/// Only one render runs at a time; [`RenderSession::start`] fails with
/// [`TileMapError::SessionBusy`] while one is in flight. A run that outlives `hard_timeout` is
/// cancelled and reported as timed out; whatever it does afterwards is ignored.
pub struct RenderSession {
    renderer: Arc<dyn MapRenderer>,
    opts: SessionOpts,
    record: ProgressRecord,
    events: EventBus<RenderEvent>,
}

/// Waits for the outcome of a render started with [`RenderSession::start`].
pub struct RenderHandle {
    rx: Receiver<TileMapResult<EncodedImage>>,
}

impl RenderHandle {
    /// Block until the session completes, fails or times out.
    pub fn wait(self) -> TileMapResult<EncodedImage> {
        self.rx.recv().unwrap_or_else(|_| {
            Err(TileMapError::Other(anyhow::anyhow!(
                "render session ended without reporting a result"
            )))
        })
    }
}

impl RenderSession {
    pub fn new(renderer: Arc<dyn MapRenderer>, opts: SessionOpts) -> Self {
        Self {
            renderer,
            opts,
            record: ProgressRecord::new(),
            events: EventBus::new(),
        }
    }

    pub fn opts(&self) -> &SessionOpts {
        &self.opts
    }

    /// Polled view of the progress record.
    pub fn progress(&self) -> ProgressSnapshot {
        self.record.snapshot()
    }

    /// Receive `progress`, `complete` and `error` signals from now on.
    pub fn subscribe(&self) -> Receiver<RenderEvent> {
        self.events.subscribe()
    }

    /// Start rendering `req` in the background.
    #[tracing::instrument(skip_all, fields(width = req.width, height = req.height))]
    pub fn start(self: &Arc<Self>, req: RenderRequest) -> TileMapResult<RenderHandle> {
        let generation = self
            .record
            .begin(Progress::new(0, 100, "starting"))
            .ok_or(TileMapError::SessionBusy("render"))?;
        tracing::info!(generation, "render session started");

        let (tx, rx) = mpsc::sync_channel(1);
        let session = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("render-session".to_string())
            .spawn(move || {
                let outcome = session.supervise(generation, req);
                // The handle may have been dropped.
                let _ = tx.send(outcome);
            });
        if let Err(e) = spawned {
            let reason = format!("spawn render session: {e}");
            self.fail(generation, &reason);
            return Err(TileMapError::Other(anyhow::anyhow!(reason)));
        }
        Ok(RenderHandle { rx })
    }

    /// [`RenderSession::start`] and wait for the result.
    pub fn run(self: &Arc<Self>, req: RenderRequest) -> TileMapResult<EncodedImage> {
        self.start(req)?.wait()
    }

    fn supervise(self: Arc<Self>, generation: u64, req: RenderRequest) -> TileMapResult<EncodedImage> {
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let worker = Arc::clone(&self);
        let hard_timeout = self.opts.hard_timeout;

        let res = race("render-worker", hard_timeout, move || {
            let observer = SessionObserver {
                session: &worker,
                generation,
            };
            worker.renderer.render_map(&req, &observer, &worker_cancel)
        });

        match res {
            Ok(Ok(out)) => {
                self.complete(generation, out.image.clone());
                Ok(out.image)
            }
            Ok(Err(err)) => {
                self.fail(generation, &err.reason());
                Err(err)
            }
            Err(RaceError::TimedOut) => {
                cancel.cancel();
                self.time_out(generation, hard_timeout);
                Err(TileMapError::SessionTimeout(hard_timeout))
            }
            Err(RaceError::WorkerLost(msg)) => {
                self.fail(generation, &msg);
                Err(TileMapError::Other(anyhow::anyhow!(msg)))
            }
        }
    }

    fn complete(&self, generation: u64, image: EncodedImage) {
        let progress = Progress::new(100, 100, "completed").with_image(image.clone());
        let bytes = image.bytes.len();
        let done = self
            .record
            .finish(generation, SessionState::Completed, progress, |p| {
                self.events.emit(RenderEvent::Progress {
                    current: p.current,
                    total: p.total,
                    message: p.message.clone(),
                });
                self.events.emit(RenderEvent::Complete(image));
            });
        if done {
            tracing::info!(generation, bytes, "render session completed");
        }
    }

    fn fail(&self, generation: u64, reason: &str) {
        let done = self.record.finish(
            generation,
            SessionState::Failed,
            Progress::failed(reason),
            |_| self.events.emit(RenderEvent::Error(reason.to_string())),
        );
        if done {
            tracing::warn!(generation, reason, "render session failed");
        }
    }

    fn time_out(&self, generation: u64, after: Duration) {
        let reason = TileMapError::SessionTimeout(after).reason();
        let done = self.record.finish(
            generation,
            SessionState::TimedOut,
            Progress::failed(&reason),
            |_| self.events.emit(RenderEvent::Error(reason.clone())),
        );
        if done {
            tracing::warn!(generation, ?after, "render session timed out; worker abandoned");
        }
    }
}

/// Forwards compositor progress into the record and the event bus for one generation.
///
/// Reports at or past `total` are dropped: only [`RenderSession::complete`] may show a finished
/// stage, together with the image.
struct SessionObserver<'a> {
    session: &'a RenderSession,
    generation: u64,
}

impl ProgressObserver for SessionObserver<'_> {
    fn progress(&self, current: u32, total: u32, message: &str) {
        if current >= total {
            tracing::debug!(current, total, message, "final stage left to session completion");
            return;
        }
        self.session.record.update(self.generation, |p| {
            p.set(current, total, message);
            self.session.events.emit(RenderEvent::Progress {
                current,
                total,
                message: message.to_string(),
            });
        });
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/render_session.rs"]
mod tests;
