use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::assets::cache::TileDecodeCache;
use crate::assets::decode::{TileBitmap, decode_base64, decode_bitmap};
use crate::assets::payload::{
    MAX_PAYLOAD_LEN, MIN_PAYLOAD_LEN, PayloadLimits, check_base64_alphabet, screen,
};
use crate::foundation::core::{CancelToken, duration_ms, preview};
use crate::foundation::error::PayloadError;
use crate::foundation::timed::{RaceError, race};

/// Limits and stage timeouts for [`TilePayloadLoader`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderOpts {
    /// Longest accepted payload in characters.
    pub max_payload_len: usize,
    /// Shortest accepted base64 body in characters.
    pub min_payload_len: usize,
    /// Wait budget for the base64 stage.
    #[serde(with = "duration_ms")]
    pub base64_timeout: Duration,
    /// Wait budget for the image codec stage.
    #[serde(with = "duration_ms")]
    pub image_decode_timeout: Duration,
}

impl Default for LoaderOpts {
    fn default() -> Self {
        Self {
            max_payload_len: MAX_PAYLOAD_LEN,
            min_payload_len: MIN_PAYLOAD_LEN,
            base64_timeout: Duration::from_secs(2),
            image_decode_timeout: Duration::from_secs(3),
        }
    }
}

impl LoaderOpts {
    pub fn limits(&self) -> PayloadLimits {
        PayloadLimits {
            min_len: self.min_payload_len,
            max_len: self.max_payload_len,
        }
    }
}

/// Validates and decodes tile payloads, filling the shared [`TileDecodeCache`].
///
/// Each decode stage runs on a worker thread raced against its timeout. A timed-out stage
/// cancels its token so the worker does not continue into later stages or write the cache.
pub struct TilePayloadLoader {
    opts: LoaderOpts,
    cache: Arc<TileDecodeCache>,
    decodes_started: AtomicU64,
}

impl TilePayloadLoader {
    pub fn new(opts: LoaderOpts, cache: Arc<TileDecodeCache>) -> Self {
        Self {
            opts,
            cache,
            decodes_started: AtomicU64::new(0),
        }
    }

    pub fn opts(&self) -> &LoaderOpts {
        &self.opts
    }

    pub fn cache(&self) -> &Arc<TileDecodeCache> {
        &self.cache
    }

    /// Number of payloads that got past validation into base64 decoding.
    pub fn decodes_started(&self) -> u64 {
        self.decodes_started.load(Ordering::Relaxed)
    }

    /// Synchronous length and data-URL screening; no decode work.
    pub fn screen<'a>(&self, payload: &'a str) -> Result<&'a str, PayloadError> {
        screen(payload, self.opts.limits())
    }

    /// Cache hit, or a full [`TilePayloadLoader::load`].
    pub fn resolve(&self, payload: &str, cancel: &CancelToken) -> Result<TileBitmap, PayloadError> {
        if let Some(bitmap) = self.cache.get(payload) {
            return Ok(bitmap);
        }
        self.load(payload, cancel)
    }

    /// Validate, decode and cache one payload, bypassing the cache lookup.
    pub fn load(&self, payload: &str, cancel: &CancelToken) -> Result<TileBitmap, PayloadError> {
        let body = self.screen(payload)?;
        check_base64_alphabet(body)?;
        if cancel.is_cancelled() {
            return Err(PayloadError::Cancelled);
        }

        self.decodes_started.fetch_add(1, Ordering::Relaxed);

        let stage_cancel = cancel.child();
        let body = body.to_owned();
        let bytes = timed_stage(
            "tile-base64",
            self.opts.base64_timeout,
            &stage_cancel,
            move || decode_base64(&body),
        )
        .map_err(|e| stage_error(e, PayloadError::DecodeTimeout(self.opts.base64_timeout)))?;

        if cancel.is_cancelled() {
            return Err(PayloadError::Cancelled);
        }

        let worker_cancel = stage_cancel.clone();
        let bitmap = timed_stage(
            "tile-image",
            self.opts.image_decode_timeout,
            &stage_cancel,
            move || {
                if worker_cancel.is_cancelled() {
                    return Err(PayloadError::Cancelled);
                }
                decode_bitmap(&bytes)
            },
        )
        .map_err(|e| {
            stage_error(
                e,
                PayloadError::ImageDecodeTimeout(self.opts.image_decode_timeout),
            )
        })?;

        if cancel.is_cancelled() {
            return Err(PayloadError::Cancelled);
        }
        self.cache.put(payload, bitmap.clone());
        tracing::debug!(
            payload = preview(payload),
            width = bitmap.width,
            height = bitmap.height,
            "tile decoded"
        );
        Ok(bitmap)
    }

    /// [`TilePayloadLoader::resolve`] on a worker thread under an overall `budget`.
    ///
    /// On timeout the worker's token is cancelled and [`PayloadError::LoadTimeout`] is returned.
    pub fn resolve_within(
        self: &Arc<Self>,
        payload: &str,
        budget: Duration,
        cancel: &CancelToken,
    ) -> Result<TileBitmap, PayloadError> {
        if let Some(bitmap) = self.cache.get(payload) {
            return Ok(bitmap);
        }
        if cancel.is_cancelled() {
            return Err(PayloadError::Cancelled);
        }

        let loader = self.clone();
        let owned = payload.to_owned();
        let worker_cancel = cancel.child();
        let token = worker_cancel.clone();
        match race("tile-load", budget, move || loader.load(&owned, &token)) {
            Ok(res) => res,
            Err(RaceError::TimedOut) => {
                worker_cancel.cancel();
                tracing::warn!(payload = preview(payload), ?budget, "tile load timed out");
                Err(PayloadError::LoadTimeout(budget))
            }
            Err(RaceError::WorkerLost(msg)) => Err(PayloadError::ImageDecodeFailed(msg)),
        }
    }
}

enum StageError {
    TimedOut,
    Failed(PayloadError),
}

fn stage_error(e: StageError, timeout: PayloadError) -> PayloadError {
    match e {
        StageError::TimedOut => timeout,
        StageError::Failed(e) => e,
    }
}

fn timed_stage<T, F>(
    name: &str,
    timeout: Duration,
    cancel: &CancelToken,
    work: F,
) -> Result<T, StageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PayloadError> + Send + 'static,
{
    match race(name, timeout, work) {
        Ok(res) => res.map_err(StageError::Failed),
        Err(RaceError::TimedOut) => {
            cancel.cancel();
            Err(StageError::TimedOut)
        }
        Err(RaceError::WorkerLost(msg)) => {
            Err(StageError::Failed(PayloadError::ImageDecodeFailed(msg)))
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/loader.rs"]
mod tests;
