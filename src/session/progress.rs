use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::foundation::core::unix_timestamp;
use crate::render::canvas::EncodedImage;

/// Progress of one tracked session, as polled or serialized for an outer transport.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub current: u32,
    pub total: u32,
    pub message: String,
    /// `false` once the session failed or timed out.
    pub success: bool,
    /// Seconds since the Unix epoch of the last change.
    pub timestamp: i64,
    /// Final render; serialized as standard base64.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_image_data"
    )]
    pub image_data: Option<EncodedImage>,
}

impl Progress {
    pub fn new(current: u32, total: u32, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            success: true,
            timestamp: unix_timestamp(),
            image_data: None,
        }
    }

    /// `(0, 100, "failed: <reason>")`.
    pub fn failed(reason: &str) -> Self {
        Self {
            success: false,
            ..Self::new(0, 100, format!("failed: {reason}"))
        }
    }

    pub fn with_image(mut self, image: EncodedImage) -> Self {
        self.image_data = Some(image);
        self
    }

    pub(crate) fn set(&mut self, current: u32, total: u32, message: &str) {
        self.current = current;
        self.total = total;
        message.clone_into(&mut self.message);
        self.timestamp = unix_timestamp();
    }
}

fn serialize_image_data<S: serde::Serializer>(
    image: &Option<EncodedImage>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match image {
        Some(image) => s.serialize_str(&image.to_base64()),
        None => s.serialize_none(),
    }
}

/// Lifecycle of a tracked session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

/// Read-locked copy of a session's progress record.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    #[serde(flatten)]
    pub progress: Progress,
    pub state: SessionState,
    pub is_running: bool,
}

struct RecordInner {
    generation: u64,
    state: SessionState,
    progress: Progress,
}

/// Single live progress record guarded by a read/write lock.
///
/// Each run claims a generation number in [`ProgressRecord::begin`]. Mutations carry that number
/// and are dropped unless it is still the current, running generation, so an abandoned run can
/// never overwrite a newer state. Callbacks passed to `update`/`finish` run under the write lock,
/// which keeps signal order identical to record order.
pub(crate) struct ProgressRecord {
    inner: RwLock<RecordInner>,
}

impl ProgressRecord {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(RecordInner {
                generation: 0,
                state: SessionState::Idle,
                progress: Progress::new(0, 0, "idle"),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RecordInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RecordInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter `Running` with `initial` progress. `None` while a run is active.
    pub(crate) fn begin(&self, initial: Progress) -> Option<u64> {
        let mut inner = self.write();
        if inner.state == SessionState::Running {
            return None;
        }
        inner.generation += 1;
        inner.state = SessionState::Running;
        inner.progress = initial;
        Some(inner.generation)
    }

    /// Apply `f` if `generation` is still running. Returns `None` for stale generations.
    pub(crate) fn update<R>(
        &self,
        generation: u64,
        f: impl FnOnce(&mut Progress) -> R,
    ) -> Option<R> {
        let mut inner = self.write();
        if inner.generation != generation || inner.state != SessionState::Running {
            return None;
        }
        Some(f(&mut inner.progress))
    }

    /// Move `generation` to terminal `state`, then run `on_finish`. Only the first call for a
    /// running generation has any effect.
    pub(crate) fn finish(
        &self,
        generation: u64,
        state: SessionState,
        progress: Progress,
        on_finish: impl FnOnce(&Progress),
    ) -> bool {
        debug_assert!(state.is_terminal());
        let mut inner = self.write();
        if inner.generation != generation || inner.state != SessionState::Running {
            return false;
        }
        inner.state = state;
        inner.progress = progress;
        on_finish(&inner.progress);
        true
    }

    pub(crate) fn snapshot(&self) -> ProgressSnapshot {
        let inner = self.read();
        ProgressSnapshot {
            progress: inner.progress.clone(),
            state: inner.state,
            is_running: inner.state == SessionState::Running,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/progress.rs"]
mod tests;
