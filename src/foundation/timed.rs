use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Why a raced worker produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RaceError {
    /// The timer fired first. The worker keeps running until it observes cancellation.
    TimedOut,
    /// The worker could not be spawned or died without reporting.
    WorkerLost(String),
}

/// Run `work` on a named worker thread and wait at most `timeout` for it.
///
/// On timeout the worker is detached; pair `work` with a `CancelToken` so it stops early and
/// skips side effects.
pub(crate) fn race<T, F>(name: &str, timeout: Duration, work: F) -> Result<T, RaceError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel::<T>(1);
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            // Receiver may be gone after a timeout.
            let _ = tx.send(work());
        })
        .map_err(|e| RaceError::WorkerLost(format!("spawn {name} worker: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(v) => Ok(v),
        Err(RecvTimeoutError::Timeout) => Err(RaceError::TimedOut),
        Err(RecvTimeoutError::Disconnected) => {
            Err(RaceError::WorkerLost(format!("{name} worker panicked")))
        }
    }
}
