//! Tracked background work: single-flight render and preload sessions with progress records
//! and signal fan-out.

pub(crate) mod events;
pub(crate) mod preload_session;
pub(crate) mod progress;
pub(crate) mod render_session;
