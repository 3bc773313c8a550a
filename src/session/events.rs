use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

use crate::render::canvas::EncodedImage;

/// Fan-out of session signals to any number of channel subscribers.
///
/// Subscribers whose receiver was dropped are pruned on the next emit.
pub struct EventBus<E> {
    subscribers: Mutex<Vec<Sender<E>>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn emit(&self, event: E) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Signals of a render session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderEvent {
    Progress {
        current: u32,
        total: u32,
        message: String,
    },
    Complete(EncodedImage),
    Error(String),
}

impl RenderEvent {
    /// Signal name an outer transport forwards this event under.
    pub fn signal(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Complete(_) => "complete",
            Self::Error(_) => "error",
        }
    }
}

/// Signals of a preload session. `Complete` fires when the cache is warm, before the render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreloadEvent {
    Progress {
        current: u32,
        total: u32,
        message: String,
    },
    Complete {
        total: u32,
    },
    Error(String),
}

impl PreloadEvent {
    pub fn signal(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error(_) => "error",
        }
    }
}
