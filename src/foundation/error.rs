use std::time::Duration;

/// Crate-wide result alias.
pub type TileMapResult<T> = Result<T, TileMapError>;

/// Errors surfaced by map rendering, stamping and sessions.
#[derive(thiserror::Error, Debug)]
pub enum TileMapError {
    /// Malformed request: bad dimensions, missing brush, negative anchor.
    #[error("validation error: {0}")]
    Validation(String),

    /// Stamp target layer id is not part of the supplied layer set.
    #[error("validation error: layer {0} not found")]
    LayerNotFound(i32),

    /// A single tile payload failed to load.
    #[error("decode error: {0}")]
    Decode(#[from] PayloadError),

    /// Final canvas could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// A tracked session exceeded its hard wall-clock timeout.
    #[error("session timed out after {0:?}")]
    SessionTimeout(Duration),

    /// Work was abandoned after its cancellation token fired.
    #[error("render cancelled")]
    Cancelled,

    /// A session of this kind is already running.
    #[error("{0} session is already running")]
    SessionBusy(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TileMapError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Short reason string suitable for the `error(reason)` signal.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Failure loading one tile payload.
///
/// These never abort a render: the compositor logs them and skips the tile.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("empty tile payload")]
    EmptyPayload,

    #[error("tile payload too large: {len} chars (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("tile payload too short: {len} chars (min {min})")]
    TooShort { len: usize, min: usize },

    #[error("malformed data URL: {0}")]
    MalformedDataUrl(&'static str),

    #[error("invalid base64: {0}")]
    InvalidBase64(String),

    #[error("base64 decode timed out after {0:?}")]
    DecodeTimeout(Duration),

    #[error("image decode timed out after {0:?}")]
    ImageDecodeTimeout(Duration),

    #[error("image decode failed: {0}")]
    ImageDecodeFailed(String),

    #[error("tile load timed out after {0:?}")]
    LoadTimeout(Duration),

    #[error("tile load cancelled")]
    Cancelled,
}

impl PayloadError {
    /// `true` for rejections made before any decode work starts.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyPayload
                | Self::PayloadTooLarge { .. }
                | Self::TooShort { .. }
                | Self::MalformedDataUrl(_)
                | Self::InvalidBase64(_)
        )
    }

    /// `true` when the failure came from a stage wait running out.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::DecodeTimeout(_) | Self::ImageDecodeTimeout(_) | Self::LoadTimeout(_)
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
