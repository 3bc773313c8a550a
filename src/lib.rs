//! Tilecomp is the rendering backend of a tile-based 2D map editor.
//!
//! A map is a grid of `width x height` cells, each `tile_size` pixels square, covered by an
//! ordered stack of layers. Every placed tile carries its image inline as a base64 payload
//! (usually a `data:image/...;base64,` URL).
//!
//! # Pipeline overview
//!
//! 1. **Screen**: reject empty, oversized, truncated or malformed payloads before any decode.
//! 2. **Load**: base64 then image decode, each stage under its own timeout, with results kept in
//!    a bounded [`TileDecodeCache`].
//! 3. **Composite**: layers bottom to top over a white or checkerboard base, straight-alpha
//!    `over`, optional grid, PNG out ([`Compositor`]).
//! 4. **Track**: single-flight [`RenderSession`] and [`PreloadSession`] with pollable progress
//!    and `progress` / `complete` / `error` signals.
//!
//! Stamping a multi-cell brush onto a layer and re-rendering only the touched region is handled
//! by [`StampEditor`]. [`MapService`] wires all of it behind one handle.
//!
//! Per-tile failures never abort a render: a tile that cannot be screened, decoded or loaded in
//! time is skipped and its cell keeps whatever lies beneath it.
#![forbid(unsafe_code)]

mod assets;
mod config;
mod edit;
mod foundation;
mod index;
mod model;
mod render;
mod service;
mod session;

pub use assets::cache::{CacheOpts, CacheStats, TileDecodeCache};
pub use assets::decode::{MAX_TILE_SIDE, TileBitmap, decode_bitmap};
pub use assets::loader::{LoaderOpts, TilePayloadLoader};
pub use assets::payload::{MAX_PAYLOAD_LEN, MIN_PAYLOAD_LEN, PayloadLimits, screen};
pub use config::EngineOpts;
pub use edit::stamp::{StampEditor, StampOutcome};
pub use foundation::core::{CancelToken, Rgba8, TileRegion, unix_timestamp};
pub use foundation::error::{PayloadError, TileMapError, TileMapResult};
pub use index::spatial::SpatialIndex;
pub use model::map::{Layer, RenderRequest, SelectedTile, StampRequest, Tile, collect_tile_ids};
pub use render::canvas::{EncodedFormat, EncodedImage, MAX_CANVAS_PIXELS, TileCanvas};
pub use render::composite::{StraightRgba8, over, over_span};
pub use render::compositor::{
    Compositor, CompositorOpts, MapRenderer, NoProgress, ProgressObserver, RenderOutput,
    RenderStats,
};
pub use service::MapService;
pub use session::events::{EventBus, PreloadEvent, RenderEvent};
pub use session::preload_session::{PreloadHandle, PreloadSession};
pub use session::progress::{Progress, ProgressSnapshot, SessionState};
pub use session::render_session::{RenderHandle, RenderSession, SessionOpts};
