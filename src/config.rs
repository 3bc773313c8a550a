use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::assets::cache::CacheOpts;
use crate::assets::loader::LoaderOpts;
use crate::foundation::error::{TileMapError, TileMapResult};
use crate::render::compositor::CompositorOpts;
use crate::session::render_session::SessionOpts;

/// Every tunable of a [`crate::MapService`], readable from one JSON document.
///
/// Missing sections and fields keep their defaults; durations are milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineOpts {
    pub loader: LoaderOpts,
    pub cache: CacheOpts,
    pub compositor: CompositorOpts,
    pub session: SessionOpts,
}

impl EngineOpts {
    pub fn from_reader<R: std::io::Read>(r: R) -> TileMapResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| TileMapError::validation(format!("parse engine config JSON: {e}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> TileMapResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            TileMapError::validation(format!("open engine config '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }
}
