//! Tile payload handling: screening, decoding, caching and timed loading.

pub(crate) mod cache;
pub(crate) mod decode;
pub(crate) mod loader;
pub(crate) mod payload;
