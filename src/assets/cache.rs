use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::assets::decode::TileBitmap;

/// Bounds for [`TileDecodeCache`]. A zero bound is treated as unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheOpts {
    /// Maximum decoded bytes retained across all entries.
    pub max_bytes: usize,
    /// Maximum number of retained entries.
    pub max_entries: usize,
}

impl Default for CacheOpts {
    fn default() -> Self {
        Self {
            max_bytes: 256 * 1024 * 1024,
            max_entries: 4096,
        }
    }
}

/// Counters since construction (or the last [`TileDecodeCache::clear`] for sizes).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

struct Entry {
    bitmap: TileBitmap,
    tick: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<Arc<str>, Entry>,
    // tick -> key; smallest tick is least recently used.
    recency: BTreeMap<u64, Arc<str>>,
    next_tick: u64,
    stats: CacheStats,
}

impl CacheInner {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        self.stats.bytes = self.stats.bytes.saturating_sub(entry.bitmap.byte_len());
        self.stats.entries = self.entries.len();
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.stats.bytes = self.stats.bytes.saturating_sub(entry.bitmap.byte_len());
            self.stats.entries = self.entries.len();
            self.stats.evictions += 1;
        }
        true
    }
}

/// Memo of decoded tiles keyed by the exact payload string (data-URL header included).
///
/// Least-recently-used entries are evicted once either bound in [`CacheOpts`] is exceeded.
/// Safe to share between threads.
pub struct TileDecodeCache {
    opts: CacheOpts,
    inner: Mutex<CacheInner>,
}

impl Default for TileDecodeCache {
    fn default() -> Self {
        Self::new(CacheOpts::default())
    }
}

impl TileDecodeCache {
    pub fn new(opts: CacheOpts) -> Self {
        Self {
            opts,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up `payload`, marking it most recently used.
    pub fn get(&self, payload: &str) -> Option<TileBitmap> {
        let mut inner = self.lock();
        let tick = inner.bump();
        let Some(entry) = inner.entries.get_mut(payload) else {
            inner.stats.misses += 1;
            return None;
        };
        let old_tick = std::mem::replace(&mut entry.tick, tick);
        let bitmap = entry.bitmap.clone();
        if let Some(key) = inner.recency.remove(&old_tick) {
            inner.recency.insert(tick, key);
        }
        inner.stats.hits += 1;
        Some(bitmap)
    }

    /// Presence check that does not touch recency or counters.
    pub fn contains(&self, payload: &str) -> bool {
        self.lock().entries.contains_key(payload)
    }

    /// Insert or replace `payload`, then evict down to the configured bounds.
    ///
    /// A bitmap larger than `max_bytes` on its own is not retained.
    pub fn put(&self, payload: &str, bitmap: TileBitmap) {
        let bytes = bitmap.byte_len();
        if self.opts.max_bytes != 0 && bytes > self.opts.max_bytes {
            tracing::debug!(bytes, "decoded tile exceeds cache byte budget; not cached");
            return;
        }

        let mut inner = self.lock();
        inner.remove(payload);

        while self.over_budget(&inner, bytes, 1) {
            if !inner.evict_lru() {
                break;
            }
        }

        let tick = inner.bump();
        let key: Arc<str> = Arc::from(payload);
        inner.recency.insert(tick, key.clone());
        inner.entries.insert(key, Entry { bitmap, tick });
        inner.stats.bytes += bytes;
        inner.stats.entries = inner.entries.len();
        inner.stats.inserts += 1;
    }

    fn over_budget(&self, inner: &CacheInner, extra_bytes: usize, extra_entries: usize) -> bool {
        let bytes_over = self.opts.max_bytes != 0
            && inner.stats.bytes.saturating_add(extra_bytes) > self.opts.max_bytes;
        let entries_over = self.opts.max_entries != 0
            && inner.entries.len().saturating_add(extra_entries) > self.opts.max_entries;
        bytes_over || entries_over
    }

    /// Drop every entry. Hit/miss counters are kept.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.recency.clear();
        inner.stats.bytes = 0;
        inner.stats.entries = 0;
        tracing::info!(dropped, "tile decode cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub fn opts(&self) -> CacheOpts {
        self.opts
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assets/cache.rs"]
mod tests;
