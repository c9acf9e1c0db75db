//! Bounded cache of rendered frames (thumbnails, scrub previews).
//!
//! Keys must carry a stable, caller-supplied asset identifier. There is
//! no fallback key derived from timestamps or content: an identifier
//! that is missing is a configuration error, not a cache miss.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use framefx_common::clock::TimestampNs;
use framefx_common::error::{FramefxError, FramefxResult};
use lru::LruCache;

use crate::buffer::FrameBuffer;

/// Stable identifier of a source asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetId(String);

impl AssetId {
    /// Rejects empty or whitespace-only identifiers.
    pub fn new(id: impl Into<String>) -> FramefxResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(FramefxError::config(
                "frame cache requires a non-empty stable asset identifier",
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Identifies one rendered frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub asset: AssetId,
    pub timestamp_ns: TimestampNs,
    /// Filter id, `None` for unfiltered frames.
    pub filter: Option<String>,
}

impl CacheKey {
    pub fn new(asset: AssetId, timestamp_ns: TimestampNs, filter: Option<&str>) -> Self {
        Self {
            asset,
            timestamp_ns,
            filter: filter.map(str::to_string),
        }
    }
}

/// Least-recently-used frame cache with a fixed entry capacity.
pub struct FrameCache {
    entries: Mutex<LruCache<CacheKey, FrameBuffer>>,
}

impl FrameCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a frame, marking it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<FrameBuffer> {
        self.lock().get(key).cloned()
    }

    /// Insert a frame. Returns the entry evicted to make room, if any.
    pub fn insert(&self, key: CacheKey, frame: FrameBuffer) -> Option<(CacheKey, FrameBuffer)> {
        let mut entries = self.lock();
        // `push` also hands back the old value when the key was present.
        let replacing = entries.contains(&key);
        let evicted = entries.push(key, frame);
        if replacing {
            None
        } else {
            evicted
        }
    }

    /// Drop every frame belonging to `asset`.
    pub fn invalidate_asset(&self, asset: &AssetId) -> usize {
        let mut entries = self.lock();
        let stale: Vec<CacheKey> = entries
            .iter()
            .filter(|(key, _)| &key.asset == asset)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, FrameBuffer>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
