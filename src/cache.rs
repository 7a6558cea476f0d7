use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::places::Coordinates;

/// A successful resolution as remembered by the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResolution {
    pub coordinates: Coordinates,
    pub display_name: Option<String>,
}

/// Process-lifetime memo of name → coordinates.
///
/// Keys are the exact queried strings; no trimming or case folding. Entries are
/// never evicted. Clones share the same map.
#[derive(Clone, Default)]
pub struct GeocodeCache {
    entries: Arc<RwLock<HashMap<String, CachedResolution>>>,
}

impl GeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<CachedResolution> {
        self.entries.read().get(name).cloned()
    }

    pub fn put(&self, name: impl Into<String>, resolution: CachedResolution) {
        self.entries.write().insert(name.into(), resolution);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
