//! Compiled-artifact cache
//!
//! Memoizes one artifact per (message catalog, selector map) pair. Keys use
//! the identity of the shared `Arc`s, not their contents: two equal catalogs
//! loaded separately get separate entries. Each slot keeps a clone of the
//! `Arc`s it is keyed by, so an address cannot be reused while its entry
//! lives. Entries are never evicted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::msgs::MessageCatalog;
use crate::renaming::CssRenamingMap;

/// Identity of a (catalog, selector map) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    catalog: usize,
    css_map: usize,
}

impl CacheKey {
    pub fn new(
        catalog: Option<&Arc<MessageCatalog>>,
        css_map: Option<&Arc<dyn CssRenamingMap>>,
    ) -> Self {
        Self {
            catalog: catalog.map_or(0, |c| Arc::as_ptr(c) as *const () as usize),
            css_map: css_map.map_or(0, |m| Arc::as_ptr(m) as *const () as usize),
        }
    }
}

struct CacheSlot<T> {
    _catalog: Option<Arc<MessageCatalog>>,
    _css_map: Option<Arc<dyn CssRenamingMap>>,
    value: OnceCell<Arc<T>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Populated entries
    pub entries: usize,
    /// Successful builds since the cache was created
    pub builds: usize,
}

/// Thread-safe memo table with at-most-once construction per key
///
/// Unrelated keys never contend: the map is sharded, and a slow build only
/// blocks callers waiting on the same key.
pub struct ArtifactCache<T> {
    slots: DashMap<CacheKey, Arc<CacheSlot<T>>>,
    builds: AtomicUsize,
}

impl<T> Default for ArtifactCache<T> {
    fn default() -> Self {
        Self {
            slots: DashMap::new(),
            builds: AtomicUsize::new(0),
        }
    }
}

impl<T> ArtifactCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The artifact for this pair, if it has been built
    pub fn get(
        &self,
        catalog: Option<&Arc<MessageCatalog>>,
        css_map: Option<&Arc<dyn CssRenamingMap>>,
    ) -> Option<Arc<T>> {
        let key = CacheKey::new(catalog, css_map);
        let slot = self.slots.get(&key)?;
        let value = slot.value.get().cloned();
        debug!(hit = value.is_some(), "artifact cache lookup");
        value
    }

    /// The artifact for this pair, building it on first use
    ///
    /// Concurrent callers for a cold key wait for a single build. A failed
    /// build leaves the key empty and the next caller tries again.
    pub fn get_or_build<E>(
        &self,
        catalog: Option<&Arc<MessageCatalog>>,
        css_map: Option<&Arc<dyn CssRenamingMap>>,
        build: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        let key = CacheKey::new(catalog, css_map);
        // Clone the slot out so no shard lock is held during the build
        let slot = self
            .slots
            .entry(key)
            .or_insert_with(|| {
                Arc::new(CacheSlot {
                    _catalog: catalog.cloned(),
                    _css_map: css_map.cloned(),
                    value: OnceCell::new(),
                })
            })
            .clone();

        if let Some(value) = slot.value.get() {
            debug!(?key, "artifact cache hit");
            return Ok(value.clone());
        }

        let result = slot
            .value
            .get_or_try_init(|| {
                debug!(?key, "artifact cache miss, building");
                match build() {
                    Ok(value) => {
                        self.builds.fetch_add(1, Ordering::SeqCst);
                        Ok(Arc::new(value))
                    }
                    Err(err) => {
                        warn!(?key, "artifact build failed");
                        Err(err)
                    }
                }
            })
            .cloned();
        if result.is_err() {
            // Drop the empty slot so it stops pinning the key's catalog and map
            self.slots
                .remove_if(&key, |_, slot| slot.value.get().is_none());
        }
        result
    }

    /// Number of populated entries
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.value().value.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            builds: self.builds(),
        }
    }
}
