//! Process-wide registry of request caches, one per resource kind.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::dedup::FunCache;
use super::ordered::CacheStats;
use crate::server::ServerApi;
use crate::types::models::{
    ModVersionSelector, ModsQuery, ServerModMetadata, ServerModUpdate, ServerModVersion,
    ServerModsList, ServerTag,
};

/// Identifies one cache in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Mods,
    ModMetadata,
    ModVersion,
    ModLogo,
    Tags,
    AllUpdates,
}

impl CacheKind {
    /// Every kind, in initialization order.
    pub const ALL: [CacheKind; 6] = [
        CacheKind::Mods,
        CacheKind::ModMetadata,
        CacheKind::ModVersion,
        CacheKind::ModLogo,
        CacheKind::Tags,
        CacheKind::AllUpdates,
    ];

    /// Global caches hold data independent of any query and are only
    /// cleared on request.
    pub fn is_global(&self) -> bool {
        matches!(self, CacheKind::Tags | CacheKind::AllUpdates)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Mods => "mods",
            CacheKind::ModMetadata => "mod_metadata",
            CacheKind::ModVersion => "mod_version",
            CacheKind::ModLogo => "mod_logo",
            CacheKind::Tags => "tags",
            CacheKind::AllUpdates => "all_updates",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-erased view of a cache, for operations that do not care about the
/// cached value type.
pub trait ManagedCache: Send + Sync {
    fn name(&self) -> &'static str;
    fn size(&self) -> usize;
    fn limit(&self) -> usize;
    /// Sets a new limit; this also clears the cache.
    fn set_limit(&self, limit: usize);
    fn clear(&self);

    fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.size(),
            limit: self.limit(),
        }
    }
}

impl<A, V> ManagedCache for FunCache<A, V>
where
    A: Clone + PartialEq + fmt::Debug + Send,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        FunCache::name(self)
    }

    fn size(&self) -> usize {
        FunCache::size(self)
    }

    fn limit(&self) -> usize {
        FunCache::limit(self)
    }

    fn set_limit(&self, limit: usize) {
        FunCache::set_limit(self, limit);
    }

    fn clear(&self) {
        FunCache::clear(self);
    }
}

/// All request caches of a client.
///
/// Built explicitly from a [`ServerApi`]; each cache wraps the matching
/// uncached fetch function.
pub struct ServerCaches {
    mods: FunCache<ModsQuery, ServerModsList>,
    mod_metadata: FunCache<String, ServerModMetadata>,
    mod_versions: FunCache<(String, ModVersionSelector), ServerModVersion>,
    mod_logos: FunCache<String, Vec<u8>>,
    tags: FunCache<(), Vec<ServerTag>>,
    all_updates: FunCache<(), Vec<ServerModUpdate>>,
    configured_limit: AtomicUsize,
}

impl ServerCaches {
    pub fn new(api: &Arc<ServerApi>, limit: usize) -> Self {
        let mods_api = Arc::clone(api);
        let metadata_api = Arc::clone(api);
        let versions_api = Arc::clone(api);
        let logos_api = Arc::clone(api);
        let tags_api = Arc::clone(api);
        let updates_api = Arc::clone(api);

        Self {
            mods: FunCache::with_limit(CacheKind::Mods.as_str(), limit, move |query: &ModsQuery| {
                mods_api.fetch_mods(query)
            }),
            mod_metadata: FunCache::with_limit(
                CacheKind::ModMetadata.as_str(),
                limit,
                move |id: &String| metadata_api.fetch_mod(id),
            ),
            mod_versions: FunCache::with_limit(
                CacheKind::ModVersion.as_str(),
                limit,
                move |(id, selector): &(String, ModVersionSelector)| {
                    versions_api.fetch_mod_version(id, selector)
                },
            ),
            mod_logos: FunCache::with_limit(
                CacheKind::ModLogo.as_str(),
                limit,
                move |id: &String| logos_api.fetch_mod_logo(id),
            ),
            tags: FunCache::with_limit(CacheKind::Tags.as_str(), limit, move |_: &()| {
                tags_api.fetch_tags()
            }),
            all_updates: FunCache::with_limit(
                CacheKind::AllUpdates.as_str(),
                limit,
                move |_: &()| updates_api.check_all_updates(),
            ),
            configured_limit: AtomicUsize::new(limit),
        }
    }

    pub fn mods(&self) -> &FunCache<ModsQuery, ServerModsList> {
        &self.mods
    }

    pub fn mod_metadata(&self) -> &FunCache<String, ServerModMetadata> {
        &self.mod_metadata
    }

    pub fn mod_versions(&self) -> &FunCache<(String, ModVersionSelector), ServerModVersion> {
        &self.mod_versions
    }

    pub fn mod_logos(&self) -> &FunCache<String, Vec<u8>> {
        &self.mod_logos
    }

    pub fn tags(&self) -> &FunCache<(), Vec<ServerTag>> {
        &self.tags
    }

    pub fn all_updates(&self) -> &FunCache<(), Vec<ServerModUpdate>> {
        &self.all_updates
    }

    /// Looks up a cache by kind.
    pub fn cache(&self, kind: CacheKind) -> &dyn ManagedCache {
        match kind {
            CacheKind::Mods => &self.mods,
            CacheKind::ModMetadata => &self.mod_metadata,
            CacheKind::ModVersion => &self.mod_versions,
            CacheKind::ModLogo => &self.mod_logos,
            CacheKind::Tags => &self.tags,
            CacheKind::AllUpdates => &self.all_updates,
        }
    }

    /// Re-limits every cache, which also clears them.
    pub fn limit_all(&self, limit: usize) {
        for kind in CacheKind::ALL {
            self.cache(kind).set_limit(limit);
        }
        self.configured_limit.store(limit, Ordering::Relaxed);
        tracing::info!(limit, "Cache size limit updated");
    }

    /// Clears the per-query caches, and the global ones too if asked.
    pub fn clear(&self, include_global: bool) {
        for kind in CacheKind::ALL {
            if include_global || !kind.is_global() {
                self.cache(kind).clear();
            }
        }
        tracing::debug!(include_global, "Caches cleared");
    }

    /// Clears everything and restores the last configured limit.
    pub fn reset(&self) {
        let limit = self.configured_limit.load(Ordering::Relaxed);
        for kind in CacheKind::ALL {
            self.cache(kind).set_limit(limit);
        }
    }

    pub fn configured_limit(&self) -> usize {
        self.configured_limit.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> Vec<(CacheKind, CacheStats)> {
        CacheKind::ALL
            .into_iter()
            .map(|kind| (kind, self.cache(kind).stats()))
            .collect()
    }
}

impl fmt::Debug for ServerCaches {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (kind, stats) in self.stats() {
            map.entry(&kind.as_str(), &stats);
        }
        map.finish()
    }
}
