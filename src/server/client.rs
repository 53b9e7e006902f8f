//! Cached client facade over the index server.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::api::ServerApi;
use super::installed::InstalledMods;
use crate::cache::ServerCaches;
use crate::request::ServerRequest;
use crate::transport::{ReqwestTransport, Transport};
use crate::types::config::Config;
use crate::types::errors::ModIndexResult;
use crate::types::models::{
    InstalledMod, ModVersionSelector, ModsQuery, ServerModMetadata, ServerModUpdate,
    ServerModVersion, ServerModsList, ServerTag,
};

/// Entry point for talking to the index server.
///
/// Every fetch takes a `use_cache` flag. Cached fetches go through the
/// [`ServerCaches`] registry, so concurrent callers asking for the same
/// resource share one request. Cloning the client shares the caches.
#[derive(Clone, Debug)]
pub struct ServerClient {
    api: Arc<ServerApi>,
    caches: Arc<ServerCaches>,
}

impl ServerClient {
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        installed: Arc<dyn InstalledMods>,
    ) -> Self {
        let api = Arc::new(ServerApi::new(
            config.server.clone(),
            transport,
            installed,
            config.cache.max_batch_size,
        ));
        let caches = Arc::new(ServerCaches::new(&api, config.cache.size_limit));
        Self { api, caches }
    }

    /// Client using the HTTP transport configured in `config`.
    pub fn from_config(
        config: &Config,
        installed: Arc<dyn InstalledMods>,
    ) -> ModIndexResult<Self> {
        let transport = Arc::new(ReqwestTransport::from_config(&config.server)?);
        Ok(Self::new(config, transport, installed))
    }

    pub fn api(&self) -> &ServerApi {
        &self.api
    }

    pub fn caches(&self) -> &ServerCaches {
        &self.caches
    }

    pub fn get_mods(&self, query: &ModsQuery, use_cache: bool) -> ServerRequest<ServerModsList> {
        if use_cache {
            return self.caches.mods().get_fresh(query);
        }
        self.api.fetch_mods(query)
    }

    pub fn get_mod(&self, id: &str, use_cache: bool) -> ServerRequest<ServerModMetadata> {
        if use_cache {
            return self.caches.mod_metadata().get_fresh(&id.to_string());
        }
        self.api.fetch_mod(id)
    }

    pub fn get_mod_version(
        &self,
        id: &str,
        selector: &ModVersionSelector,
        use_cache: bool,
    ) -> ServerRequest<ServerModVersion> {
        if use_cache {
            return self.caches.mod_versions().get_fresh(&(id.to_string(), selector.clone()));
        }
        self.api.fetch_mod_version(id, selector)
    }

    pub fn get_mod_logo(&self, id: &str, use_cache: bool) -> ServerRequest<Vec<u8>> {
        if use_cache {
            return self.caches.mod_logos().get_fresh(&id.to_string());
        }
        self.api.fetch_mod_logo(id)
    }

    pub fn get_tags(&self, use_cache: bool) -> ServerRequest<Vec<ServerTag>> {
        if use_cache {
            return self.caches.tags().get_fresh(&());
        }
        self.api.fetch_tags()
    }

    /// Update check for every installed mod, batched when needed.
    pub fn check_all_updates(&self, use_cache: bool) -> ServerRequest<Vec<ServerModUpdate>> {
        if use_cache {
            return self.caches.all_updates().get_fresh(&());
        }
        self.api.check_all_updates()
    }

    /// The update available for `installed`, if any.
    ///
    /// Derived from the cached all-updates check, so checking many mods one
    /// by one still sends a single (batched) update check. Cancelling the
    /// returned request does not cancel that shared check.
    pub fn check_updates(&self, installed: &InstalledMod) -> ServerRequest<Option<ServerModUpdate>> {
        let installed = installed.clone();
        self.check_all_updates(true).map_shared(
            format!("Check updates for {}", installed.id),
            move |updates| {
                Ok(updates
                    .into_iter()
                    .find(|update| update.is_update_for(&installed)))
            },
        )
    }

    /// One update check request for `ids`, without batching or caching.
    pub fn batched_check_updates(&self, ids: &[String]) -> ServerRequest<Vec<ServerModUpdate>> {
        self.api.batched_check_updates(ids)
    }

    /// Clears the per-query caches; global caches only if `include_global`.
    pub fn clear_caches(&self, include_global: bool) {
        self.caches.clear(include_global);
    }

    /// Re-limits (and therefore clears) every cache.
    pub fn set_cache_size_limit(&self, limit: usize) {
        self.caches.limit_all(limit);
    }

    /// Applies every new value published on `limits` as the cache size limit.
    ///
    /// The task ends when the sender is dropped.
    pub fn watch_cache_size_limit(&self, mut limits: watch::Receiver<usize>) -> JoinHandle<()> {
        let caches = Arc::clone(&self.caches);
        tokio::spawn(async move {
            while limits.changed().await.is_ok() {
                let limit = *limits.borrow_and_update();
                caches.limit_all(limit);
            }
            tracing::debug!("Cache size limit source closed");
        })
    }
}
