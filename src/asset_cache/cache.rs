//! Versioned offline cache for the application shell.
//!
//! One generation per application version, named `{prefix}{version}`. A
//! generation is filled on install, older generations with the same prefix
//! are dropped on activation, and from then on same-origin GETs are served
//! network first with the generation as fallback.

use super::fetcher::AssetFetcher;
use super::models::{cache_key, AssetRequest, AssetResponse, Served, ServedFrom};
use super::storage::CacheStorage;
use anyhow::{bail, Context, Result};
use reqwest::Url;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Documents tried, in order, when an offline request has no entry of its
/// own.
pub const ROOT_DOCUMENTS: &[&str] = &["./", "./index.html"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Active,
    /// Install failed and no complete generation was stored before.
    Redundant,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone)]
pub struct AssetCacheConfig {
    /// Base URL of the application. Asset paths are resolved against it and
    /// only requests to its origin are intercepted.
    pub origin: Url,
    pub cache_prefix: String,
    pub cache_version: String,
    /// Every path of the application shell. Anything not listed here is only
    /// available offline once it has been fetched online.
    pub asset_paths: Vec<String>,
}

impl AssetCacheConfig {
    pub fn cache_name(&self) -> String {
        format!("{}{}", self.cache_prefix, self.cache_version)
    }
}

pub struct AssetCache {
    config: AssetCacheConfig,
    storage: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn AssetFetcher>,
    state: Mutex<LifecycleState>,
}

impl AssetCache {
    pub fn new(
        config: AssetCacheConfig,
        storage: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
            state: Mutex::new(LifecycleState::Parsed),
        }
    }

    pub fn cache_name(&self) -> String {
        self.config.cache_name()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
            .lock()
            .map(|state| *state)
            .unwrap_or(LifecycleState::Redundant)
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("Asset cache state lock poisoned"))?;
        if *state != from {
            bail!("Cannot move asset cache from {} to {}", *state, to);
        }
        debug!("Asset cache {} -> {}", *state, to);
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: LifecycleState) {
        if let Ok(mut state) = self.state.lock() {
            *state = to;
        }
    }

    /// Pre-fetches every configured asset into the current generation.
    ///
    /// All or nothing: every asset is fetched before anything is written. If
    /// the fetch fails and the generation was already complete from an
    /// earlier run, that copy is kept and the install still succeeds.
    /// Otherwise any partial generation is deleted and the cache becomes
    /// `Redundant`.
    pub async fn install(&self) -> Result<()> {
        self.transition(LifecycleState::Parsed, LifecycleState::Installing)?;
        let cache_name = self.cache_name();
        info!(
            "Installing asset cache {} with {} asset(s)",
            cache_name,
            self.config.asset_paths.len()
        );
        let already_complete = self.is_complete(&cache_name).await;

        match self.precache(&cache_name).await {
            Ok(()) => {}
            Err(err) if already_complete => {
                warn!(
                    "Asset cache {} could not be refreshed, keeping the stored copy: {:#}",
                    cache_name, err
                );
            }
            Err(err) => {
                warn!("Asset cache install failed: {:#}", err);
                if let Err(cleanup_err) = self.storage.delete_cache(&cache_name).await {
                    warn!("Failed to discard partial cache {}: {:#}", cache_name, cleanup_err);
                }
                self.set_state(LifecycleState::Redundant);
                return Err(err);
            }
        }

        self.transition(LifecycleState::Installing, LifecycleState::Installed)?;
        // Nothing waits for older clients to go away: activation may follow
        // right away.
        info!("Asset cache {} installed, skipping wait", cache_name);
        Ok(())
    }

    async fn precache(&self, cache_name: &str) -> Result<()> {
        let mut fetched = Vec::with_capacity(self.config.asset_paths.len());
        for path in &self.config.asset_paths {
            let url = self.resolve(path)?;
            let request = AssetRequest::get(url);
            let response = self.fetcher.fetch(&request).await?;
            if !response.is_success() {
                bail!("Fetching {} returned status {}", request.url, response.status);
            }
            fetched.push((request.cache_key(), response));
        }

        for (key, response) in &fetched {
            self.storage.put(cache_name, key, response).await?;
        }
        Ok(())
    }

    /// Whether every configured asset has an entry in `cache_name`.
    async fn is_complete(&self, cache_name: &str) -> bool {
        for path in &self.config.asset_paths {
            let Ok(url) = self.resolve(path) else {
                return false;
            };
            if self.cached(cache_name, &cache_key(&url)).await.is_none() {
                return false;
            }
        }
        true
    }

    /// Deletes every other generation with this application's prefix and
    /// starts intercepting requests. Returns the deleted generation names.
    pub async fn activate(&self) -> Result<Vec<String>> {
        if self.state() != LifecycleState::Installed {
            bail!("Cannot activate asset cache in state {}", self.state());
        }
        let current = self.cache_name();

        let mut deleted = Vec::new();
        for name in self.storage.cache_names().await? {
            if name.starts_with(&self.config.cache_prefix) && name != current {
                self.storage.delete_cache(&name).await?;
                info!("Deleted stale asset cache {}", name);
                deleted.push(name);
            }
        }

        self.transition(LifecycleState::Installed, LifecycleState::Active)?;
        info!("Asset cache {} active, claiming clients", current);
        Ok(deleted)
    }

    /// Whether `request` goes through the cache policy at all.
    pub fn intercepts(&self, request: &AssetRequest) -> bool {
        self.state() == LifecycleState::Active
            && request.is_get()
            && request.url.origin() == self.config.origin.origin()
    }

    /// Answers a request.
    ///
    /// Intercepted requests never fail: network errors fall back to the
    /// cache, then to the root document, then to a synthetic 503. Requests
    /// that are not intercepted go to the network untouched and their
    /// network errors are returned.
    pub async fn handle(&self, request: &AssetRequest) -> Result<Served> {
        if !self.intercepts(request) {
            let response = self.fetcher.fetch(request).await?;
            return Ok(Served {
                response,
                from: ServedFrom::PassThrough,
            });
        }

        let cache_name = self.cache_name();
        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    if let Err(err) = self
                        .storage
                        .put(&cache_name, &request.cache_key(), &response)
                        .await
                    {
                        warn!("Failed to cache {}: {:#}", request.url, err);
                    }
                }
                Ok(Served {
                    response,
                    from: ServedFrom::Network,
                })
            }
            Err(err) => {
                debug!("Network failed for {}: {:#}", request.url, err);
                Ok(self.fallback(&cache_name, request).await)
            }
        }
    }

    async fn fallback(&self, cache_name: &str, request: &AssetRequest) -> Served {
        if let Some(response) = self.cached(cache_name, &request.cache_key()).await {
            return Served {
                response,
                from: ServedFrom::Cache,
            };
        }

        for root in ROOT_DOCUMENTS {
            let Ok(url) = self.resolve(root) else {
                continue;
            };
            if let Some(response) = self.cached(cache_name, &cache_key(&url)).await {
                debug!("Serving {} in place of {}", url, request.url);
                return Served {
                    response,
                    from: ServedFrom::RootDocument,
                };
            }
        }

        warn!("Nothing cached for {}, responding offline", request.url);
        Served {
            response: AssetResponse::offline(),
            from: ServedFrom::Offline,
        }
    }

    async fn cached(&self, cache_name: &str, key: &str) -> Option<AssetResponse> {
        match self.storage.get(cache_name, key).await {
            Ok(found) => found,
            Err(err) => {
                warn!("Failed to read {} from {}: {:#}", key, cache_name, err);
                None
            }
        }
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        self.config
            .origin
            .join(path)
            .with_context(|| format!("Invalid asset path {}", path))
    }
}
