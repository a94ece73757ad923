//! Offline availability of the application's own static assets.

mod cache;
mod fetcher;
mod models;
mod storage;

pub use cache::{AssetCache, AssetCacheConfig, LifecycleState, ROOT_DOCUMENTS};
pub use fetcher::{AssetFetcher, HttpAssetFetcher};
pub use models::{cache_key, AssetRequest, AssetResponse, Served, ServedFrom};
pub use storage::{CacheStorage, SqliteCacheStorage};
