use super::ServerConfig;
use crate::asset_cache::AssetCache;
use std::sync::Arc;

pub type GuardedAssetCache = Arc<AssetCache>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub asset_cache: GuardedAssetCache,
}
