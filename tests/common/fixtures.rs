//! Test doubles and store setup shared by the end-to-end tests.

use super::constants::*;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sheetmusic_catalog::asset_cache::{
    cache_key, AssetCacheConfig, AssetFetcher, AssetRequest, AssetResponse,
};
use sheetmusic_catalog::{Clock, SqliteRecordStore, SqliteWatermarkStore, SyncEngine};
use reqwest::Url;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A clock that only moves when told to.
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new() -> Arc<Self> {
        let start = DateTime::parse_from_rfc3339(START_TIME)
            .unwrap()
            .with_timezone(&Utc);
        Arc::new(Self(Mutex::new(start)))
    }

    pub fn advance_minutes(&self, minutes: i64) {
        *self.0.lock().unwrap() += Duration::minutes(minutes);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

/// Fake network: serves registered pages, fails everything else, and can be
/// switched offline.
pub struct MockFetcher {
    pages: Mutex<HashMap<String, AssetResponse>>,
    offline: Mutex<bool>,
    call_counts: Mutex<HashMap<String, usize>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(HashMap::new()),
            offline: Mutex::new(false),
            call_counts: Mutex::new(HashMap::new()),
        })
    }

    /// A network that serves the shell assets.
    pub fn with_shell() -> Arc<Self> {
        let fetcher = Self::new();
        fetcher.add_page("./index.html", INDEX_HTML, "text/html");
        fetcher.add_page("./app.js", APP_JS, "text/javascript");
        fetcher
    }

    /// Registers `body` under `path` resolved against [`ORIGIN`].
    pub fn add_page(&self, path: &str, body: &str, content_type: &str) {
        let url = Url::parse(ORIGIN).unwrap().join(path).unwrap();
        self.add_response(
            url.as_str(),
            AssetResponse {
                status: 200,
                headers: vec![("content-type".to_string(), content_type.to_string())],
                body: body.as_bytes().to_vec(),
            },
        );
    }

    pub fn add_response(&self, url: &str, response: AssetResponse) {
        self.pages.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub fn get_call_count(&self, url: &str) -> usize {
        *self.call_counts.lock().unwrap().get(url).unwrap_or(&0)
    }
}

#[async_trait]
impl AssetFetcher for MockFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse> {
        let key = cache_key(&request.url);
        *self
            .call_counts
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert(0) += 1;

        if *self.offline.lock().unwrap() {
            bail!("Network unreachable");
        }
        match self.pages.lock().unwrap().get(&key) {
            Some(response) => Ok(response.clone()),
            None => bail!("Connection refused for {}", key),
        }
    }
}

pub fn cache_config(version: &str, assets: &[&str]) -> AssetCacheConfig {
    AssetCacheConfig {
        origin: Url::parse(ORIGIN).unwrap(),
        cache_prefix: CACHE_PREFIX.to_string(),
        cache_version: version.to_string(),
        asset_paths: assets.iter().map(|path| path.to_string()).collect(),
    }
}

/// One installation of the catalog, with its databases in a temp dir.
pub struct TestDevice {
    pub store: Arc<SqliteRecordStore>,
    pub watermark: Arc<SqliteWatermarkStore>,
    pub clock: Arc<FixedClock>,
    pub engine: SyncEngine,
    pub dir: TempDir,
}

impl TestDevice {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteRecordStore::open(dir.path().join("catalog.db"))
                .await
                .expect("Failed to open catalog store"),
        );
        let watermark = Arc::new(
            SqliteWatermarkStore::open(dir.path().join("state.db"))
                .await
                .expect("Failed to open state store"),
        );
        let clock = FixedClock::new();
        let engine = SyncEngine::new(store.clone(), watermark.clone(), clock.clone());
        Self {
            store,
            watermark,
            clock,
            engine,
            dir,
        }
    }
}
