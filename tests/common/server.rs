//! Test server spawning and lifecycle management

use super::constants::*;
use super::fixtures::{cache_config, MockFetcher};
use reqwest::Url;
use sheetmusic_catalog::asset_cache::{AssetCache, SqliteCacheStorage};
use sheetmusic_catalog::server::{make_app, ServerConfig, ServerState};
use sheetmusic_catalog::RequestsLoggingLevel;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// The offline shell server bound to a random port, backed by a
/// [`MockFetcher`] standing in for the network.
///
/// The server runs until the value is dropped.
pub struct TestServer {
    pub base_url: String,
    pub port: u16,
    pub cache: Arc<AssetCache>,
    pub network: Arc<MockFetcher>,

    _temp_dir: TempDir,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a server whose cache has been installed and activated with
    /// [`SHELL_ASSETS`].
    pub async fn spawn() -> Self {
        let network = MockFetcher::with_shell();
        let server = Self::spawn_with(network, "v1").await;
        server.cache.install().await.expect("Failed to install cache");
        server.cache.activate().await.expect("Failed to activate cache");
        server
    }

    /// Spawns a server without touching the cache lifecycle.
    pub async fn spawn_with(network: Arc<MockFetcher>, version: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = SqliteCacheStorage::open(temp_dir.path().join("assets.db"))
            .await
            .expect("Failed to open asset storage");
        let cache = Arc::new(AssetCache::new(
            cache_config(version, SHELL_ASSETS),
            Arc::new(storage),
            network.clone(),
        ));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let app = make_app(ServerState {
            config: ServerConfig {
                requests_logging_level: RequestsLoggingLevel::None,
                port,
                origin: Url::parse(ORIGIN).unwrap(),
            },
            asset_cache: cache.clone(),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            port,
            cache,
            network,
            _temp_dir: temp_dir,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
