//! Network access for the asset cache.

use super::models::{AssetRequest, AssetResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use std::time::Duration;
use tracing::debug;

/// Performs a request against the network. An `Err` means the network could
/// not be reached at all; HTTP error statuses are returned as responses.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse>;
}

pub struct HttpAssetFetcher {
    client: reqwest::Client,
}

impl HttpAssetFetcher {
    pub fn new(timeout_sec: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .with_context(|| format!("Invalid method {}", request.method))?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            // Headers that do not survive the round trip are dropped
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                builder = builder.header(name, value);
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", request.url))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", request.url))?
            .to_vec();

        debug!("{} {} -> {}", request.method, request.url, status);
        Ok(AssetResponse {
            status,
            headers,
            body,
        })
    }
}
