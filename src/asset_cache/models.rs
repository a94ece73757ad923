use reqwest::Url;
use serde::{Deserialize, Serialize};

/// A request as seen by the interception layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    pub method: String,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl AssetRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }

    /// The key under which a response to this request is cached. Fragments
    /// never reach the network, so they are not part of the key.
    pub fn cache_key(&self) -> String {
        cache_key(&self.url)
    }
}

pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

/// A complete response, either live from the network or stored in a cache
/// generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl AssetResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// What is returned when neither the network nor any cache can answer.
    pub fn offline() -> Self {
        Self {
            status: 503,
            headers: vec![(
                "content-type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            body: b"Offline and not cached".to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    /// Not intercepted, forwarded to the network as is.
    PassThrough,
    Network,
    Cache,
    /// The request itself was not cached, the shell document was served.
    RootDocument,
    Offline,
}

impl ServedFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServedFrom::PassThrough => "pass-through",
            ServedFrom::Network => "network",
            ServedFrom::Cache => "cache",
            ServedFrom::RootDocument => "root-document",
            ServedFrom::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    pub response: AssetResponse,
    pub from: ServedFrom,
}
