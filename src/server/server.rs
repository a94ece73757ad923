use super::state::ServerState;
use super::{log_requests, ServerConfig, SOURCE_HEADER};
use crate::asset_cache::{AssetCache, AssetRequest, Served};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use reqwest::Url;
use std::sync::Arc;
use tracing::{error, info, warn};

const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Not forwarded in either direction.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "host",
    "content-length",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "keep-alive",
    "proxy-authorization",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| hop.eq_ignore_ascii_case(name))
}

/// Maps the URI the local server received onto the network URL it stands
/// for. Absolute URIs (proxy style requests) are taken as they are,
/// everything else is resolved against the origin.
pub fn resolve_target(origin: &Url, uri: &Uri) -> Result<Url> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Url::parse(&uri.to_string()).with_context(|| format!("Invalid request URI {}", uri));
    }
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .trim_start_matches('/');
    // "./" keeps a path like "a:b" from being read as a scheme
    origin
        .join(&format!("./{}", path_and_query))
        .with_context(|| format!("Cannot resolve {} against {}", uri, origin))
}

async fn to_asset_request(origin: &Url, request: Request<Body>) -> Result<AssetRequest> {
    let (parts, body) = request.into_parts();
    let url = resolve_target(origin, &parts.uri)?;
    let headers = parts
        .headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES)
        .await
        .context("Failed to read request body")?
        .to_vec();

    Ok(AssetRequest {
        method: parts.method.to_string(),
        url,
        headers,
        body,
    })
}

fn to_response(served: Served) -> Response {
    let mut builder = Response::builder().status(served.response.status);
    for (name, value) in &served.response.headers {
        if !is_hop_by_hop(name) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder
        .header(SOURCE_HEADER, served.from.as_str())
        .body(Body::from(served.response.body))
        .unwrap_or_else(|err| {
            error!("Failed to build response: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

async fn intercept(State(state): State<ServerState>, request: Request<Body>) -> Response {
    let asset_request = match to_asset_request(&state.config.origin, request).await {
        Ok(asset_request) => asset_request,
        Err(err) => {
            warn!("Rejecting request: {:#}", err);
            return (StatusCode::BAD_REQUEST, format!("{:#}", err)).into_response();
        }
    };

    match state.asset_cache.handle(&asset_request).await {
        Ok(served) => to_response(served),
        Err(err) => {
            warn!("Pass-through request to {} failed: {:#}", asset_request.url, err);
            (StatusCode::BAD_GATEWAY, format!("{:#}", err)).into_response()
        }
    }
}

pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .fallback(intercept)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

pub async fn run_server(asset_cache: Arc<AssetCache>, config: ServerConfig) -> Result<()> {
    let port = config.port;
    let origin = config.origin.clone();
    let app = make_app(ServerState {
        config,
        asset_cache,
    });

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Serving {} offline-ready on http://127.0.0.1:{}", origin, port);

    Ok(axum::serve(listener, app).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://choir.example/library/").unwrap()
    }

    #[test]
    fn test_resolve_relative_paths_against_origin() {
        let resolve = |uri: &str| {
            resolve_target(&origin(), &uri.parse::<Uri>().unwrap())
                .unwrap()
                .to_string()
        };
        assert_eq!(resolve("/"), "https://choir.example/library/");
        assert_eq!(resolve("/index.html"), "https://choir.example/library/index.html");
        assert_eq!(
            resolve("/scores/list.json?sort=title"),
            "https://choir.example/library/scores/list.json?sort=title"
        );
    }

    #[test]
    fn test_resolve_keeps_absolute_uris() {
        let url = resolve_target(&origin(), &"http://cdn.example/font.woff".parse::<Uri>().unwrap())
            .unwrap();
        assert_eq!(url.as_str(), "http://cdn.example/font.woff");
    }

    #[test]
    fn test_hop_by_hop_headers_are_case_insensitive() {
        assert!(is_hop_by_hop("Host"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("content-type"));
    }
}
