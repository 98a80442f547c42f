//! Network access for the cache manager
//!
//! A fetch only fails on transport problems. HTTP error statuses come back
//! as ordinary snapshots; deciding whether they are usable is up to the
//! caller.

use pwa_offline_proto::{RequestDescriptor, ResponseKind, ResponseSnapshot};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::{Origin, Url};

/// Error type for network fetches
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Invalid request for {url}: {reason}")]
    InvalidRequest { url: String, reason: String },

    #[error("Network request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Network unavailable: {0}")]
    Unavailable(String),
}

/// Hop-by-hop headers never forwarded in either direction
pub fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}

/// Trait for the network the manager falls through to
#[async_trait::async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot, FetchError>;
}

/// reqwest-backed network
pub struct HttpNetwork {
    client: Client,
    own_origin: Origin,
}

impl HttpNetwork {
    pub fn new(own_origin: &Url, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            own_origin: own_origin.origin(),
        })
    }
}

#[async_trait::async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot, FetchError> {
        let url = request.url.to_string();
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            FetchError::InvalidRequest {
                url: url.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        debug!("🌐 {} {}", request.method, url);
        let response = builder.send().await.map_err(|source| FetchError::Transport {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Body {
                url: url.clone(),
                source,
            })?
            .to_vec();

        let kind = if request.url.origin() == self.own_origin {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        };

        debug!("Fetched {} bytes from {} ({})", body.len(), url, status);

        Ok(ResponseSnapshot {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hop_by_hop_headers() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(is_hop_by_hop("Host"));
        assert!(!is_hop_by_hop("content-type"));
        assert!(!is_hop_by_hop("etag"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let origin = Url::parse("http://127.0.0.1:9/").unwrap();
        let network = HttpNetwork::new(&origin, Duration::from_secs(2)).unwrap();

        let result = network
            .fetch(&RequestDescriptor::get(origin.join("index.html").unwrap()))
            .await;
        assert!(matches!(result, Err(FetchError::Transport { .. })));
    }
}
