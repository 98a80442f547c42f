//! Configuration for the cache manager and the proxy hosting it

use crate::manifest::{ALLOWED_HOSTS, AssetManifest, CACHE_VERSION, FALLBACK_ICON, OFFLINE_URL};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Settings of one cache manager version
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub cache_version: String,
    /// Own origin of the site
    pub origin: Url,
    pub manifest: AssetManifest,
    pub allowed_hosts: Vec<String>,
    pub offline_url: String,
    pub fallback_icon: String,
    pub skip_waiting_on_install: bool,
}

impl WorkerConfig {
    pub fn portfolio(origin: Url) -> Self {
        Self {
            cache_version: CACHE_VERSION.to_string(),
            origin,
            manifest: AssetManifest::portfolio(),
            allowed_hosts: ALLOWED_HOSTS.iter().map(|s| s.to_string()).collect(),
            offline_url: OFFLINE_URL.to_string(),
            fallback_icon: FALLBACK_ICON.to_string(),
            skip_waiting_on_install: true,
        }
    }

    #[must_use]
    pub fn with_cache_version(mut self, version: &str) -> Self {
        self.cache_version = version.to_string();
        self
    }

    #[must_use]
    pub fn with_manifest(mut self, manifest: AssetManifest) -> Self {
        self.manifest = manifest;
        self
    }

    #[must_use]
    pub fn with_skip_waiting_on_install(mut self, skip: bool) -> Self {
        self.skip_waiting_on_install = skip;
        self
    }
}

/// Settings of the proxy binary, read from `PWA_OFFLINE_*` environment variables
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub storage_dir: PathBuf,
    pub origin: Url,
    pub bind: SocketAddr,
    pub cache_version: String,
    pub fetch_timeout: Duration,
}

impl ProxyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_dir = lookup("PWA_OFFLINE_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./pwa-offline-storage"));

        let origin_raw =
            lookup("PWA_OFFLINE_ORIGIN").unwrap_or_else(|| "http://127.0.0.1:8000".to_string());
        let origin = Url::parse(&origin_raw).map_err(|e| ConfigError::Invalid {
            name: "PWA_OFFLINE_ORIGIN",
            reason: e.to_string(),
        })?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: "PWA_OFFLINE_ORIGIN",
                reason: format!("unsupported scheme {}", origin.scheme()),
            });
        }

        let bind = lookup("PWA_OFFLINE_BIND")
            .unwrap_or_else(|| "127.0.0.1:8723".to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: "PWA_OFFLINE_BIND",
                reason: e.to_string(),
            })?;

        let cache_version =
            lookup("PWA_OFFLINE_CACHE_VERSION").unwrap_or_else(|| CACHE_VERSION.to_string());
        if cache_version.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name: "PWA_OFFLINE_CACHE_VERSION",
                reason: "must not be empty".to_string(),
            });
        }

        let fetch_timeout = match lookup("PWA_OFFLINE_FETCH_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::Invalid {
                        name: "PWA_OFFLINE_FETCH_TIMEOUT_SECS",
                        reason: e.to_string(),
                    }
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(30),
        };

        Ok(Self {
            storage_dir,
            origin,
            bind,
            cache_version,
            fetch_timeout,
        })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::portfolio(self.origin.clone()).with_cache_version(&self.cache_version)
    }
}
