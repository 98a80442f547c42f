pub mod cache_store;
pub mod config;
pub mod host;
pub mod install_prompt;
pub mod lifecycle;
pub mod manifest;
pub mod network;
pub mod server;
pub mod sync;
pub mod worker;

// Re-export commonly used types
pub use cache_store::{CacheError, CacheStorage};
pub use config::{ProxyConfig, WorkerConfig};
pub use lifecycle::Registration;
pub use network::{HttpNetwork, Network};
pub use worker::{CacheManager, FetchOutcome};

use host::Host;
use install_prompt::InstallPromptController;
use std::sync::{Arc, Mutex};
use url::Url;

pub type AppState = Arc<ProxyState>;

/// Everything the proxy needs to host the cache manager
pub struct ProxyState {
    /// Own origin of the proxied site
    pub origin: Url,
    pub registration: Registration,
    pub storage: Arc<dyn CacheStorage>,
    pub network: Arc<dyn Network>,
    pub host: Arc<Host>,
    /// Deferred install prompt of the site's pages
    pub install_prompt: Mutex<InstallPromptController>,
}

impl std::fmt::Debug for ProxyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyState")
            .field("origin", &self.origin.as_str())
            .field("scope", &self.registration.scope())
            .field("storage", &self.storage.storage_type())
            .field("network", &"<dyn Network>")
            .field("host", &self.host)
            .field("install_prompt", &self.install_prompt)
            .finish()
    }
}

#[cfg(test)]
mod test_support;
