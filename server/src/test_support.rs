//! Shared fixtures for the worker and server tests

use crate::cache_store::CacheStorage;
use crate::cache_store::memory::MemoryCacheStorage;
use crate::config::WorkerConfig;
use crate::host::Host;
use crate::manifest::{MANDATORY_ASSETS, OPTIONAL_ASSETS};
use crate::network::{FetchError, Network};
use crate::worker::CacheManager;
use pwa_offline_proto::{RequestDescriptor, ResponseSnapshot};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use url::Url;

pub const ORIGIN: &str = "https://hpr.example/";

pub fn origin() -> Url {
    Url::parse(ORIGIN).unwrap()
}

pub fn url(locator: &str) -> Url {
    origin().join(locator).unwrap()
}

/// Scripted network: canned responses per URL, per-URL failures, an
/// offline switch and an optional gate that holds every fetch
#[derive(Default)]
pub struct MockNetwork {
    responses: Mutex<HashMap<String, ResponseSnapshot>>,
    failing: Mutex<HashSet<String>>,
    offline: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    calls: Mutex<Vec<String>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Network serving every manifest asset with a `v1` body
    pub fn portfolio() -> Self {
        let network = Self::new();
        for locator in MANDATORY_ASSETS.iter().chain(OPTIONAL_ASSETS) {
            network.serve_text(url(locator).as_str(), &format!("v1 {}", locator));
        }
        network
    }

    pub fn serve(&self, url: &str, response: ResponseSnapshot) {
        self.responses.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn serve_text(&self, url: &str, body: &str) {
        self.serve(url, ResponseSnapshot::new(200, body).with_header("content-type", "text/plain"));
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Hold every fetch until the returned semaphore gets permits
    pub fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Network for MockNetwork {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot, FetchError> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }

        if self.offline.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&url) {
            return Err(FetchError::Unavailable(url));
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&url)
            .cloned()
            .unwrap_or_else(|| ResponseSnapshot::new(404, "not found")))
    }
}

pub struct Fixture {
    pub storage: Arc<MemoryCacheStorage>,
    pub network: Arc<MockNetwork>,
    pub host: Arc<Host>,
    pub manager: CacheManager,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(WorkerConfig::portfolio(origin()))
    }

    pub fn with_config(config: WorkerConfig) -> Self {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(MockNetwork::portfolio());
        let host = Arc::new(Host::new());
        let manager = Self::manager(config, &storage, &network, &host);
        Self {
            storage,
            network,
            host,
            manager,
        }
    }

    /// Another manager version sharing this fixture's storage, network and host
    pub fn manager(
        config: WorkerConfig,
        storage: &Arc<MemoryCacheStorage>,
        network: &Arc<MockNetwork>,
        host: &Arc<Host>,
    ) -> CacheManager {
        let storage: Arc<dyn CacheStorage> = storage.clone();
        let network: Arc<dyn Network> = network.clone();
        CacheManager::new(config, storage, network, Arc::clone(host)).unwrap()
    }

    pub async fn cached_body(&self, version: &str, locator: &str) -> Option<Vec<u8>> {
        self.storage
            .match_key(version, &pwa_offline_proto::RequestKey::get(&url(locator)))
            .await
            .unwrap()
            .map(|snapshot| snapshot.body)
    }
}
