//! The offline cache manager
//!
//! One `CacheManager` is one version of the site's offline layer. It owns
//! the cache store named by its cache version and answers intercepted
//! requests from it:
//!
//! - navigations go network-first, falling back to the cached page and
//!   then to the offline document
//! - everything else is served stale-while-revalidate, with a fallback
//!   icon for images that cannot be fetched
//!
//! The manager keeps no state of its own between events. Work that must
//! outlive a handler (revalidation, background sync) runs on a task
//! tracker so the host can wait for it with [`CacheManager::settle`].

use crate::cache_store::{CacheError, CacheStorage};
use crate::config::WorkerConfig;
use crate::host::Host;
use crate::manifest::AllowedOrigins;
use crate::network::{FetchError, Network};
use crate::sync::{BackgroundSync, LoggingSync};
use chrono::Utc;
use futures::future::{join_all, try_join_all};
use pwa_offline_proto::{
    CacheEntry, ControlEvent, ControlMessage, Destination, NotificationClick, NotificationData,
    NotificationOptions, PushEvent, RequestDescriptor, RequestKey, ResponseSnapshot, SyncEvent,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

pub const NOTIFICATION_TITLE: &str = "HPR Portfolio";
pub const NOTIFICATION_ICON: &str = "./icon-192x192.png";
pub const DEFAULT_PUSH_BODY: &str = "Ada update baru!";
pub const NOTIFICATION_VIBRATE: [u32; 3] = [200, 100, 200];
pub const ROOT_PAGE: &str = "/";

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Invalid URL in configuration: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Offline and no cached fallback for {0}")]
    NoFallback(String),
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Invalid manifest locator: {0}")]
    InvalidLocator(#[from] url::ParseError),

    #[error("Failed to cache {url}: {reason}")]
    Asset { url: String, reason: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// What the host should do with an intercepted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the host fetches the request as if no manager existed
    Passthrough,
    Respond(ResponseSnapshot),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cache_version: String,
    pub cached: Vec<String>,
    pub failed_optional: Vec<String>,
    pub skip_waiting: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
    pub deleted: Vec<String>,
    pub claimed: usize,
}

/// Result of a control-plane event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    SkipWaiting,
    SyncScheduled { tag: String },
    SyncIgnored { tag: String },
    Notified { notification_id: Uuid },
    WindowOpened { client_id: Uuid },
}

#[derive(Clone)]
pub struct CacheManager {
    config: Arc<WorkerConfig>,
    origins: AllowedOrigins,
    offline_url: Url,
    fallback_icon: Url,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    host: Arc<Host>,
    sync: Arc<dyn BackgroundSync>,
    tasks: TaskTracker,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("cache_version", &self.config.cache_version)
            .field("origin", &self.config.origin.as_str())
            .field("storage", &self.storage.storage_type())
            .field("pending_tasks", &self.tasks.len())
            .finish()
    }
}

impl CacheManager {
    pub fn new(
        config: WorkerConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
        host: Arc<Host>,
    ) -> Result<Self, WorkerError> {
        let offline_url = config.origin.join(&config.offline_url)?;
        let fallback_icon = config.origin.join(&config.fallback_icon)?;
        let origins = AllowedOrigins::new(&config.origin, &config.allowed_hosts);

        Ok(Self {
            config: Arc::new(config),
            origins,
            offline_url,
            fallback_icon,
            storage,
            network,
            host,
            sync: Arc::new(LoggingSync),
            tasks: TaskTracker::new(),
        })
    }

    #[must_use]
    pub fn with_background_sync(mut self, sync: Arc<dyn BackgroundSync>) -> Self {
        self.sync = sync;
        self
    }

    pub fn cache_version(&self) -> &str {
        &self.config.cache_version
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The same configuration under another cache version
    ///
    /// Shares storage, network and host; extended-lifetime tasks are tracked
    /// separately.
    pub fn for_version(&self, cache_version: &str) -> Self {
        let config = self.config.as_ref().clone().with_cache_version(cache_version);
        Self {
            config: Arc::new(config),
            tasks: TaskTracker::new(),
            ..self.clone()
        }
    }

    /// Wait until every extended-lifetime task spawned so far has finished
    pub async fn settle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Populate the store for this version
    ///
    /// The mandatory assets are fetched as one batch and written only if
    /// every one of them succeeded. Optional assets are cached one by one
    /// and their failures are only logged.
    pub async fn install(&self) -> Result<InstallReport, InstallError> {
        let version = self.cache_version();
        info!("📦 Installing cache {}", version);

        self.storage.open(version).await?;
        let manifest = self.config.manifest.resolve(&self.config.origin)?;

        let batch = try_join_all(manifest.mandatory.iter().map(|url| self.fetch_asset(url))).await?;
        self.storage.put_all(version, &batch).await?;

        let mut report = InstallReport {
            cache_version: version.to_string(),
            cached: batch.iter().map(|entry| entry.key.url.clone()).collect(),
            ..Default::default()
        };

        let optional = join_all(manifest.optional.iter().map(|url| async move {
            let entry = self.fetch_asset(url).await?;
            self.storage.put(version, &entry.key, &entry.response).await?;
            Ok::<_, InstallError>(entry.key.url)
        }))
        .await;

        for (url, result) in manifest.optional.iter().zip(optional) {
            match result {
                Ok(cached) => report.cached.push(cached),
                Err(e) => {
                    warn!("⚠️  Failed to cache optional asset {}: {}", url, e);
                    report.failed_optional.push(url.to_string());
                }
            }
        }

        report.skip_waiting = self.config.skip_waiting_on_install;
        info!(
            "✅ Cache {} installed ({} cached, {} optional failures)",
            version,
            report.cached.len(),
            report.failed_optional.len()
        );
        Ok(report)
    }

    async fn fetch_asset(&self, url: &Url) -> Result<CacheEntry, InstallError> {
        let request = RequestDescriptor::get(url.clone());
        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|e| InstallError::Asset {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.is_ok() {
            return Err(InstallError::Asset {
                url: url.to_string(),
                reason: format!("HTTP status {}", response.status),
            });
        }

        Ok(CacheEntry {
            key: request.key(),
            response,
        })
    }

    /// Whether this version's store exists and holds every mandatory asset
    pub async fn is_complete(&self) -> Result<bool, InstallError> {
        let version = self.cache_version();
        if !self.storage.has(version).await? {
            return Ok(false);
        }

        let manifest = self.config.manifest.resolve(&self.config.origin)?;
        for url in &manifest.mandatory {
            if self.match_url(url).await?.is_none() {
                debug!("Cache {} is missing {}", version, url);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Persist this version as the active one for `scope`
    pub async fn record_active(&self, scope: &str) -> Result<(), CacheError> {
        self.storage
            .record_active_version(scope, self.cache_version())
            .await
    }

    /// The version last persisted as active for `scope`
    pub async fn recorded_active(&self, scope: &str) -> Result<Option<String>, CacheError> {
        self.storage.active_version(scope).await
    }

    /// Delete every store but the current one and claim all open pages
    pub async fn activate(&self) -> Result<ActivateReport, CacheError> {
        let version = self.cache_version();
        info!("Activating cache {}", version);

        let mut deleted = Vec::new();
        for name in self.storage.keys().await? {
            if name != version {
                info!("🗑️  Deleting old cache: {}", name);
                if self.storage.delete(&name).await? {
                    deleted.push(name);
                }
            }
        }
        self.storage.open(version).await?;

        let claimed = self.host.claim();
        info!("Cache {} active, claimed {} clients", version, claimed);
        Ok(ActivateReport { deleted, claimed })
    }

    // ---------------------------------------------------------------------
    // Request interception
    // ---------------------------------------------------------------------

    pub async fn handle_fetch(&self, request: &RequestDescriptor) -> Result<FetchOutcome, WorkerError> {
        if !self.origins.allows(&request.url) {
            debug!("Not intercepting {}", request.url);
            return Ok(FetchOutcome::Passthrough);
        }

        let response = if request.is_navigation() {
            self.network_first(request).await?
        } else {
            self.stale_while_revalidate(request).await?
        };
        Ok(FetchOutcome::Respond(response))
    }

    async fn network_first(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot, WorkerError> {
        match self.network.fetch(request).await {
            Ok(response) => {
                self.store(request, &response).await;
                Ok(response)
            }
            Err(e) => {
                info!("Navigation to {} failed, trying cache: {}", request.url, e);
                if let Some(cached) = self.match_current(request).await? {
                    return Ok(cached);
                }
                if let Some(offline) = self.match_url(&self.offline_url).await? {
                    debug!("Serving offline document for {}", request.url);
                    return Ok(offline);
                }
                Err(WorkerError::NoFallback(request.url.to_string()))
            }
        }
    }

    async fn stale_while_revalidate(
        &self,
        request: &RequestDescriptor,
    ) -> Result<ResponseSnapshot, WorkerError> {
        if let Some(cached) = self.match_current(request).await? {
            debug!("Cache hit for {}", request.url);
            self.revalidate(request.clone());
            return Ok(cached);
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                self.store(request, &response).await;
                Ok(response)
            }
            Err(e) => {
                info!("Fetch failed for {}: {}", request.url, e);
                if request.destination == Destination::Image {
                    return self
                        .match_url(&self.fallback_icon)
                        .await?
                        .ok_or_else(|| WorkerError::NoFallback(request.url.to_string()));
                }
                Err(e.into())
            }
        }
    }

    /// Refresh a cached entry without holding up the response
    fn revalidate(&self, request: RequestDescriptor) {
        let storage = Arc::clone(&self.storage);
        let network = Arc::clone(&self.network);
        let cache_name = self.config.cache_version.clone();

        self.tasks.spawn(async move {
            match network.fetch(&request).await {
                Ok(response) if response.is_cacheable() => {
                    match storage.put(&cache_name, &request.key(), &response).await {
                        Ok(()) => debug!("♻️  Revalidated {}", request.url),
                        Err(CacheError::NotFound(name)) => {
                            debug!("Cache {} is gone, dropping revalidated {}", name, request.url)
                        }
                        Err(e) => warn!("Failed to store revalidated {}: {}", request.url, e),
                    }
                }
                Ok(response) => debug!(
                    "Revalidation of {} returned {}, keeping cached copy",
                    request.url, response.status
                ),
                Err(e) => debug!("Revalidation of {} failed: {}", request.url, e),
            }
        });
    }

    /// Persist a response that passed through, if it may be cached
    async fn store(&self, request: &RequestDescriptor, response: &ResponseSnapshot) {
        if !request.is_get() || !response.is_cacheable() {
            return;
        }
        if let Err(e) = self
            .storage
            .put(self.cache_version(), &request.key(), response)
            .await
        {
            warn!("Failed to cache {}: {}", request.url, e);
        }
    }

    /// Only GET requests can have a cached entry
    async fn match_current(
        &self,
        request: &RequestDescriptor,
    ) -> Result<Option<ResponseSnapshot>, CacheError> {
        if !request.is_get() {
            return Ok(None);
        }
        self.storage
            .match_key(self.cache_version(), &request.key())
            .await
    }

    async fn match_url(&self, url: &Url) -> Result<Option<ResponseSnapshot>, CacheError> {
        self.storage
            .match_key(self.cache_version(), &RequestKey::get(url))
            .await
    }

    // ---------------------------------------------------------------------
    // Control-plane events
    // ---------------------------------------------------------------------

    pub async fn handle_event(&self, event: ControlEvent) -> Result<EventOutcome, WorkerError> {
        debug!("Handling {} event", event.kind());
        match event {
            ControlEvent::Message(ControlMessage::SkipWaiting) => Ok(EventOutcome::SkipWaiting),
            ControlEvent::Sync(sync) => Ok(self.handle_sync(sync)),
            ControlEvent::Push(push) => Ok(self.handle_push(push)),
            ControlEvent::NotificationClick(click) => Ok(self.handle_notification_click(click)),
        }
    }

    fn handle_sync(&self, event: SyncEvent) -> EventOutcome {
        info!("Background sync: {}", event.tag);
        if !event.is_sync_messages() {
            return EventOutcome::SyncIgnored { tag: event.tag };
        }

        let sync = Arc::clone(&self.sync);
        let tag = event.tag.clone();
        self.tasks.spawn(async move {
            if let Err(e) = sync.run(&tag).await {
                error!("❌ Sync failed: {}", e);
            }
        });
        EventOutcome::SyncScheduled { tag: event.tag }
    }

    fn handle_push(&self, event: PushEvent) -> EventOutcome {
        let options = NotificationOptions {
            body: event.payload.unwrap_or_else(|| DEFAULT_PUSH_BODY.to_string()),
            icon: NOTIFICATION_ICON.to_string(),
            badge: NOTIFICATION_ICON.to_string(),
            vibrate: NOTIFICATION_VIBRATE.to_vec(),
            data: NotificationData {
                date_of_arrival: Utc::now().timestamp_millis(),
                primary_key: 1,
            },
        };
        let notification_id = self.host.show_notification(NOTIFICATION_TITLE, options);
        EventOutcome::Notified { notification_id }
    }

    fn handle_notification_click(&self, event: NotificationClick) -> EventOutcome {
        if !self.host.close_notification(event.notification_id) {
            warn!("Clicked notification {} is not open", event.notification_id);
        }
        let client_id = self.host.open_window(ROOT_PAGE);
        EventOutcome::WindowOpened { client_id }
    }
}
