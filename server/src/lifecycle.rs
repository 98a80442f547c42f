//! Registration and version lifecycle
//!
//! A `Registration` is the host's view of one scope. It holds up to three
//! cache manager versions: the one installing, one waiting to take over,
//! and the active one serving requests. Installing a new version never
//! disturbs the active one; it only takes over once it has installed and
//! either asked to skip waiting or nothing else is active.

use crate::cache_store::CacheError;
use crate::worker::{CacheManager, EventOutcome, InstallError, WorkerError};
use pwa_offline_proto::{ControlEvent, ControlMessage};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Invalid registration: {0}")]
    InvalidScope(String),

    #[error("Install failed: {0}")]
    Install(#[from] InstallError),

    #[error("Activation failed: {0}")]
    Activate(#[from] CacheError),

    #[error("No active worker")]
    NoActiveWorker,

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

#[derive(Debug, Clone)]
struct WorkerSlot {
    manager: CacheManager,
    state: WorkerState,
}

#[derive(Debug, Default)]
struct Slots {
    installing: Option<WorkerSlot>,
    waiting: Option<WorkerSlot>,
    active: Option<WorkerSlot>,
    retired: Vec<String>,
}

impl Slots {
    fn retire(&mut self, slot: WorkerSlot) {
        info!("Version {} is now redundant", slot.manager.cache_version());
        self.retired.push(slot.manager.cache_version().to_string());
    }
}

/// Version and state of one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    pub cache_version: String,
    pub state: WorkerState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationStatus {
    pub scope: String,
    pub script_url: String,
    pub installing: Option<SlotStatus>,
    pub waiting: Option<SlotStatus>,
    pub active: Option<SlotStatus>,
    pub retired: Vec<String>,
}

/// Resolve and validate a registration request against the site origin
///
/// The scope defaults to the script's directory and may not reach above it.
pub fn resolve_scope(origin: &Url, script_url: &str, scope: Option<&str>) -> Result<(Url, Url), LifecycleError> {
    let script = origin
        .join(script_url)
        .map_err(|e| LifecycleError::InvalidScope(format!("script URL {}: {}", script_url, e)))?;
    if script.origin() != origin.origin() {
        return Err(LifecycleError::InvalidScope(format!(
            "script {} is not on origin {}",
            script,
            origin.origin().ascii_serialization()
        )));
    }

    let script_dir = script
        .join("./")
        .map_err(|e| LifecycleError::InvalidScope(e.to_string()))?;
    let scope = match scope {
        Some(scope) => script
            .join(scope)
            .map_err(|e| LifecycleError::InvalidScope(format!("scope {}: {}", scope, e)))?,
        None => script_dir.clone(),
    };

    if scope.origin() != script.origin() {
        return Err(LifecycleError::InvalidScope(format!(
            "scope {} is not on the script's origin",
            scope
        )));
    }
    if !scope.path().starts_with(script_dir.path()) {
        return Err(LifecycleError::InvalidScope(format!(
            "scope {} is above the script directory {}",
            scope.path(),
            script_dir.path()
        )));
    }

    Ok((script, scope))
}

pub struct Registration {
    script_url: Url,
    scope: Url,
    slots: Mutex<Slots>,
    update_lock: tokio::sync::Mutex<()>,
}

impl Registration {
    pub fn register(origin: &Url, script_url: &str, scope: Option<&str>) -> Result<Self, LifecycleError> {
        let (script_url, scope) = resolve_scope(origin, script_url, scope)?;
        info!("Registered {} with scope {}", script_url, scope);
        Ok(Self {
            script_url,
            scope,
            slots: Mutex::new(Slots::default()),
            update_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn scope(&self) -> &str {
        self.scope.as_str()
    }

    pub fn script_url(&self) -> &str {
        self.script_url.as_str()
    }

    /// Whether a page at `url` falls under this registration
    pub fn in_scope(&self, url: &Url) -> bool {
        url.origin() == self.scope.origin() && url.path().starts_with(self.scope.path())
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn active(&self) -> Option<CacheManager> {
        self.slots().active.as_ref().map(|slot| slot.manager.clone())
    }

    pub fn waiting(&self) -> Option<CacheManager> {
        self.slots().waiting.as_ref().map(|slot| slot.manager.clone())
    }

    pub fn status(&self) -> RegistrationStatus {
        let slots = self.slots();
        let status = |slot: &Option<WorkerSlot>| {
            slot.as_ref().map(|s| SlotStatus {
                cache_version: s.manager.cache_version().to_string(),
                state: s.state,
            })
        };
        RegistrationStatus {
            scope: self.scope.to_string(),
            script_url: self.script_url.to_string(),
            installing: status(&slots.installing),
            waiting: status(&slots.waiting),
            active: status(&slots.active),
            retired: slots.retired.clone(),
        }
    }

    /// Install a new version and activate it when allowed
    ///
    /// Returns the state the new version ended in. On install failure the
    /// version becomes redundant and the active one keeps serving; with
    /// nothing active, the version last recorded as active is restored
    /// from storage when its store is still complete.
    pub async fn update(&self, manager: CacheManager) -> Result<WorkerState, LifecycleError> {
        let _guard = self.update_lock.lock().await;

        self.slots().installing = Some(WorkerSlot {
            manager: manager.clone(),
            state: WorkerState::Installing,
        });

        let report = match manager.install().await {
            Ok(report) => report,
            Err(e) => {
                error!("❌ Install of {} failed: {}", manager.cache_version(), e);
                {
                    let mut slots = self.slots();
                    if let Some(slot) = slots.installing.take() {
                        slots.retire(slot);
                    }
                }
                if self.active().is_none() {
                    match self.restore(&manager).await {
                        Ok(true) => {}
                        Ok(false) => warn!("No stored version to fall back to"),
                        Err(restore_err) => error!("❌ Restoring the stored version failed: {}", restore_err),
                    }
                }
                return Err(e.into());
            }
        };

        let activate_now = {
            let mut slots = self.slots();
            slots.installing = None;
            if let Some(previous) = slots.waiting.replace(WorkerSlot {
                manager,
                state: WorkerState::Installed,
            }) {
                slots.retire(previous);
            }
            report.skip_waiting || slots.active.is_none()
        };

        if activate_now {
            self.activate_waiting().await?;
            Ok(WorkerState::Activated)
        } else {
            info!("New version installed, waiting for existing pages to close");
            Ok(WorkerState::Installed)
        }
    }

    /// Promote the waiting version, if any; returns whether one was promoted
    ///
    /// Waits for an update in progress, which may activate the version itself.
    pub async fn skip_waiting(&self) -> Result<bool, LifecycleError> {
        let _guard = self.update_lock.lock().await;
        self.activate_waiting().await
    }

    /// Reactivate the version persisted as active, if its store is complete
    ///
    /// Covers a restart while the origin is unreachable: nothing is active in
    /// memory yet, but the stored cache can still serve.
    async fn restore(&self, candidate: &CacheManager) -> Result<bool, LifecycleError> {
        let Some(version) = candidate.recorded_active(self.scope()).await? else {
            return Ok(false);
        };
        let manager = if version == candidate.cache_version() {
            candidate.clone()
        } else {
            candidate.for_version(&version)
        };

        if !manager.is_complete().await? {
            warn!("Stored cache {} is incomplete, not restoring it", version);
            return Ok(false);
        }
        if let Err(e) = manager.activate().await {
            error!("❌ Activate handler of {} failed: {}", version, e);
        }

        let mut slots = self.slots();
        slots.retired.retain(|retired| *retired != version);
        slots.active = Some(WorkerSlot {
            manager,
            state: WorkerState::Activated,
        });
        info!("♻️  Restored cache {} from storage", version);
        Ok(true)
    }

    async fn activate_waiting(&self) -> Result<bool, LifecycleError> {
        let manager = {
            let mut slots = self.slots();
            match slots.waiting.as_mut() {
                Some(slot) => {
                    slot.state = WorkerState::Activating;
                    slot.manager.clone()
                }
                None => return Ok(false),
            }
        };

        // A failed activate handler does not stop the version from taking over
        if let Err(e) = manager.activate().await {
            error!("❌ Activate handler of {} failed: {}", manager.cache_version(), e);
        }

        {
            let mut slots = self.slots();
            if let Some(mut slot) = slots.waiting.take() {
                slot.state = WorkerState::Activated;
                if let Some(previous) = slots.active.replace(slot) {
                    slots.retire(previous);
                }
            }
        }

        if let Err(e) = manager.record_active(self.scope()).await {
            error!("Failed to record {} as active: {}", manager.cache_version(), e);
        }
        Ok(true)
    }

    /// Route a control event to the worker that should receive it
    ///
    /// Messages go to the waiting version when there is one, so a page can
    /// tell it to skip waiting. Everything else goes to the active version.
    pub async fn dispatch(&self, event: ControlEvent) -> Result<EventOutcome, LifecycleError> {
        match event {
            ControlEvent::Message(message) => {
                let target = self
                    .waiting()
                    .or_else(|| self.active())
                    .ok_or(LifecycleError::NoActiveWorker)?;
                let outcome = target.handle_event(ControlEvent::Message(message)).await?;
                if outcome == EventOutcome::SkipWaiting && !self.skip_waiting().await? {
                    warn!("{:?} received with nothing waiting", ControlMessage::SkipWaiting);
                }
                Ok(outcome)
            }
            other => {
                let active = self.active().ok_or(LifecycleError::NoActiveWorker)?;
                Ok(active.handle_event(other).await?)
            }
        }
    }
}
