//! Background sync task run on `sync-messages`

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
#[error("Background sync failed: {0}")]
pub struct SyncError(pub String);

/// Deferred work run when a background sync fires
#[async_trait::async_trait]
pub trait BackgroundSync: Send + Sync {
    async fn run(&self, tag: &str) -> Result<(), SyncError>;
}

/// Default task: there are no queued messages to replay yet, so it only logs
pub struct LoggingSync;

#[async_trait::async_trait]
impl BackgroundSync for LoggingSync {
    async fn run(&self, tag: &str) -> Result<(), SyncError> {
        info!("Syncing messages ({})...", tag);
        Ok(())
    }
}
