//! Control-plane event payloads
//!
//! Each event kind has its own payload type. Payloads arrive as loosely
//! shaped JSON or raw bytes and are validated here, so the cache manager
//! only ever sees well-formed events.

use crate::error::ProtoError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Message `type` that promotes a waiting worker to active
pub const SKIP_WAITING: &str = "SKIP_WAITING";

/// Background sync tag the manager knows how to handle
pub const SYNC_MESSAGES_TAG: &str = "sync-messages";

/// Message posted by a controlled page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

impl ControlMessage {
    pub fn from_json(data: &[u8]) -> Result<Self, ProtoError> {
        let value: Value = serde_json::from_slice(data)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtoError::MissingField("type"))?;

        match kind {
            SKIP_WAITING => Ok(Self::SkipWaiting),
            other => Err(ProtoError::UnknownMessageType(other.to_string())),
        }
    }
}

/// Background sync registration firing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub tag: String,
}

impl SyncEvent {
    pub fn new(tag: &str) -> Result<Self, ProtoError> {
        if tag.trim().is_empty() {
            return Err(ProtoError::EmptySyncTag);
        }
        Ok(Self {
            tag: tag.to_string(),
        })
    }

    pub fn from_json(data: &[u8]) -> Result<Self, ProtoError> {
        let value: Value = serde_json::from_slice(data)?;
        let tag = value
            .get("tag")
            .and_then(Value::as_str)
            .ok_or(ProtoError::MissingField("tag"))?;
        Self::new(tag)
    }

    pub fn is_sync_messages(&self) -> bool {
        self.tag == SYNC_MESSAGES_TAG
    }
}

/// Push message with an optional text payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub payload: Option<String>,
}

impl PushEvent {
    pub fn new(payload: Option<String>) -> Self {
        Self { payload }
    }

    /// An empty body means the push carried no payload
    pub fn from_body(body: &[u8]) -> Result<Self, ProtoError> {
        if body.is_empty() {
            return Ok(Self { payload: None });
        }
        let text = std::str::from_utf8(body).map_err(|_| ProtoError::InvalidUtf8)?;
        Ok(Self {
            payload: Some(text.to_string()),
        })
    }
}

/// A click on a notification previously shown by the manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationClick {
    pub notification_id: Uuid,
}

impl NotificationClick {
    pub fn from_json(data: &[u8]) -> Result<Self, ProtoError> {
        let value: Value = serde_json::from_slice(data)?;
        if value.get("notification_id").is_none() {
            return Err(ProtoError::MissingField("notification_id"));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Every out-of-band event the manager reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    Message(ControlMessage),
    Sync(SyncEvent),
    Push(PushEvent),
    NotificationClick(NotificationClick),
}

impl ControlEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Sync(_) => "sync",
            Self::Push(_) => "push",
            Self::NotificationClick(_) => "notificationclick",
        }
    }
}

/// Data attached to a notification for correlation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    /// Unix timestamp in milliseconds
    pub date_of_arrival: i64,
    pub primary_key: u32,
}

/// Display options of a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
}
