//! Host-side model of open pages and displayed notifications
//!
//! The cache manager never touches a page directly. It asks the host to
//! claim clients, show or close notifications and open windows.

use chrono::{DateTime, Utc};
use pwa_offline_proto::NotificationOptions;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// An open page of the site
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: Uuid,
    pub url: String,
    pub focused: bool,
    pub controlled: bool,
}

/// A notification shown by the manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub options: NotificationOptions,
    pub shown_at: DateTime<Utc>,
    pub closed: bool,
}

#[derive(Debug, Default)]
pub struct Host {
    clients: Mutex<Vec<Client>>,
    notifications: Mutex<Vec<Notification>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Host {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly loaded page; it is not controlled until claimed
    pub fn connect(&self, url: &str) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.clients).push(Client {
            id,
            url: url.to_string(),
            focused: false,
            controlled: false,
        });
        debug!("Client {} connected at {}", id, url);
        id
    }

    /// Take control of every open page; returns how many were newly claimed
    pub fn claim(&self) -> usize {
        let mut clients = lock(&self.clients);
        let mut claimed = 0;
        for client in clients.iter_mut().filter(|c| !c.controlled) {
            client.controlled = true;
            claimed += 1;
        }
        claimed
    }

    /// Focus a page already showing `url`, or open a new one
    pub fn open_window(&self, url: &str) -> Uuid {
        let mut clients = lock(&self.clients);
        for client in clients.iter_mut() {
            client.focused = false;
        }

        if let Some(existing) = clients.iter_mut().find(|c| c.url == url) {
            existing.focused = true;
            debug!("Focused existing client {} at {}", existing.id, url);
            return existing.id;
        }

        let id = Uuid::new_v4();
        clients.push(Client {
            id,
            url: url.to_string(),
            focused: true,
            controlled: true,
        });
        info!("Opened window {} at {}", id, url);
        id
    }

    pub fn clients(&self) -> Vec<Client> {
        lock(&self.clients).clone()
    }

    pub fn show_notification(&self, title: &str, options: NotificationOptions) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.notifications).push(Notification {
            id,
            title: title.to_string(),
            options,
            shown_at: Utc::now(),
            closed: false,
        });
        info!("🔔 Showing notification {}: {}", id, title);
        id
    }

    /// Close a notification; returns `false` if it is unknown or already closed
    pub fn close_notification(&self, id: Uuid) -> bool {
        let mut notifications = lock(&self.notifications);
        match notifications.iter_mut().find(|n| n.id == id && !n.closed) {
            Some(notification) => {
                notification.closed = true;
                true
            }
            None => false,
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.notifications).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pwa_offline_proto::NotificationData;

    #[test]
    fn test_claim_only_counts_uncontrolled_clients() {
        let host = Host::new();
        host.connect("/");
        host.connect("/about.html");

        assert_eq!(host.claim(), 2);
        assert_eq!(host.claim(), 0);
        assert!(host.clients().iter().all(|c| c.controlled));
    }

    #[test]
    fn test_open_window_focuses_existing_client() {
        let host = Host::new();
        let home = host.connect("/");
        host.connect("/contact.html");

        assert_eq!(host.open_window("/"), home);
        assert_eq!(host.clients().len(), 2);

        let opened = host.open_window("/about.html");
        let clients = host.clients();
        assert_eq!(clients.len(), 3);
        assert!(clients.iter().any(|c| c.id == opened && c.focused));
        assert!(clients.iter().filter(|c| c.focused).count() == 1);
    }

    #[test]
    fn test_close_notification_once() {
        let host = Host::new();
        let id = host.show_notification(
            "HPR Portfolio",
            NotificationOptions {
                body: "hello".to_string(),
                icon: "./icon-192x192.png".to_string(),
                badge: "./icon-192x192.png".to_string(),
                vibrate: vec![200, 100, 200],
                data: NotificationData {
                    date_of_arrival: 0,
                    primary_key: 1,
                },
            },
        );

        assert!(host.close_notification(id));
        assert!(!host.close_notification(id));
        assert!(!host.close_notification(Uuid::new_v4()));
        assert!(host.notifications()[0].closed);
    }
}
