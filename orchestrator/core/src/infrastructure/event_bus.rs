// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory event streaming over a tokio broadcast channel. Events are lost
// on restart; the log sink below is the durable record.

use crate::domain::events::{AccessEvent, AppEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    App(AppEvent),
    Access(AccessEvent),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Capacity is the number of events buffered before slow receivers
    /// start missing the oldest ones.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_app_event(&self, event: AppEvent) {
        self.publish(DomainEvent::App(event));
    }

    pub fn publish_access_event(&self, event: AccessEvent) {
        self.publish(DomainEvent::Access(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        // send() only fails when nobody is subscribed
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to the events of a single app.
    pub fn subscribe_app(&self, app_id: impl Into<String>) -> AppEventReceiver {
        AppEventReceiver {
            receiver: self.sender.subscribe(),
            app_id: app_id.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one app id
pub struct AppEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    app_id: String,
}

impl AppEventReceiver {
    pub async fn recv(&mut self) -> Result<AppEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::App(app_event) = event {
                if app_event.app_id() == self.app_id {
                    return Ok(app_event);
                }
            }
        }
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

/// Turn every domain event into a structured log line until the bus closes.
pub fn spawn_event_logger(bus: &EventBus) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => log_event(&event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        debug!("Event logger stopped");
    })
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::App(AppEvent::AppInstalled {
            app_id,
            app_type,
            mounted_shares,
            installed_by,
            ..
        }) => info!(
            app_id = %app_id,
            app_type = ?app_type,
            shares = ?mounted_shares,
            user = %installed_by,
            "App installed"
        ),
        DomainEvent::App(AppEvent::ExternalAppRegistered {
            app_id,
            url,
            registered_by,
            ..
        }) => info!(app_id = %app_id, url = %url, user = %registered_by, "External app registered"),
        DomainEvent::App(AppEvent::AppUninstalled {
            app_id,
            uninstalled_by,
            ..
        }) => info!(app_id = %app_id, user = %uninstalled_by, "App uninstalled"),
        DomainEvent::App(AppEvent::TeardownCompleted {
            app_id,
            duration_ms,
            ..
        }) => info!(app_id = %app_id, duration_ms, "Teardown completed"),
        DomainEvent::App(AppEvent::TeardownFailed { app_id, error, .. }) => {
            error!(app_id = %app_id, error = %error, "Teardown failed")
        }
        DomainEvent::App(AppEvent::AppRebuilt {
            app_id,
            mounted_shares,
            rebuilt_by,
            ..
        }) => info!(app_id = %app_id, shares = ?mounted_shares, user = %rebuilt_by, "App rebuilt"),
        DomainEvent::App(AppEvent::ActionPerformed {
            app_id,
            action,
            performed_by,
            ..
        }) => info!(app_id = %app_id, action = %action, user = %performed_by, "Container action"),
        DomainEvent::Access(access) => info!(event = ?access, "Access change"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::installed_app::AppType;
    use chrono::Utc;

    fn uninstalled(app_id: &str) -> AppEvent {
        AppEvent::AppUninstalled {
            app_id: app_id.to_string(),
            app_type: AppType::Stack,
            uninstalled_by: "admin".to_string(),
            uninstalled_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.publish_app_event(uninstalled("immich"));

        match receiver.recv().await.unwrap() {
            DomainEvent::App(AppEvent::AppUninstalled { app_id, .. }) => {
                assert_eq!(app_id, "immich")
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_app_event_filtering() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe_app("immich");

        event_bus.publish_app_event(uninstalled("plex"));
        event_bus.publish_access_event(AccessEvent::LoginFailed {
            username: "mallory".to_string(),
            failed_at: Utc::now(),
        });
        event_bus.publish_app_event(uninstalled("immich"));

        assert_eq!(receiver.recv().await.unwrap().app_id(), "immich");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish_app_event(uninstalled("plex"));

        assert!(receiver1.recv().await.is_ok());
        assert!(receiver2.recv().await.is_ok());
        assert!(matches!(receiver1.try_recv(), Err(EventBusError::Empty)));
    }
}
