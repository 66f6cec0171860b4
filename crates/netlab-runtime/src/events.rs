//! Container lifecycle events and the handle returned on creation.

use netlab_common::ContainerId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Container lifecycle event types.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// Container created.
    Created { name: String, timestamp: i64 },
    /// Container started.
    Started { name: String, timestamp: i64 },
    /// Container stopped.
    Stopped { name: String, timestamp: i64 },
    /// Container deleted.
    Deleted { name: String, timestamp: i64 },
}

impl LifecycleEvent {
    /// Name of the container the event is about.
    #[must_use]
    pub fn container(&self) -> &str {
        match self {
            Self::Created { name, .. }
            | Self::Started { name, .. }
            | Self::Stopped { name, .. }
            | Self::Deleted { name, .. } => name,
        }
    }

    pub(crate) fn created(name: &str) -> Self {
        Self::Created {
            name: name.to_string(),
            timestamp: now(),
        }
    }

    pub(crate) fn started(name: &str) -> Self {
        Self::Started {
            name: name.to_string(),
            timestamp: now(),
        }
    }

    pub(crate) fn stopped(name: &str) -> Self {
        Self::Stopped {
            name: name.to_string(),
            timestamp: now(),
        }
    }

    pub(crate) fn deleted(name: &str) -> Self {
        Self::Deleted {
            name: name.to_string(),
            timestamp: now(),
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Event bus for lifecycle events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }
}

impl EventBus {
    /// Create a new event bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events for a single container.
    #[must_use]
    pub fn subscribe(&self, container: impl Into<String>) -> EventSubscription {
        EventSubscription {
            container: container.into(),
            receiver: self.sender.subscribe(),
        }
    }

    /// Publish an event.
    pub fn publish(&self, event: LifecycleEvent) {
        // no subscribers is fine
        let _ = self.sender.send(event);
    }
}

/// Receives lifecycle events of one container.
#[derive(Debug)]
pub struct EventSubscription {
    container: String,
    receiver: broadcast::Receiver<LifecycleEvent>,
}

impl EventSubscription {
    /// Wait for the next event about this container.
    ///
    /// Returns `None` once the publishing runtime is dropped. Events missed
    /// because the subscriber lagged are skipped.
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.container() == self.container => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(container = %self.container, skipped, "Lifecycle subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Return the next already-published event without waiting.
    pub fn try_recv(&mut self) -> Option<LifecycleEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.container() == self.container => return Some(event),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

/// Returned by [`crate::ContainerRuntime::create_container`].
///
/// Identifies the created (not yet started) container and, for backends
/// that publish them, carries a subscription to its lifecycle events for
/// post-deploy tasks.
#[derive(Debug)]
pub struct ContainerHandle {
    /// Backend-assigned ID.
    pub id: ContainerId,
    /// Container name.
    pub name: String,
    /// Lifecycle events, when the backend publishes them.
    pub events: Option<EventSubscription>,
}

impl ContainerHandle {
    /// A handle without an event subscription.
    #[must_use]
    pub fn new(id: ContainerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            events: None,
        }
    }

    /// Attach an event subscription.
    #[must_use]
    pub fn with_events(mut self, events: EventSubscription) -> Self {
        self.events = Some(events);
        self
    }
}
