use super::TransportError;
use crate::event::NotificationEvent;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Which transport a publisher delivers through
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Log,
    Queue,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Log => "log",
            TransportKind::Queue => "queue",
        }
    }
}

/// Delivery mechanism for notification events.
///
/// Implementations must be safe to call concurrently from request handlers.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Hands one event to the transport.
    async fn send(&self, event: &NotificationEvent) -> Result<(), TransportError>;
}

/// Transport with no external dependency.
///
/// Writes each event to the log and fans it out on an in-process broadcast
/// bus, which the local consumer drains. Never fails.
pub struct LogTransport {
    bus: broadcast::Sender<NotificationEvent>,
}

impl LogTransport {
    pub fn new(capacity: usize) -> Self {
        let (bus, _) = broadcast::channel(capacity);
        Self { bus }
    }

    /// Receive events sent after this call
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.bus.subscribe()
    }
}

impl Default for LogTransport {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Transport for LogTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Log
    }

    async fn send(&self, event: &NotificationEvent) -> Result<(), TransportError> {
        info!("Notification: {}", event);
        // No receivers is fine
        let _ = self.bus.send(event.clone());
        Ok(())
    }
}

/// Publishes notification events through the configured transport.
///
/// Every call is bounded by the publish timeout; an elapsed timeout is
/// reported as a retryable [`TransportError::Timeout`].
#[derive(Clone)]
pub struct EventPublisher {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl EventPublisher {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub async fn publish(&self, event: &NotificationEvent) -> Result<(), TransportError> {
        debug!(
            event_type = event.event_type(),
            entity_id = %event.entity_id(),
            transport = self.kind().as_str(),
            "Publishing notification"
        );

        match tokio::time::timeout(self.timeout, self.transport.send(event)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }
}
