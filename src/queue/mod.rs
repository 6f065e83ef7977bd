//! Notification delivery.
//!
//! ```text
//!  controller ──notify──> EventPublisher ──> Transport ─┬─ LogTransport ──> tracing + local bus
//!       │                      │                        └─ QueueTransport ─> NATS JetStream
//!       │               (on failure)                                              │
//!       └──────────────────> Outbox ──retry/backoff──> EventPublisher             │
//!                                                                                 v
//!                              EventConsumer <── local bus | durable pull consumer
//!                                    │
//!                                    └──> EventHandler (LoggingHandler)
//! ```

use std::fmt;
use std::time::Duration;

mod client;
mod consumer;
mod outbox;
mod publisher;

pub use client::{QueueClient, QueueConfig, QueueTransport, SenderLease};
pub use consumer::{ConsumerHandle, EventConsumer, EventHandler, LoggingHandler};
pub use outbox::{Outbox, OutboxConfig};
pub use publisher::{EventPublisher, LogTransport, Transport, TransportKind};

/// Failure to hand an event to (or take one from) a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Event could not be encoded; retrying will not help
    Serialize(String),
    Send(String),
    Timeout(Duration),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Serialize(_))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Serialize(msg) => write!(f, "failed to serialize event: {}", msg),
            TransportError::Send(msg) => write!(f, "failed to send event: {}", msg),
            TransportError::Timeout(d) => {
                write!(f, "publish timed out after {}ms", d.as_millis())
            }
        }
    }
}

impl std::error::Error for TransportError {}
