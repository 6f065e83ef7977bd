// Resource controllers: store operation, then notification.

mod animals;
mod farms;

pub use animals::AnimalController;
pub use farms::FarmController;

use crate::event::NotificationEvent;
use crate::model::ValidationError;
use crate::queue::{EventPublisher, Outbox, TransportKind};
use crate::store::{DocumentStore, StoreError};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Controller operation errors
#[derive(Debug)]
pub enum ControllerError {
    Validation(ValidationError),
    NotFound { entity: &'static str, id: String },
    Store(StoreError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::Validation(e) => write!(f, "{}", e),
            ControllerError::NotFound { entity, .. } => write!(f, "{} not found", entity),
            ControllerError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<StoreError> for ControllerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Invalid(v) => ControllerError::Validation(v),
            other => ControllerError::Store(other),
        }
    }
}

impl From<ValidationError> for ControllerError {
    fn from(e: ValidationError) -> Self {
        ControllerError::Validation(e)
    }
}

/// Shared document store with a per-call deadline.
///
/// Operations run on the blocking pool so SQLite I/O never stalls the
/// async workers.
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<DocumentStore>,
    timeout: Duration,
}

impl StoreHandle {
    pub fn new(store: Arc<DocumentStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Runs a read; on timeout the caller gets [`StoreError::Timeout`].
    pub async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&DocumentStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let task = tokio::task::spawn_blocking(move || op(&store));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined_result(joined),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }

    /// Runs a mutation and reports its actual outcome.
    ///
    /// Blocking work cannot be cancelled, so a write that passes the deadline
    /// may still commit. Past the deadline this keeps waiting for the task;
    /// the caller then publishes exactly when the write committed.
    pub async fn write<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&DocumentStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let mut task = tokio::task::spawn_blocking(move || op(&store));

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(joined) => joined_result(joined),
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Store write exceeded its deadline, waiting for outcome"
                );
                joined_result(task.await)
            }
        }
    }
}

fn joined_result<T>(
    joined: Result<Result<T, StoreError>, tokio::task::JoinError>,
) -> Result<T, StoreError> {
    joined.unwrap_or_else(|e| Err(StoreError::Unavailable(format!("store task failed: {}", e))))
}

/// Publishes mutation events on behalf of the controllers.
///
/// Publishing never fails the caller: the store write has already
/// succeeded, so a transport failure is logged and the event deferred to
/// the outbox.
#[derive(Clone)]
pub struct Notifier {
    publisher: EventPublisher,
    outbox: Outbox,
}

impl Notifier {
    pub fn new(publisher: EventPublisher, outbox: Outbox) -> Self {
        Self { publisher, outbox }
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.publisher.kind()
    }

    pub async fn notify(&self, event: NotificationEvent) {
        match self.publisher.publish(&event).await {
            Ok(()) => {
                debug!(event_type = event.event_type(), entity_id = %event.entity_id(), "Notification published");
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    event_type = event.event_type(),
                    entity_id = %event.entity_id(),
                    error = %e,
                    "Publish failed, deferring notification to outbox"
                );
                self.outbox.defer(event);
            }
            Err(e) => {
                error!(
                    event_type = event.event_type(),
                    entity_id = %event.entity_id(),
                    error = %e,
                    "Notification cannot be published, dropping"
                );
            }
        }
    }
}

/// Request bodies must be JSON objects
fn into_fields(body: Value) -> Result<Map<String, Value>, ValidationError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(ValidationError::NotAnObject),
    }
}
