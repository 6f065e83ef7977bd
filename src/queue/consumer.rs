use super::client::QueueClient;
use super::publisher::LogTransport;
use crate::event::NotificationEvent;
use anyhow::{Context, Result};
use async_nats::jetstream::{consumer::PullConsumer, AckKind};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Reaction to a received notification.
///
/// Returning an error leaves the message unacknowledged so the queue can
/// redeliver it; it never stops the consumer.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &NotificationEvent) -> Result<()>;
}

/// Default handler: records the notification and does nothing else.
pub struct LoggingHandler;

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &NotificationEvent) -> Result<()> {
        info!(
            event_type = event.event_type(),
            entity_id = %event.entity_id(),
            entity_name = %event.entity_name(),
            "Received notification"
        );
        Ok(())
    }
}

enum EventSource {
    Local(broadcast::Receiver<NotificationEvent>),
    Queue(Arc<QueueClient>, PullConsumer),
}

/// Background receiver for published notifications
pub struct EventConsumer {
    source: EventSource,
}

impl EventConsumer {
    /// Consume events sent through a log transport from now on
    pub fn local(transport: &LogTransport) -> Self {
        Self {
            source: EventSource::Local(transport.subscribe()),
        }
    }

    /// Consume from the managed queue's durable consumer.
    ///
    /// The consumer is created here so a broken queue fails startup.
    pub async fn queue(client: Arc<QueueClient>) -> Result<Self> {
        let consumer = client.pull_consumer().await?;
        Ok(Self {
            source: EventSource::Queue(client, consumer),
        })
    }

    /// Start the receive loop as a background task.
    ///
    /// Events are handled one at a time, in arrival order.
    pub fn subscribe(self, handler: Arc<dyn EventHandler>) -> ConsumerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            match self.source {
                EventSource::Local(rx) => run_local(rx, handler, shutdown_rx).await,
                EventSource::Queue(client, consumer) => {
                    if let Err(e) = run_queue(client, consumer, handler, shutdown_rx).await {
                        error!(
                            error = %e,
                            "Notification consumer stopped, queued notifications are no longer consumed"
                        );
                    }
                }
            }
        });

        info!("Notification consumer started");
        ConsumerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Lifecycle handle for a running consumer
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the loop to stop and wait for it to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Notification consumer task ended abnormally");
        }
        info!("Notification consumer stopped");
    }
}

/// What to tell the queue about a received message
#[derive(Debug, PartialEq, Eq)]
enum Settlement {
    /// Handled; remove from the queue
    Ack,
    /// Handler failed; redeliver
    Nak,
    /// Undecodable; remove without handling
    Discard,
}

/// Decode a queue payload and run the handler on it
async fn settle(handler: &dyn EventHandler, payload: &[u8]) -> Settlement {
    match serde_json::from_slice::<NotificationEvent>(payload) {
        Ok(event) => {
            if dispatch(handler, &event).await {
                Settlement::Ack
            } else {
                Settlement::Nak
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to decode notification, discarding");
            Settlement::Discard
        }
    }
}

/// Invoke the handler, logging failures. Returns whether the handler succeeded.
async fn dispatch(handler: &dyn EventHandler, event: &NotificationEvent) -> bool {
    match handler.handle(event).await {
        Ok(()) => true,
        Err(e) => {
            error!(
                event_type = event.event_type(),
                entity_id = %event.entity_id(),
                error = %e,
                "Notification handler failed"
            );
            false
        }
    }
}

async fn run_local(
    mut rx: broadcast::Receiver<NotificationEvent>,
    handler: Arc<dyn EventHandler>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.changed() => break,
            received = rx.recv() => received,
        };

        match received {
            Ok(event) => {
                dispatch(handler.as_ref(), &event).await;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped = skipped, "Notification consumer lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                warn!("Local notification bus closed");
                break;
            }
        }
    }
}

async fn run_queue(
    client: Arc<QueueClient>,
    consumer: PullConsumer,
    handler: Arc<dyn EventHandler>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut messages = consumer
        .messages()
        .await
        .context("Failed to open notification message stream")?;

    info!(queue = %client.queue_name(), "Consuming notifications from queue");

    loop {
        let next = tokio::select! {
            _ = shutdown.changed() => break,
            next = messages.next() => next,
        };

        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                error!(error = %e, "Error receiving notification");
                continue;
            }
            None => {
                warn!("Notification message stream ended");
                break;
            }
        };

        match settle(handler.as_ref(), &msg.payload).await {
            Settlement::Ack => {
                if let Err(e) = msg.ack().await {
                    error!(error = %e, "Failed to acknowledge notification");
                }
            }
            Settlement::Nak => {
                if let Err(e) = msg.ack_with(AckKind::Nak(None)).await {
                    error!(error = %e, "Failed to reject notification");
                }
            }
            // Acked so a malformed body is not redelivered forever
            Settlement::Discard => {
                if let Err(e) = msg.ack().await {
                    error!(error = %e, "Failed to acknowledge discarded notification");
                }
            }
        }
    }

    Ok(())
}
