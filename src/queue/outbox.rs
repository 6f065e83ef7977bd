// Out-of-band redelivery for notifications whose inline publish failed.
//
// The store write is the transaction boundary: a request succeeds once its
// document is written, and a failed publish lands here. The dispatcher retries
// each event with exponential backoff plus jitter, one event at a time, so
// deferred events keep their order among themselves. Events published inline
// while a deferred one waits can reach consumers first. The buffer is in
// memory; events still pending at process exit are lost.

use super::publisher::EventPublisher;
use crate::event::NotificationEvent;
use rand::Rng;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outbox retry settings
#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    /// Publish attempts per event before it is dropped
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Pending events held before new failures are dropped
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_max_attempts() -> u32 {
    8
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_capacity() -> usize {
    1024
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            capacity: default_capacity(),
        }
    }
}

impl OutboxConfig {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped at the max, plus up to 25% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(20);
        let delay = self
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        let jitter = if delay >= 4 {
            rand::thread_rng().gen_range(0..=delay / 4)
        } else {
            0
        };
        Duration::from_millis(delay + jitter)
    }
}

/// Handle for deferring events to the retry dispatcher.
///
/// The dispatcher exits once every handle has been dropped and the buffer is
/// drained.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<NotificationEvent>,
}

impl Outbox {
    /// Spawn the dispatcher publishing through `publisher`
    pub fn start(publisher: EventPublisher, config: OutboxConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        let task = tokio::spawn(run_dispatcher(publisher, config, rx));
        (Self { tx }, task)
    }

    /// Queue an event for redelivery. Returns false if the buffer is full
    /// or the dispatcher is gone; the event is then dropped.
    pub fn defer(&self, event: NotificationEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                error!(
                    event_type = event.event_type(),
                    entity_id = %event.entity_id(),
                    "Outbox full, dropping notification"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                error!(
                    event_type = event.event_type(),
                    entity_id = %event.entity_id(),
                    "Outbox closed, dropping notification"
                );
                false
            }
        }
    }
}

async fn run_dispatcher(
    publisher: EventPublisher,
    config: OutboxConfig,
    mut rx: mpsc::Receiver<NotificationEvent>,
) {
    while let Some(event) = rx.recv().await {
        deliver_with_retry(&publisher, &config, &event).await;
    }
    info!("Outbox drained");
}

async fn deliver_with_retry(
    publisher: &EventPublisher,
    config: &OutboxConfig,
    event: &NotificationEvent,
) -> bool {
    for attempt in 1..=config.max_attempts {
        let delay = config.backoff(attempt);
        debug!(
            event_type = event.event_type(),
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            "Backing off before redelivery"
        );
        tokio::time::sleep(delay).await;

        match publisher.publish(event).await {
            Ok(()) => {
                info!(
                    event_type = event.event_type(),
                    entity_id = %event.entity_id(),
                    attempt = attempt,
                    "Deferred notification delivered"
                );
                return true;
            }
            Err(e) if e.is_retryable() => {
                warn!(
                    event_type = event.event_type(),
                    entity_id = %event.entity_id(),
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    error = %e,
                    "Redelivery failed, will retry"
                );
            }
            Err(e) => {
                error!(
                    event_type = event.event_type(),
                    entity_id = %event.entity_id(),
                    error = %e,
                    "Notification cannot be delivered, dropping"
                );
                return false;
            }
        }
    }

    error!(
        event_type = event.event_type(),
        entity_id = %event.entity_id(),
        max_attempts = config.max_attempts,
        "Notification dropped after exhausting retries"
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FarmRef;
    use crate::queue::{Transport, TransportError, TransportKind};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Fails the first `failures` sends, then records
    struct FlakyTransport {
        failures: AtomicU32,
        delivered: Mutex<Vec<NotificationEvent>>,
    }

    impl FlakyTransport {
        fn new(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Queue
        }

        async fn send(&self, event: &NotificationEvent) -> Result<(), TransportError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(TransportError::Send("broker unavailable".to_string()));
            }
            self.delivered.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn fast_config(max_attempts: u32) -> OutboxConfig {
        OutboxConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
            capacity: 8,
        }
    }

    fn farm_event(name: &str) -> NotificationEvent {
        NotificationEvent::FarmUpdated(FarmRef {
            farm_id: format!("id-{}", name),
            farm_name: name.to_string(),
        })
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = OutboxConfig {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            capacity: 1,
        };

        let first = config.backoff(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));

        let third = config.backoff(3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(500));

        let capped = config.backoff(30);
        assert!(capped >= Duration::from_millis(1_000) && capped <= Duration::from_millis(1_250));
    }

    #[tokio::test]
    async fn test_deferred_event_delivered_after_retries() {
        let transport = Arc::new(FlakyTransport::new(2));
        let publisher = EventPublisher::new(transport.clone(), Duration::from_secs(1));
        let (outbox, task) = Outbox::start(publisher, fast_config(5));

        assert!(outbox.defer(farm_event("north")));
        drop(outbox);
        task.await.unwrap();

        assert_eq!(*transport.delivered.lock().unwrap(), vec![farm_event("north")]);
    }

    #[tokio::test]
    async fn test_event_dropped_after_max_attempts() {
        let transport = Arc::new(FlakyTransport::new(10));
        let publisher = EventPublisher::new(transport.clone(), Duration::from_secs(1));

        let delivered = deliver_with_retry(&publisher, &fast_config(3), &farm_event("south")).await;

        assert!(!delivered);
        assert!(transport.delivered.lock().unwrap().is_empty());
        // 10 failures configured, 3 consumed
        assert_eq!(transport.failures.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_defer_preserves_order() {
        let transport = Arc::new(FlakyTransport::new(1));
        let publisher = EventPublisher::new(transport.clone(), Duration::from_secs(1));
        let (outbox, task) = Outbox::start(publisher, fast_config(5));

        outbox.defer(farm_event("a"));
        outbox.defer(farm_event("b"));
        drop(outbox);
        task.await.unwrap();

        assert_eq!(
            *transport.delivered.lock().unwrap(),
            vec![farm_event("a"), farm_event("b")]
        );
    }
}
