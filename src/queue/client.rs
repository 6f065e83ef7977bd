use super::publisher::{Transport, TransportKind};
use super::TransportError;
use crate::event::NotificationEvent;
use anyhow::{Context, Result};
use async_nats::jetstream::{self, consumer::PullConsumer, stream};
use async_nats::HeaderMap;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Queue transport configuration
#[derive(Clone, Debug, Deserialize)]
pub struct QueueConfig {
    pub url: String,
    /// Auth token; omitted for unauthenticated servers
    #[serde(default)]
    pub token: Option<String>,
    /// Queue name, used as the NATS subject
    #[serde(default = "default_queue_name")]
    pub name: String,
    #[serde(default = "default_stream_name")]
    pub stream_name: String,
    /// Durable consumer name shared by all herdbook instances
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
}

pub(crate) fn default_queue_name() -> String {
    "farm.notifications".to_string()
}

fn default_stream_name() -> String {
    "HERDBOOK_NOTIFICATIONS".to_string()
}

fn default_consumer_name() -> String {
    "herdbook-notifier".to_string()
}

/// Stream max age travels as i64 nanoseconds
const MAX_AGE_LIMIT_SECS: u64 = i64::MAX as u64 / 1_000_000_000;

fn default_max_age_days() -> u64 {
    7
}

impl QueueConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            name: default_queue_name(),
            stream_name: default_stream_name(),
            consumer_name: default_consumer_name(),
            max_age_days: default_max_age_days(),
        }
    }

    /// Message retention, capped at what the server's nanosecond field holds
    pub fn max_age(&self) -> Duration {
        let secs = self
            .max_age_days
            .saturating_mul(86_400)
            .min(MAX_AGE_LIMIT_SECS);
        Duration::from_secs(secs)
    }
}

/// Process-scoped connection to the managed queue.
///
/// Created once at startup with [`QueueClient::connect`] and torn down with
/// [`QueueClient::close`] at shutdown.
pub struct QueueClient {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    config: QueueConfig,
    in_flight: Arc<AtomicUsize>,
}

impl QueueClient {
    /// Connect to NATS and make sure the work-queue stream exists
    pub async fn connect(config: QueueConfig) -> Result<Self> {
        info!(url = %config.url, queue = %config.name, "Connecting to NATS");

        let mut options = async_nats::ConnectOptions::new().name("herdbook");
        if let Some(token) = &config.token {
            options = options.token(token.clone());
        }

        let client = options
            .connect(config.url.as_str())
            .await
            .context("Failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        let queue_client = Self {
            client,
            jetstream,
            config,
            in_flight: Arc::new(AtomicUsize::new(0)),
        };

        queue_client.ensure_stream().await?;

        Ok(queue_client)
    }

    /// Ensure the JetStream stream backing the queue exists
    async fn ensure_stream(&self) -> Result<()> {
        match self.jetstream.get_stream(&self.config.stream_name).await {
            Ok(_) => {
                info!(stream = %self.config.stream_name, "Notification stream already exists");
                return Ok(());
            }
            Err(_) => {
                info!(stream = %self.config.stream_name, "Notification stream does not exist, creating...");
            }
        }

        // Work-queue retention: a message is removed once the consumer acks it
        let stream_config = stream::Config {
            name: self.config.stream_name.clone(),
            subjects: vec![self.config.name.clone()],
            max_age: self.config.max_age(),
            storage: stream::StorageType::File,
            retention: stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };

        self.jetstream
            .create_stream(stream_config)
            .await
            .context("Failed to create notification stream")?;

        info!(stream = %self.config.stream_name, "Created notification stream");
        Ok(())
    }

    /// Durable pull consumer on the queue subject
    pub async fn pull_consumer(&self) -> Result<PullConsumer> {
        let stream = self
            .jetstream
            .get_stream(&self.config.stream_name)
            .await
            .with_context(|| format!("Failed to get stream '{}'", self.config.stream_name))?;

        stream
            .get_or_create_consumer(
                &self.config.consumer_name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(self.config.consumer_name.clone()),
                    filter_subject: self.config.name.clone(),
                    ..Default::default()
                },
            )
            .await
            .context("Failed to get or create notification consumer")
    }

    /// Open a sender scoped to the configured queue.
    ///
    /// The sender is released when dropped.
    pub fn sender(&self) -> QueueSender {
        QueueSender {
            jetstream: self.jetstream.clone(),
            subject: self.config.name.clone(),
            _lease: SenderLease::acquire(Arc::clone(&self.in_flight)),
        }
    }

    /// Senders currently open
    pub fn senders_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn queue_name(&self) -> &str {
        &self.config.name
    }

    /// Flush pending publishes before the connection is dropped
    pub async fn close(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;
        info!(queue = %self.config.name, "Queue client closed");
        Ok(())
    }
}

/// Tracks one open sender; decrements the in-flight count on drop.
pub struct SenderLease {
    in_flight: Arc<AtomicUsize>,
}

impl SenderLease {
    pub fn acquire(in_flight: Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self { in_flight }
    }
}

impl Drop for SenderLease {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-call handle for publishing one message to the queue
pub struct QueueSender {
    jetstream: jetstream::Context,
    subject: String,
    _lease: SenderLease,
}

impl QueueSender {
    /// Publish a JSON body and wait for the stream ack
    pub async fn send_json(&self, body: Vec<u8>) -> Result<(), TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "application/json");

        self.jetstream
            .publish_with_headers(self.subject.clone(), headers, body.into())
            .await
            .map_err(|e| TransportError::Send(format!("publish to '{}': {}", self.subject, e)))?
            .await
            .map_err(|e| TransportError::Send(format!("ack from '{}': {}", self.subject, e)))?;

        Ok(())
    }
}

/// Transport delivering events to the managed queue
pub struct QueueTransport {
    client: Arc<QueueClient>,
}

impl QueueTransport {
    pub fn new(client: Arc<QueueClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for QueueTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Queue
    }

    async fn send(&self, event: &NotificationEvent) -> Result<(), TransportError> {
        let body =
            serde_json::to_vec(event).map_err(|e| TransportError::Serialize(e.to_string()))?;

        // Released on every return path when `sender` goes out of scope
        let sender = self.client.sender();
        sender.send_json(body).await?;

        debug!(
            event_type = event.event_type(),
            queue = %self.client.queue_name(),
            "Notification delivered to queue"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::FarmRef;
    use crate::queue::EventPublisher;

    #[test]
    fn test_queue_config_defaults() {
        let config: QueueConfig = toml::from_str(r#"url = "nats://queue:4222""#).unwrap();
        assert_eq!(config.url, "nats://queue:4222");
        assert_eq!(config.name, "farm.notifications");
        assert_eq!(config.stream_name, "HERDBOOK_NOTIFICATIONS");
        assert_eq!(config.consumer_name, "herdbook-notifier");
        assert!(config.token.is_none());
    }

    #[test]
    fn test_lease_released_on_drop() {
        let in_flight = Arc::new(AtomicUsize::new(0));

        let first = SenderLease::acquire(Arc::clone(&in_flight));
        let second = SenderLease::acquire(Arc::clone(&in_flight));
        assert_eq!(in_flight.load(Ordering::SeqCst), 2);

        drop(first);
        assert_eq!(in_flight.load(Ordering::SeqCst), 1);
        drop(second);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_max_age_saturates() {
        let mut config = QueueConfig::new("nats://queue:4222");
        assert_eq!(config.max_age(), Duration::from_secs(7 * 86_400));

        config.max_age_days = u64::MAX;
        assert_eq!(config.max_age(), Duration::from_secs(MAX_AGE_LIMIT_SECS));
    }

    #[test]
    fn test_negative_max_age_rejected() {
        let parsed: Result<QueueConfig, _> =
            toml::from_str("url = \"nats://queue:4222\"\nmax_age_days = -1");
        assert!(parsed.is_err());
    }

    fn farm_event() -> NotificationEvent {
        NotificationEvent::FarmCreated(FarmRef {
            farm_id: "f1".to_string(),
            farm_name: "Green Acres".to_string(),
        })
    }

    /// Client for a server that never answers; acks wait `ack_timeout`
    async fn unreachable_client(ack_timeout: Duration) -> Arc<QueueClient> {
        let url = "nats://127.0.0.1:1";
        let client = async_nats::ConnectOptions::new()
            .retry_on_initial_connect()
            .connect(url)
            .await
            .unwrap();
        let mut jetstream = jetstream::new(client.clone());
        jetstream.set_timeout(ack_timeout);

        Arc::new(QueueClient {
            client,
            jetstream,
            config: QueueConfig::new(url),
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    #[tokio::test]
    async fn test_failed_send_releases_sender() {
        let client = unreachable_client(Duration::from_millis(100)).await;
        let transport = QueueTransport::new(Arc::clone(&client));

        let result = transport.send(&farm_event()).await;

        assert!(matches!(result, Err(TransportError::Send(_))));
        assert_eq!(client.senders_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_send_releases_sender() {
        let client = unreachable_client(Duration::from_secs(30)).await;
        let publisher = EventPublisher::new(
            Arc::new(QueueTransport::new(Arc::clone(&client))),
            Duration::from_millis(50),
        );

        let result = publisher.publish(&farm_event()).await;

        assert!(matches!(result, Err(TransportError::Timeout(_))));
        assert_eq!(client.senders_in_flight(), 0);
    }
}
