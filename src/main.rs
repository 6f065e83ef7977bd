use anyhow::{Context, Result};
use herdbook::api::{create_router, AppState};
use herdbook::config;
use herdbook::controller::{Notifier, StoreHandle};
use herdbook::queue::{
    EventConsumer, EventPublisher, LogTransport, LoggingHandler, Outbox, QueueClient,
    QueueTransport, Transport,
};
use herdbook::store::DocumentStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herdbook=info".into()),
        )
        .init();

    info!("Herdbook starting...");

    let config = config::load().context("Failed to load configuration")?;

    let store = DocumentStore::open(config.store_url()?)
        .context("Failed to open document store")?;
    info!("Document store initialized");

    // Transport and consumer: the managed queue when configured, else the log
    let (transport, consumer, queue_client): (Arc<dyn Transport>, EventConsumer, _) =
        match config.queue.clone() {
            Some(queue_config) => {
                let client = Arc::new(
                    QueueClient::connect(queue_config)
                        .await
                        .context("Failed to connect to queue")?,
                );
                info!(queue = client.queue_name(), "Queue transport ready");
                let transport: Arc<dyn Transport> =
                    Arc::new(QueueTransport::new(Arc::clone(&client)));
                let consumer = EventConsumer::queue(Arc::clone(&client))
                    .await
                    .context("Failed to create notification consumer")?;
                (transport, consumer, Some(client))
            }
            None => {
                warn!("NATS_URL not set, notifications will only be logged");
                let log = LogTransport::default();
                let consumer = EventConsumer::local(&log);
                let transport: Arc<dyn Transport> = Arc::new(log);
                (transport, consumer, None)
            }
        };

    let consumer_handle = consumer.subscribe(Arc::new(LoggingHandler));

    let publisher = EventPublisher::new(transport, config.timeouts.publish());
    let (outbox, outbox_task) = Outbox::start(publisher.clone(), config.outbox.clone());

    let store = StoreHandle::new(Arc::new(store), config.timeouts.store());
    let state = AppState::new(store, Notifier::new(publisher, outbox));
    let router = create_router(state);

    let bind_addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!(addr = %bind_addr, "Herdbook API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    // Graceful shutdown: the router (and every outbox sender) is gone now
    consumer_handle.stop().await;
    if tokio::time::timeout(Duration::from_secs(10), outbox_task)
        .await
        .is_err()
    {
        warn!("Outbox still retrying at shutdown, pending notifications dropped");
    }
    if let Some(client) = queue_client {
        client.close().await.context("Failed to flush queue client")?;
    }

    info!("Herdbook stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl_c signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
