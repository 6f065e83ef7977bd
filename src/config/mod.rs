use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

pub use crate::queue::{OutboxConfig, QueueConfig};

/// Complete herdbook configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Queue transport; absent means events go to the log transport
    #[serde(default)]
    pub queue: Option<QueueConfig>,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Document store configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// SQLite file path (optionally `sqlite://`-prefixed) or `:memory:`
    #[serde(default)]
    pub url: Option<String>,
}

/// Upper bounds for external calls
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_store_ms")]
    pub store_ms: u64,
    #[serde(default = "default_publish_ms")]
    pub publish_ms: u64,
}

fn default_store_ms() -> u64 {
    5000
}

fn default_publish_ms() -> u64 {
    3000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            store_ms: default_store_ms(),
            publish_ms: default_publish_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn store(&self) -> Duration {
        Duration::from_millis(self.store_ms)
    }

    pub fn publish(&self) -> Duration {
        Duration::from_millis(self.publish_ms)
    }
}

impl AppConfig {
    /// Overlay environment variables on top of file or default values.
    ///
    /// Unparseable numeric values are ignored and the previous value kept.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("HERDBOOK_STORE_URL") {
            self.store.url = Some(url);
        }

        if let Some(url) = lookup("NATS_URL").filter(|v| !v.is_empty()) {
            match self.queue.as_mut() {
                Some(queue) => queue.url = url,
                None => self.queue = Some(QueueConfig::new(url)),
            }
        }
        if let Some(queue) = self.queue.as_mut() {
            if let Some(token) = lookup("NATS_TOKEN").filter(|v| !v.is_empty()) {
                queue.token = Some(token);
            }
            if let Some(name) = lookup("HERDBOOK_QUEUE").filter(|v| !v.is_empty()) {
                queue.name = name;
            }
        }

        if let Some(port) = lookup("PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(ms) = lookup("HERDBOOK_STORE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.timeouts.store_ms = ms;
        }
        if let Some(ms) = lookup("HERDBOOK_PUBLISH_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.timeouts.publish_ms = ms;
        }
        if let Some(n) = lookup("HERDBOOK_OUTBOX_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.outbox.max_attempts = n;
        }
    }

    /// Store URL, or an error naming the missing variable
    pub fn store_url(&self) -> Result<&str> {
        match self.store.url.as_deref() {
            Some(url) if !url.is_empty() => Ok(url),
            _ => bail!("HERDBOOK_STORE_URL is required"),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<AppConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
    let config: AppConfig =
        toml::from_str(&contents).with_context(|| format!("parsing config file {}", path))?;
    Ok(config)
}

/// Load configuration: optional file named by `HERDBOOK_CONFIG`, then the
/// process environment.
pub fn load() -> Result<AppConfig> {
    let mut config = match std::env::var("HERDBOOK_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => AppConfig::default(),
    };
    config.apply_env_from(|key| std::env::var(key).ok());
    config.store_url()?;
    Ok(config)
}
