// Farm and animal records
pub mod model;

// SQLite-backed document store
pub mod store;

// Notification events
pub mod event;

// Event transports, consumer and outbox
pub mod queue;

// Resource controllers
pub mod controller;

// HTTP API
pub mod api;

// Configuration
pub mod config;
