// HTTP API

mod animals;
mod error;
mod farms;

pub use error::ApiError;

use crate::controller::{AnimalController, FarmController, Notifier, StoreHandle};
use crate::queue::TransportKind;
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub farms: FarmController,
    pub animals: AnimalController,
    pub transport: TransportKind,
}

impl AppState {
    pub fn new(store: StoreHandle, notifier: Notifier) -> Self {
        Self {
            transport: notifier.transport_kind(),
            farms: FarmController::new(store.clone(), notifier.clone()),
            animals: AnimalController::new(store, notifier),
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    transport: TransportKind,
}

/// Create the full API router: resources under `/api`, plus `/health`.
///
/// CORS is permissive; the browser frontend is served from another origin.
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health))
        .nest(
            "/api",
            farms::create_farm_router().merge(animals::create_animal_router()),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// GET /health
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        transport: state.transport,
    })
}

/// Parse a JSON request body; malformed JSON is a validation failure.
///
/// An empty body reads as `{}`.
fn parse_body(body: &[u8]) -> Result<serde_json::Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::Validation(format!("invalid JSON body: {}", e)))
}
