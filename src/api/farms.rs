use super::{parse_body, ApiError, AppState};
use crate::model::Farm;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use std::sync::Arc;

/// Farm routes, relative to the `/api` prefix
pub(super) fn create_farm_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/farms", get(list_farms).post(create_farm))
        .route(
            "/farms/:id",
            get(get_farm).put(update_farm).delete(delete_farm),
        )
}

/// POST /api/farms
async fn create_farm(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Farm>), ApiError> {
    let body = parse_body(&body)?;
    let farm = state.farms.create(body).await?;
    Ok((StatusCode::CREATED, Json(farm)))
}

/// GET /api/farms
async fn list_farms(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Farm>>, ApiError> {
    Ok(Json(state.farms.list().await?))
}

/// GET /api/farms/:id
async fn get_farm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Farm>, ApiError> {
    Ok(Json(state.farms.get_one(&id).await?))
}

/// PUT /api/farms/:id - partial update
async fn update_farm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Farm>, ApiError> {
    let body = parse_body(&body)?;
    Ok(Json(state.farms.update(&id, body).await?))
}

/// DELETE /api/farms/:id
async fn delete_farm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.farms.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
