use super::{parse_body, ApiError, AppState};
use crate::model::{Animal, AnimalView};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Query parameters for animal listing
#[derive(Deserialize)]
pub struct AnimalQueryParams {
    /// Only animals of this farm; an empty value means no filter
    #[serde(rename = "farmId")]
    pub farm_id: Option<String>,
}

/// Animal routes, relative to the `/api` prefix
pub(super) fn create_animal_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/animals", get(list_animals).post(create_animal))
        .route(
            "/animals/:id",
            get(get_animal).put(update_animal).delete(delete_animal),
        )
}

/// POST /api/animals
async fn create_animal(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Animal>), ApiError> {
    let body = parse_body(&body)?;
    let animal = state.animals.create(body).await?;
    Ok((StatusCode::CREATED, Json(animal)))
}

/// GET /api/animals?farmId=<id>
async fn list_animals(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnimalQueryParams>,
) -> Result<Json<Vec<AnimalView>>, ApiError> {
    let farm_id = params.farm_id.filter(|id| !id.is_empty());
    Ok(Json(state.animals.list(farm_id).await?))
}

/// GET /api/animals/:id
async fn get_animal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AnimalView>, ApiError> {
    Ok(Json(state.animals.get_one(&id).await?))
}

/// PUT /api/animals/:id - partial update
async fn update_animal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<AnimalView>, ApiError> {
    let body = parse_body(&body)?;
    Ok(Json(state.animals.update(&id, body).await?))
}

/// DELETE /api/animals/:id
async fn delete_animal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.animals.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
