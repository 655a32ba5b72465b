use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    access::{ResourceKind, parse_id},
    auth::Subject,
    error::{ApiError, ApiResult},
    models::{SaveCarRequest, SavedCar},
};

/// save_car
///
/// [Authenticated Route] Bookmarks a listing for the caller. Saving twice is a no-op.
#[utoipa::path(
    post,
    path = "/v1/saved_cars",
    tag = "saved_cars",
    request_body = SaveCarRequest,
    responses(
        (status = 201, description = "Saved", body = SavedCar),
        (status = 400, description = "Malformed car id"),
        (status = 404, description = "Car not found")
    )
)]
pub async fn save_car(
    subject: Subject,
    State(state): State<AppState>,
    Json(payload): Json<SaveCarRequest>,
) -> ApiResult<(StatusCode, Json<SavedCar>)> {
    let car_id = parse_id(&payload.car_id, "car")?;
    let exists = state
        .repo
        .car_exists(car_id)
        .await
        .map_err(|e| ApiError::internal("failed to save car", e))?;
    if !exists {
        return Err(ApiError::NotFound("car"));
    }
    let saved = state
        .repo
        .save_car(subject.id, car_id)
        .await
        .map_err(|e| ApiError::internal("failed to save car", e))?;
    Ok((StatusCode::CREATED, Json(saved)))
}

/// get_saved_cars
///
/// [Public Route]
#[utoipa::path(
    get,
    path = "/v1/saved_cars/{id}",
    tag = "saved_cars",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Saved cars", body = [SavedCar]),
        (status = 400, description = "Malformed user id")
    )
)]
pub async fn get_saved_cars(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<SavedCar>>> {
    let user_id = parse_id(&user_id, "user")?;
    let saved = state
        .repo
        .get_saved_cars(user_id)
        .await
        .map_err(|e| ApiError::internal("failed to retrieve saved cars", e))?;
    Ok(Json(saved))
}

/// delete_saved_car
///
/// [Authenticated Route]
#[utoipa::path(
    delete,
    path = "/v1/saved_cars/{id}",
    tag = "saved_cars",
    params(("id" = String, Path, description = "Saved car id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the owner")
    )
)]
pub async fn delete_saved_car(
    subject: Subject,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = state
        .ownership
        .require_ownership(ResourceKind::SavedCar, &id, &subject)
        .await?;
    let deleted = state
        .repo
        .delete_saved_car(id)
        .await
        .map_err(|e| ApiError::internal("failed to delete saved car", e))?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("saved car"))
    }
}

/// delete_saved_cars_by_car
///
/// [Authenticated Route] The car's owner clears every bookmark of the listing.
#[utoipa::path(
    delete,
    path = "/v1/cars/{id}/saved",
    tag = "saved_cars",
    params(("id" = String, Path, description = "Car id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the car owner")
    )
)]
pub async fn delete_saved_cars_by_car(
    subject: Subject,
    State(state): State<AppState>,
    Path(car_id): Path<String>,
) -> ApiResult<StatusCode> {
    let car_id = state
        .ownership
        .require_ownership(ResourceKind::Car, &car_id, &subject)
        .await?;
    state
        .repo
        .delete_saved_cars_by_car(car_id)
        .await
        .map_err(|e| ApiError::internal("failed to delete saved cars", e))?;
    Ok(StatusCode::NO_CONTENT)
}
