use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    access::{ResourceKind, parse_id},
    auth::Subject,
    error::{ApiError, ApiResult},
    models::{Car, CreateCarRequest, ListCarsFilter, SearchCarFilter, UpdateCarRequest},
};

/// create_car
///
/// [Authenticated Route] Creates a listing owned by the caller.
#[utoipa::path(
    post,
    path = "/v1/cars",
    tag = "cars",
    request_body = CreateCarRequest,
    responses(
        (status = 201, description = "Car created", body = Car),
        (status = 400, description = "Invalid payload"),
        (status = 401, description = "Missing or invalid credential"),
        (status = 403, description = "Role not allowed")
    )
)]
pub async fn create_car(
    subject: Subject,
    State(state): State<AppState>,
    Json(payload): Json<CreateCarRequest>,
) -> ApiResult<(StatusCode, Json<Car>)> {
    payload.validate()?;
    let car = state
        .repo
        .create_car(subject.id, &payload)
        .await
        .map_err(|e| ApiError::internal("failed to create car", e))?;
    tracing::info!(car_id = %car.id, owner_id = %subject.id, "car created");
    Ok((StatusCode::CREATED, Json(car)))
}

/// list_cars
///
/// [Public Route] Filtered, paginated listing.
#[utoipa::path(
    get,
    path = "/v1/cars",
    tag = "cars",
    params(ListCarsFilter),
    responses(
        (status = 200, description = "Cars", body = [Car]),
        (status = 400, description = "Invalid filter")
    )
)]
pub async fn list_cars(
    State(state): State<AppState>,
    Query(filter): Query<ListCarsFilter>,
) -> ApiResult<Json<Vec<Car>>> {
    let query = filter.validate()?;
    let cars = state
        .repo
        .list_cars(&query)
        .await
        .map_err(|e| ApiError::internal("failed to list cars", e))?;
    Ok(Json(cars))
}

/// search_cars
///
/// [Public Route] Free-text search over the listing fields.
#[utoipa::path(
    get,
    path = "/v1/cars/search",
    tag = "cars",
    params(SearchCarFilter),
    responses(
        (status = 200, description = "Matching cars", body = [Car]),
        (status = 400, description = "Empty query or invalid page")
    )
)]
pub async fn search_cars(
    State(state): State<AppState>,
    Query(filter): Query<SearchCarFilter>,
) -> ApiResult<Json<Vec<Car>>> {
    let search = filter.validate()?;
    let cars = state
        .repo
        .search_cars(&search)
        .await
        .map_err(|e| ApiError::internal("failed to search cars", e))?;
    Ok(Json(cars))
}

/// get_car
///
/// [Public Route] One listing with its images.
#[utoipa::path(
    get,
    path = "/v1/cars/{id}",
    tag = "cars",
    params(("id" = String, Path, description = "Car id")),
    responses(
        (status = 200, description = "Car", body = Car),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_car(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Car>> {
    let id = parse_id(&id, "car")?;
    state
        .repo
        .get_car(id)
        .await
        .map_err(|e| ApiError::internal("failed to get car", e))?
        .map(Json)
        .ok_or(ApiError::NotFound("car"))
}

/// update_car
///
/// [Authenticated Route] Owner-only partial update.
#[utoipa::path(
    put,
    path = "/v1/cars/{id}",
    tag = "cars",
    params(("id" = String, Path, description = "Car id")),
    request_body = UpdateCarRequest,
    responses(
        (status = 200, description = "Updated car", body = Car),
        (status = 400, description = "Malformed id or payload"),
        (status = 403, description = "Not the owner")
    )
)]
pub async fn update_car(
    subject: Subject,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateCarRequest>,
) -> ApiResult<Json<Car>> {
    let id = state
        .ownership
        .require_ownership(ResourceKind::Car, &id, &subject)
        .await?;
    payload.validate()?;
    state
        .repo
        .update_car(id, &payload)
        .await
        .map_err(|e| ApiError::internal("failed to update car", e))?
        .map(Json)
        .ok_or(ApiError::NotFound("car"))
}

/// delete_car
///
/// [Authenticated Route] Owner-only delete. Images, saved entries and comments go with
/// the car.
#[utoipa::path(
    delete,
    path = "/v1/cars/{id}",
    tag = "cars",
    params(("id" = String, Path, description = "Car id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Malformed id"),
        (status = 403, description = "Not the owner")
    )
)]
pub async fn delete_car(
    subject: Subject,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = state
        .ownership
        .require_ownership(ResourceKind::Car, &id, &subject)
        .await?;
    let deleted = state
        .repo
        .delete_car(id)
        .await
        .map_err(|e| ApiError::internal("failed to delete car", e))?;
    if !deleted {
        return Err(ApiError::NotFound("car"));
    }
    tracing::info!(car_id = %id, owner_id = %subject.id, "car deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// increment_review_count
///
/// [Public Route] Counts a listing view.
#[utoipa::path(
    put,
    path = "/v1/cars/{id}/review_count_increment",
    tag = "cars",
    params(("id" = String, Path, description = "Car id")),
    responses(
        (status = 204, description = "Incremented"),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "Not found")
    )
)]
pub async fn increment_review_count(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "car")?;
    let updated = state
        .repo
        .increment_review_count(id)
        .await
        .map_err(|e| ApiError::internal("failed to increment car review count", e))?;
    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("car"))
    }
}
