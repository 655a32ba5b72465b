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
    models::{AddImageRequest, Image, require_text},
};

/// add_image
///
/// [Authenticated Route] Attaches an uploaded file name to a listing. Only the car's
/// owner may add images.
#[utoipa::path(
    post,
    path = "/v1/cars/{id}/images",
    tag = "images",
    params(("id" = String, Path, description = "Car id")),
    request_body = AddImageRequest,
    responses(
        (status = 201, description = "Image added", body = Image),
        (status = 400, description = "Malformed id or empty filename"),
        (status = 403, description = "Not the car owner")
    )
)]
pub async fn add_image(
    subject: Subject,
    State(state): State<AppState>,
    Path(car_id): Path<String>,
    Json(payload): Json<AddImageRequest>,
) -> ApiResult<(StatusCode, Json<Image>)> {
    let car_id = state
        .ownership
        .require_ownership(ResourceKind::Car, &car_id, &subject)
        .await?;
    let filename = require_text(&payload.filename, "filename")?;
    let image = state
        .repo
        .add_image(car_id, filename)
        .await
        .map_err(|e| ApiError::internal("failed to upload image", e))?;
    Ok((StatusCode::CREATED, Json(image)))
}

/// get_images_by_car
///
/// [Public Route]
#[utoipa::path(
    get,
    path = "/v1/cars/{id}/images",
    tag = "images",
    params(("id" = String, Path, description = "Car id")),
    responses(
        (status = 200, description = "Images", body = [Image]),
        (status = 400, description = "Malformed id")
    )
)]
pub async fn get_images_by_car(
    State(state): State<AppState>,
    Path(car_id): Path<String>,
) -> ApiResult<Json<Vec<Image>>> {
    let car_id = parse_id(&car_id, "car")?;
    let images = state
        .repo
        .get_images_by_car(car_id)
        .await
        .map_err(|e| ApiError::internal("failed to retrieve images", e))?;
    Ok(Json(images))
}

/// delete_images_by_car
///
/// [Authenticated Route] Removes every image of a listing the caller owns.
#[utoipa::path(
    delete,
    path = "/v1/cars/{id}/images",
    tag = "images",
    params(("id" = String, Path, description = "Car id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the car owner")
    )
)]
pub async fn delete_images_by_car(
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
        .delete_images_by_car(car_id)
        .await
        .map_err(|e| ApiError::internal("failed to delete images", e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// get_image
///
/// [Public Route]
#[utoipa::path(
    get,
    path = "/v1/images/{id}",
    tag = "images",
    params(("id" = String, Path, description = "Image id")),
    responses(
        (status = 200, description = "Image", body = Image),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Image>> {
    let id = parse_id(&id, "image")?;
    state
        .repo
        .get_image(id)
        .await
        .map_err(|e| ApiError::internal("failed to retrieve image", e))?
        .map(Json)
        .ok_or(ApiError::NotFound("image"))
}

/// delete_image
///
/// [Authenticated Route] An image belongs to whoever owns its car.
#[utoipa::path(
    delete,
    path = "/v1/images/{id}",
    tag = "images",
    params(("id" = String, Path, description = "Image id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the car owner")
    )
)]
pub async fn delete_image(
    subject: Subject,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = state
        .ownership
        .require_ownership(ResourceKind::Image, &id, &subject)
        .await?;
    let deleted = state
        .repo
        .delete_image(id)
        .await
        .map_err(|e| ApiError::internal("failed to delete image", e))?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("image"))
    }
}
