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
    models::{Comment, CreateCommentRequest, UpdateCommentRequest, require_text},
};

/// create_comment
///
/// [Authenticated Route] The comment's author is the caller.
#[utoipa::path(
    post,
    path = "/v1/comments",
    tag = "comments",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Malformed car id or empty content"),
        (status = 404, description = "Car not found")
    )
)]
pub async fn create_comment(
    subject: Subject,
    State(state): State<AppState>,
    Json(payload): Json<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let car_id = parse_id(&payload.car_id, "car")?;
    let content = require_text(&payload.content, "content")?;
    let exists = state
        .repo
        .car_exists(car_id)
        .await
        .map_err(|e| ApiError::internal("failed to create comment", e))?;
    if !exists {
        return Err(ApiError::NotFound("car"));
    }
    let comment = state
        .repo
        .create_comment(subject.id, car_id, content)
        .await
        .map_err(|e| ApiError::internal("failed to create comment", e))?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// get_comments_by_car
///
/// [Public Route] Oldest first.
#[utoipa::path(
    get,
    path = "/v1/comments/{id}",
    tag = "comments",
    params(("id" = String, Path, description = "Car id")),
    responses(
        (status = 200, description = "Comments", body = [Comment]),
        (status = 400, description = "Malformed car id")
    )
)]
pub async fn get_comments_by_car(
    State(state): State<AppState>,
    Path(car_id): Path<String>,
) -> ApiResult<Json<Vec<Comment>>> {
    let car_id = parse_id(&car_id, "car")?;
    let comments = state
        .repo
        .get_comments_by_car(car_id)
        .await
        .map_err(|e| ApiError::internal("failed to retrieve comments", e))?;
    Ok(Json(comments))
}

/// update_comment
///
/// [Authenticated Route] Author-only edit.
#[utoipa::path(
    put,
    path = "/v1/comments/{id}",
    tag = "comments",
    params(("id" = String, Path, description = "Comment id")),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated comment", body = Comment),
        (status = 403, description = "Not the author")
    )
)]
pub async fn update_comment(
    subject: Subject,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateCommentRequest>,
) -> ApiResult<Json<Comment>> {
    let id = state
        .ownership
        .require_ownership(ResourceKind::Comment, &id, &subject)
        .await?;
    let content = require_text(&payload.content, "content")?;
    state
        .repo
        .update_comment(id, content)
        .await
        .map_err(|e| ApiError::internal("failed to update comment", e))?
        .map(Json)
        .ok_or(ApiError::NotFound("comment"))
}

/// delete_comment
///
/// [Authenticated Route] Author-only delete.
#[utoipa::path(
    delete,
    path = "/v1/comments/{id}",
    tag = "comments",
    params(("id" = String, Path, description = "Comment id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Malformed id"),
        (status = 403, description = "Not the author")
    )
)]
pub async fn delete_comment(
    subject: Subject,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = state
        .ownership
        .require_ownership(ResourceKind::Comment, &id, &subject)
        .await?;
    let deleted = state
        .repo
        .delete_comment(id)
        .await
        .map_err(|e| ApiError::internal("failed to delete comment", e))?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("comment"))
    }
}

/// delete_comments_by_car
///
/// [Authenticated Route] The car's owner clears the discussion on the listing.
#[utoipa::path(
    delete,
    path = "/v1/comments/car/{id}",
    tag = "comments",
    params(("id" = String, Path, description = "Car id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the car owner")
    )
)]
pub async fn delete_comments_by_car(
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
        .delete_comments_by_car(car_id)
        .await
        .map_err(|e| ApiError::internal("failed to delete comments", e))?;
    Ok(StatusCode::NO_CONTENT)
}
