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
    models::{NotificationToken, Platform, RegisterNotificationTokenRequest, require_text},
};

/// register_token
///
/// [Authenticated Route] Registers a device push token for the caller. A token
/// already registered by another user is refused without touching it.
#[utoipa::path(
    post,
    path = "/v1/notifications_tokens",
    tag = "notification_tokens",
    request_body = RegisterNotificationTokenRequest,
    responses(
        (status = 201, description = "Token registered", body = NotificationToken),
        (status = 400, description = "Unknown platform or empty token"),
        (status = 403, description = "Token belongs to another user")
    )
)]
pub async fn register_token(
    subject: Subject,
    State(state): State<AppState>,
    Json(payload): Json<RegisterNotificationTokenRequest>,
) -> ApiResult<(StatusCode, Json<NotificationToken>)> {
    let platform: Platform = payload.platform.parse()?;
    let token = require_text(&payload.token, "token")?;
    let registered = state
        .repo
        .register_token(subject.id, token, platform)
        .await
        .map_err(|e| ApiError::internal("failed to register token", e))?
        .ok_or(ApiError::PermissionDenied)?;
    Ok((StatusCode::CREATED, Json(registered)))
}

/// get_tokens_by_user
///
/// [Public Route]
#[utoipa::path(
    get,
    path = "/v1/notifications_tokens/{id}",
    tag = "notification_tokens",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Tokens", body = [NotificationToken]),
        (status = 400, description = "Malformed user id")
    )
)]
pub async fn get_tokens_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<NotificationToken>>> {
    let user_id = parse_id(&user_id, "user")?;
    let tokens = state
        .repo
        .get_tokens_by_user(user_id)
        .await
        .map_err(|e| ApiError::internal("failed to retrieve tokens", e))?;
    Ok(Json(tokens))
}

/// delete_token
///
/// [Authenticated Route] Only the user who registered a token may remove it.
#[utoipa::path(
    delete,
    path = "/v1/notifications_tokens/{id}",
    tag = "notification_tokens",
    params(("id" = String, Path, description = "Token id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the owner")
    )
)]
pub async fn delete_token(
    subject: Subject,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = state
        .ownership
        .require_ownership(ResourceKind::NotificationToken, &id, &subject)
        .await?;
    let deleted = state
        .repo
        .delete_token(id)
        .await
        .map_err(|e| ApiError::internal("failed to delete token", e))?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("notification token"))
    }
}
