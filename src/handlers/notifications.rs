use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    access::parse_id,
    error::{ApiError, ApiResult},
    models::{CreateNotificationRequest, Notification, NotificationFeed, require_text},
    notify::PushMessage,
};

/// create_notification
///
/// [Public Route] Stores the notification, then pushes it to every registered device of
/// the recipient. The push fan-out runs in the background and never affects the
/// response.
#[utoipa::path(
    post,
    path = "/v1/notifications",
    tag = "notifications",
    request_body = CreateNotificationRequest,
    responses(
        (status = 201, description = "Notification created", body = Notification),
        (status = 400, description = "Malformed user id or empty message")
    )
)]
pub async fn create_notification(
    State(state): State<AppState>,
    Json(payload): Json<CreateNotificationRequest>,
) -> ApiResult<(StatusCode, Json<Notification>)> {
    let user_id = parse_id(&payload.user_id, "user")?;
    let message = require_text(&payload.message, "message")?;
    let notification = state
        .repo
        .create_notification(user_id, payload.notification_type.trim(), message)
        .await
        .map_err(|e| ApiError::internal("failed to create notification", e))?;

    start_push(&state, user_id, &notification).await;

    Ok((StatusCode::CREATED, Json(notification)))
}

async fn start_push(state: &AppState, user_id: Uuid, notification: &Notification) {
    let tokens = match state.repo.get_tokens_by_user(user_id).await {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::error!(user_id = %user_id, error = ?e, "failed to load notification tokens");
            return;
        }
    };
    if tokens.is_empty() {
        return;
    }
    let message = PushMessage {
        title: notification.notification_type.clone(),
        body: notification.message.clone(),
    };
    // The handle is dropped; the fan-out keeps running on its own task.
    let _ = state
        .push
        .dispatch(tokens.into_iter().map(|t| t.token).collect(), message);
}

/// get_notifications
///
/// [Public Route] Every notification of a user, newest first.
#[utoipa::path(
    get,
    path = "/v1/notifications/{id}",
    tag = "notifications",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Notifications", body = [Notification]),
        (status = 400, description = "Malformed user id")
    )
)]
pub async fn get_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<Notification>>> {
    list_feed(&state, &user_id, NotificationFeed::All).await
}

/// get_unread_notifications
///
/// [Public Route]
#[utoipa::path(
    get,
    path = "/v1/notifications/unread/{id}",
    tag = "notifications",
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Unread notifications", body = [Notification]),
        (status = 400, description = "Malformed user id")
    )
)]
pub async fn get_unread_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Vec<Notification>>> {
    list_feed(&state, &user_id, NotificationFeed::Unread).await
}

async fn list_feed(
    state: &AppState,
    raw_user_id: &str,
    feed: NotificationFeed,
) -> ApiResult<Json<Vec<Notification>>> {
    let user_id = parse_id(raw_user_id, "user")?;
    let notifications = state
        .repo
        .get_notifications(user_id, feed)
        .await
        .map_err(|e| ApiError::internal("failed to retrieve notifications", e))?;
    Ok(Json(notifications))
}

/// mark_notification_read
///
/// [Public Route]
#[utoipa::path(
    put,
    path = "/v1/notifications/{id}/read",
    tag = "notifications",
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Marked as read"),
        (status = 404, description = "Not found")
    )
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "notification")?;
    let updated = state
        .repo
        .mark_notification_read(id)
        .await
        .map_err(|e| ApiError::internal("failed to update notification", e))?;
    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("notification"))
    }
}

/// delete_notification
///
/// [Public Route]
#[utoipa::path(
    delete,
    path = "/v1/notifications/{id}",
    tag = "notifications",
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "notification")?;
    let deleted = state
        .repo
        .delete_notification(id)
        .await
        .map_err(|e| ApiError::internal("failed to delete notification", e))?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("notification"))
    }
}
