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
    models::{Message, MessageGroup, SendMessageRequest, require_text},
};

/// send_message
///
/// [Authenticated Route] The sender is the caller.
#[utoipa::path(
    post,
    path = "/v1/messages",
    tag = "messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 400, description = "Malformed recipient, empty content or self-message")
    )
)]
pub async fn send_message(
    subject: Subject,
    State(state): State<AppState>,
    Json(payload): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    let recipient_id = parse_id(&payload.recipient_id, "recipient")?;
    if recipient_id == subject.id {
        return Err(ApiError::invalid("cannot send a message to yourself"));
    }
    let content = require_text(&payload.content, "content")?;
    let message = state
        .repo
        .create_message(subject.id, recipient_id, content)
        .await
        .map_err(|e| ApiError::internal("failed to send message", e))?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// get_messages
///
/// [Authenticated Route] The caller's conversations, most recently active first.
#[utoipa::path(
    get,
    path = "/v1/messages",
    tag = "messages",
    responses((status = 200, description = "Conversations", body = [MessageGroup]))
)]
pub async fn get_messages(
    subject: Subject,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<MessageGroup>>> {
    let messages = state
        .repo
        .get_messages_for_user(subject.id)
        .await
        .map_err(|e| ApiError::internal("failed to retrieve messages", e))?;
    Ok(Json(MessageGroup::group_by_counterpart(subject.id, messages)))
}

/// get_conversation
///
/// [Authenticated Route] Every message between the caller and one other user.
#[utoipa::path(
    get,
    path = "/v1/messages/with/{id}",
    tag = "messages",
    params(("id" = String, Path, description = "Other user's id")),
    responses(
        (status = 200, description = "Conversation", body = MessageGroup),
        (status = 400, description = "Malformed user id")
    )
)]
pub async fn get_conversation(
    subject: Subject,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<MessageGroup>> {
    let other_id = parse_id(&user_id, "user")?;
    let messages = state
        .repo
        .get_conversation(subject.id, other_id)
        .await
        .map_err(|e| ApiError::internal("failed to retrieve messages", e))?;
    Ok(Json(MessageGroup {
        user_id: other_id,
        messages,
    }))
}

/// mark_message_read
///
/// [Authenticated Route] Sender-only.
#[utoipa::path(
    put,
    path = "/v1/messages/{id}/read",
    tag = "messages",
    params(("id" = String, Path, description = "Message id")),
    responses(
        (status = 204, description = "Marked as read"),
        (status = 403, description = "Not the sender")
    )
)]
pub async fn mark_message_read(
    subject: Subject,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = state
        .ownership
        .require_ownership(ResourceKind::Message, &id, &subject)
        .await?;
    let updated = state
        .repo
        .mark_message_read(id)
        .await
        .map_err(|e| ApiError::internal("failed to update message", e))?;
    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("message"))
    }
}

/// delete_message
///
/// [Authenticated Route] Sender-only.
#[utoipa::path(
    delete,
    path = "/v1/messages/{id}",
    tag = "messages",
    params(("id" = String, Path, description = "Message id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the sender")
    )
)]
pub async fn delete_message(
    subject: Subject,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = state
        .ownership
        .require_ownership(ResourceKind::Message, &id, &subject)
        .await?;
    let deleted = state
        .repo
        .delete_message(id)
        .await
        .map_err(|e| ApiError::internal("failed to delete message", e))?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("message"))
    }
}
