use crate::{
    AppState,
    handlers::{cars, comments, images, messages, notifications, saved_cars, tokens},
};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// V1 Router Module
///
/// Paths sharing a shape must share parameter names here, so the by-user and by-id
/// variants of a collection are registered as one route with several methods.
pub fn v1_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Listings ---
        .route("/cars", get(cars::list_cars).post(cars::create_car))
        .route("/cars/search", get(cars::search_cars))
        .route(
            "/cars/{id}",
            get(cars::get_car)
                .put(cars::update_car)
                .delete(cars::delete_car),
        )
        .route(
            "/cars/{id}/review_count_increment",
            put(cars::increment_review_count),
        )
        .route(
            "/cars/{id}/images",
            get(images::get_images_by_car)
                .post(images::add_image)
                .delete(images::delete_images_by_car),
        )
        .route(
            "/cars/{id}/saved",
            delete(saved_cars::delete_saved_cars_by_car),
        )
        .route(
            "/images/{id}",
            get(images::get_image).delete(images::delete_image),
        )
        // --- Saved cars ---
        .route("/saved_cars", post(saved_cars::save_car))
        // GET takes a user id, DELETE a saved-car id.
        .route(
            "/saved_cars/{id}",
            get(saved_cars::get_saved_cars).delete(saved_cars::delete_saved_car),
        )
        // --- Comments ---
        .route("/comments", post(comments::create_comment))
        // GET takes a car id, PUT/DELETE a comment id.
        .route(
            "/comments/{id}",
            get(comments::get_comments_by_car)
                .put(comments::update_comment)
                .delete(comments::delete_comment),
        )
        .route(
            "/comments/car/{id}",
            delete(comments::delete_comments_by_car),
        )
        // --- Messages ---
        .route(
            "/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/messages/with/{id}", get(messages::get_conversation))
        .route("/messages/{id}/read", put(messages::mark_message_read))
        .route("/messages/{id}", delete(messages::delete_message))
        // --- Notifications ---
        .route("/notifications", post(notifications::create_notification))
        // GET takes a user id, DELETE a notification id.
        .route(
            "/notifications/{id}",
            get(notifications::get_notifications).delete(notifications::delete_notification),
        )
        .route(
            "/notifications/unread/{id}",
            get(notifications::get_unread_notifications),
        )
        .route(
            "/notifications/{id}/read",
            put(notifications::mark_notification_read),
        )
        // --- Notification tokens ---
        .route("/notifications_tokens", post(tokens::register_token))
        // GET takes a user id, DELETE a token id.
        .route(
            "/notifications_tokens/{id}",
            get(tokens::get_tokens_by_user).delete(tokens::delete_token),
        )
}
