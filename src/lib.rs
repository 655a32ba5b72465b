use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
    routing::get,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access control core: route classification, role policy, ownership.
pub mod access;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod repository;

pub mod routes;

use access::{AccessPipeline, OwnershipVerifier, access_middleware};
use handlers::{cars, comments, images, messages, notifications, saved_cars, tokens};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use notify::{PushDispatcher, PushState};
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document aggregated from the `#[utoipa::path]` handlers and
/// `#[derive(ToSchema)]` models, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        cars::create_car, cars::list_cars, cars::search_cars, cars::get_car,
        cars::update_car, cars::delete_car, cars::increment_review_count,
        images::add_image, images::get_images_by_car, images::delete_images_by_car,
        images::get_image, images::delete_image,
        saved_cars::save_car, saved_cars::get_saved_cars, saved_cars::delete_saved_car,
        saved_cars::delete_saved_cars_by_car,
        comments::create_comment, comments::get_comments_by_car, comments::update_comment,
        comments::delete_comment, comments::delete_comments_by_car,
        messages::send_message, messages::get_messages, messages::get_conversation,
        messages::mark_message_read, messages::delete_message,
        notifications::create_notification, notifications::get_notifications,
        notifications::get_unread_notifications, notifications::mark_notification_read,
        notifications::delete_notification,
        tokens::register_token, tokens::get_tokens_by_user, tokens::delete_token,
    ),
    components(
        schemas(
            models::Car, models::Image, models::SavedCar, models::Comment, models::Message,
            models::MessageGroup, models::Notification, models::NotificationToken,
            models::CreateCarRequest, models::UpdateCarRequest, models::SaveCarRequest,
            models::AddImageRequest, models::CreateCommentRequest, models::UpdateCommentRequest,
            models::SendMessageRequest, models::CreateNotificationRequest,
            models::RegisterNotificationTokenRequest,
        )
    ),
    tags(
        (name = "car-market", description = "Car marketplace API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container handed to every handler. All members are cheap to
/// clone handles to immutable or internally synchronized services.
#[derive(Clone)]
pub struct AppState {
    /// Persistence behind `Arc<dyn Repository>`.
    pub repo: RepositoryState,
    /// Per-instance ownership checks for mutating handlers.
    pub ownership: OwnershipVerifier,
    /// Background push fan-out for new notifications.
    pub push: PushDispatcher,
    /// Classifier, identity resolver and policy enforcer, run by the access middleware.
    pub pipeline: Arc<AccessPipeline>,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for OwnershipVerifier {
    fn from_ref(app_state: &AppState) -> OwnershipVerifier {
        app_state.ownership.clone()
    }
}

impl FromRef<AppState> for PushDispatcher {
    fn from_ref(app_state: &AppState) -> PushDispatcher {
        app_state.push.clone()
    }
}

impl FromRef<AppState> for Arc<AccessPipeline> {
    fn from_ref(app_state: &AppState) -> Arc<AccessPipeline> {
        app_state.pipeline.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the routes, wraps all of them (fallback included) in the access
/// middleware, then adds the observability and CORS layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let pipeline = state.pipeline.clone();

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health))
        .nest("/v1", routes::v1::v1_routes())
        .with_state(state)
        // Every request, including unknown paths, is classified and authorized here.
        .layer(middleware::from_fn_with_state(pipeline, access_middleware));

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer (outermost, so preflight requests never reach the access check)
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span with method, uri and the `x-request-id` set above, so
/// every log line of a request (access denials included) is correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
