use car_market::{
    AppState,
    access::{AccessPipeline, OwnershipVerifier, PathClassifier, PolicyEnforcer},
    auth::JwtIdentityResolver,
    config::{AppConfig, Env},
    create_router,
    notify::{DisabledPushSender, FcmPushClient, PushDispatcher, PushState},
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, connects to Postgres, compiles the access
/// tables and serves the router. Any startup failure aborts the process.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load().unwrap_or_else(|e| panic!("FATAL: invalid configuration: {e}"));

    // 2. Logging Filter Setup
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "car_market=debug,tower_http=info".into());

    // 3. Pretty logs locally, JSON in production.
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Database Initialization (Postgres)
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to apply database migrations.");

    let postgres = Arc::new(PostgresRepository::new(pool));
    let repo = postgres.clone() as RepositoryState;
    let ownership = OwnershipVerifier::new(postgres);

    // 5. Access Control Tables (validated here; a bad table stops startup)
    let classifier = match &config.public_routes_path {
        Some(path) => PathClassifier::from_file(path),
        None => PathClassifier::with_defaults(),
    }
    .unwrap_or_else(|e| panic!("FATAL: invalid public route table: {e}"));

    let enforcer = PolicyEnforcer::from_file(&config.policy_path)
        .await
        .unwrap_or_else(|e| panic!("FATAL: invalid policy table: {e}"));
    tracing::info!(
        policy = %config.policy_path.display(),
        public_routes = classifier.routes().len(),
        "access tables loaded"
    );

    let resolver = Arc::new(JwtIdentityResolver::new(&config.token_key));
    let pipeline = Arc::new(AccessPipeline::new(
        Arc::new(classifier),
        resolver,
        Arc::new(enforcer),
    ));

    // 6. Push Delivery (FCM when configured)
    let sender: PushState = match (&config.push.project_id, &config.push.access_token) {
        (Some(project_id), Some(access_token)) => Arc::new(
            FcmPushClient::new(project_id, access_token)
                .unwrap_or_else(|e| panic!("FATAL: failed to build FCM client: {e}")),
        ),
        _ => {
            tracing::warn!("FCM_PROJECT_ID/FCM_ACCESS_TOKEN not set, push delivery disabled");
            Arc::new(DisabledPushSender)
        }
    };
    let push = PushDispatcher::new(sender, config.push.max_in_flight);

    // 7. Unified State Assembly
    let addr = config.http_addr;
    let app_state = AppState {
        repo,
        ownership,
        push,
        pipeline,
        config,
    };

    // 8. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: failed to bind {addr}: {e}"));

    tracing::info!("Listening on {}", addr);
    tracing::info!("API Documentation (Swagger UI) available at: http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly");
}
