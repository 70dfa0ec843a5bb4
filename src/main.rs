//! Elidune Circulation Server
//!
//! REST API over the reservation queue and circulation ledger, with the
//! expiration and overdue sweeps running in the background.

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use elidune_circulation::{
    api,
    config::{AppConfig, LoggingConfig},
    repository::Repository,
    services::{notifications::PgNotifier, redis::RedisService, scheduler, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.logging);

    tracing::info!("Starting Elidune Circulation v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    // Redis is only needed to coordinate sweeps between instances
    let redis_service = match &config.redis.url {
        Some(url) => {
            let redis = RedisService::new(url)
                .await
                .context("Failed to connect to Redis")?;
            tracing::info!("Connected to Redis");
            Some(redis)
        }
        None => {
            tracing::info!("No Redis configured, sweeps are coordinated in-process only");
            None
        }
    };

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    // Create repository and services
    let repository = Arc::new(Repository::new(pool.clone()));
    let notifier = Arc::new(PgNotifier::new(pool));
    let services = Services::new(repository, notifier, &config, redis_service);

    let _sweeps = scheduler::start(&services, &config.scheduler);

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("elidune_circulation={},tower_http=debug", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Loans
        .route("/loans", post(api::loans::create_loan))
        .route("/loans/counts", get(api::loans::get_loan_counts))
        .route("/loans/:id/return", post(api::loans::return_loan))
        .route("/loans/:id/renew", post(api::loans::renew_loan))
        .route("/users/:id/loans", get(api::loans::get_user_loans))
        // Reservations
        .route("/reservations", post(api::reservations::create_reservation))
        .route("/reservations/:id/cancel", post(api::reservations::cancel_reservation))
        .route("/reservations/:id/convert", post(api::reservations::convert_reservation))
        .route("/users/:id/reservations", get(api::reservations::get_user_reservations))
        .route("/books/:id/queue", get(api::reservations::get_book_queue))
        // Sweeps
        .route("/sweeps/expiration", post(api::sweeps::run_expiration))
        .route("/sweeps/overdue", post(api::sweeps::run_overdue))
        .route("/sweeps/status", get(api::sweeps::get_status))
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
