use std::sync::Arc;

use dealer_promotions::auth::TokenService;
use dealer_promotions::config::AppConfig;
use dealer_promotions::discounts::{PgDiscountStore, PgRedemptionStore};
use dealer_promotions::stripe::{LiveStripeClient, WebhookVerifier};
use dealer_promotions::{create_router, db, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Dealer Promotions - Starting...");

    let config = AppConfig::from_env().expect("Invalid configuration");

    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("Failed to create database pool");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations completed successfully");

    let addr = config.bind_addr();
    let provider = LiveStripeClient::new(config.stripe.api_base, config.stripe.secret_key)
        .expect("Failed to build payment provider client");

    let state = AppState::new(
        Arc::new(PgDiscountStore::new(db_pool.clone())),
        Arc::new(PgRedemptionStore::new(db_pool.clone())),
        Arc::new(provider),
        WebhookVerifier::new(config.stripe.webhook_secret, config.stripe.webhook_tolerance_secs),
        TokenService::new(config.jwt_secret),
        config.enabled_item_keys,
        Some(db_pool),
    );
    let metrics = state.metrics.clone();
    let app = create_router(state);

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    metrics.log_summary();
    tracing::info!("Dealer Promotions - Stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
