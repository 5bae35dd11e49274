// Dealer promotions service
//
// Auto-applied discount selection for subscription checkout, lazy provider
// coupon creation and a webhook-fed redemption ledger.

pub mod auth;
pub mod checkout;
pub mod config;
pub mod db;
pub mod discounts;
pub mod error;
pub mod stripe;
pub mod validation;
pub mod webhooks;

use axum::{
    extract::State,
    http::Uri,
    middleware,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use auth::{require_operator, TokenService};
use checkout::CheckoutService;
use discounts::{
    CouponSynchronizer, DiscountAdmin, DiscountStore, ItemKey, PerformanceMetrics,
    RedemptionStore, SelectionEngine,
};
use error::ApiError;
use stripe::{PaymentProvider, WebhookVerifier};
use webhooks::RedemptionLedger;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        checkout::handlers::preview_checkout_handler,
        checkout::handlers::create_checkout_session_handler,
        webhooks::handlers::stripe_webhook_handler,
        discounts::handlers::create_discount_handler,
        discounts::handlers::list_discounts_handler,
        discounts::handlers::get_discount_handler,
        discounts::handlers::update_discount_handler,
        discounts::handlers::toggle_discount_handler,
        discounts::handlers::list_redemptions_handler,
        discounts::handlers::metrics_handler,
    ),
    components(schemas(
        HealthResponse,
        checkout::PreviewCheckoutRequest,
        checkout::CheckoutQuote,
        checkout::AppliedDiscountView,
        checkout::CreateSubscriptionCheckoutRequest,
        checkout::CheckoutSessionResponse,
        webhooks::WebhookAck,
        discounts::models::CreateDiscountRequest,
        discounts::models::UpdateDiscountRequest,
        discounts::DiscountRuleResponse,
        discounts::Eligibility,
        discounts::MagnitudeFields,
        discounts::ItemKey,
        discounts::AppliedTo,
        discounts::Redemption,
        discounts::StripeRefs,
        discounts::ProviderAmounts,
        discounts::RuleSnapshot,
        discounts::BillingPeriod,
        discounts::MetricsSummary,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "checkout", description = "Checkout preview and subscription sessions"),
        (name = "webhooks", description = "Payment provider event intake"),
        (name = "discounts", description = "Discount rule administration (operator only)"),
        (name = "health", description = "Liveness")
    ),
    info(
        title = "Dealer Promotions API",
        version = "0.1.0",
        description = "Auto-applied discounts for dealer subscriptions"
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub admin: DiscountAdmin,
    pub checkout: CheckoutService,
    pub ledger: RedemptionLedger,
    pub verifier: Arc<WebhookVerifier>,
    pub tokens: Arc<TokenService>,
    pub metrics: PerformanceMetrics,
    /// Absent when the stores are not database backed
    pub db: Option<PgPool>,
}

impl AppState {
    /// Wire the engine, checkout, ledger and admin services over shared stores
    pub fn new(
        discounts: Arc<dyn DiscountStore>,
        redemptions: Arc<dyn RedemptionStore>,
        provider: Arc<dyn PaymentProvider>,
        verifier: WebhookVerifier,
        tokens: TokenService,
        enabled_item_keys: HashSet<ItemKey>,
        db: Option<PgPool>,
    ) -> Self {
        let metrics = PerformanceMetrics::new();
        let coupons = CouponSynchronizer::new(discounts.clone(), provider.clone(), metrics.clone());
        let engine = SelectionEngine::new(
            discounts.clone(),
            redemptions.clone(),
            coupons,
            metrics.clone(),
        );

        Self {
            admin: DiscountAdmin::new(discounts.clone(), redemptions.clone(), enabled_item_keys),
            checkout: CheckoutService::new(engine, provider.clone()),
            ledger: RedemptionLedger::new(discounts, redemptions, provider, metrics.clone()),
            verifier: Arc::new(verifier),
            tokens: Arc::new(tokens),
            metrics,
            db,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "up")]
    pub database: String,
}

/// Handler for GET /health
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
        (status = 503, description = "Database unreachable")
    ),
    tag = "health"
)]
async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let database = match &state.db {
        Some(pool) => {
            db::ping(pool)
                .await
                .map_err(|e| ApiError::ServiceUnavailable(format!("database ping failed: {}", e)))?;
            "up"
        }
        None => "not_configured",
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        database: database.to_string(),
    }))
}

async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::NotFound {
        path: uri.path().to_string(),
    }
}

/// Creates and configures the application router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .route(
            "/api/admin/discounts",
            post(discounts::handlers::create_discount_handler)
                .get(discounts::handlers::list_discounts_handler),
        )
        .route(
            "/api/admin/discounts/metrics",
            get(discounts::handlers::metrics_handler),
        )
        .route(
            "/api/admin/discounts/:id",
            get(discounts::handlers::get_discount_handler)
                .put(discounts::handlers::update_discount_handler),
        )
        .route(
            "/api/admin/discounts/:id/toggle",
            patch(discounts::handlers::toggle_discount_handler),
        )
        .route(
            "/api/admin/discounts/:id/redemptions",
            get(discounts::handlers::list_redemptions_handler),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_operator));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health_check))
        .route(
            "/api/checkout/preview",
            post(checkout::handlers::preview_checkout_handler),
        )
        .route(
            "/api/checkout/subscription",
            post(checkout::handlers::create_checkout_session_handler),
        )
        .route(
            "/api/webhooks/stripe",
            post(webhooks::handlers::stripe_webhook_handler),
        )
        .merge(admin)
        .fallback(route_not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
