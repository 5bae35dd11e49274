// HTTP handlers for checkout preview and session creation

use axum::{extract::State, Json};

use crate::checkout::models::{
    CheckoutQuote, CheckoutSessionResponse, CreateSubscriptionCheckoutRequest,
    PreviewCheckoutRequest,
};
use crate::discounts::DiscountError;
use crate::AppState;

/// Handler for POST /api/checkout/preview
#[utoipa::path(
    post,
    path = "/api/checkout/preview",
    request_body = PreviewCheckoutRequest,
    responses(
        (status = 200, description = "Price quote with the auto-applied discount", body = CheckoutQuote),
        (status = 400, description = "Invalid input"),
        (status = 502, description = "Payment provider unavailable")
    ),
    tag = "checkout"
)]
pub async fn preview_checkout_handler(
    State(state): State<AppState>,
    Json(request): Json<PreviewCheckoutRequest>,
) -> Result<Json<CheckoutQuote>, DiscountError> {
    let quote = state.checkout.preview_subscription_checkout(request).await?;
    Ok(Json(quote))
}

/// Handler for POST /api/checkout/subscription
#[utoipa::path(
    post,
    path = "/api/checkout/subscription",
    request_body = CreateSubscriptionCheckoutRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutSessionResponse),
        (status = 400, description = "Missing or invalid field"),
        (status = 502, description = "Payment provider unavailable")
    ),
    tag = "checkout"
)]
pub async fn create_checkout_session_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateSubscriptionCheckoutRequest>,
) -> Result<Json<CheckoutSessionResponse>, DiscountError> {
    let params = request.into_params()?;
    let session = state.checkout.create_subscription_checkout_session(params).await?;
    Ok(Json(session))
}
