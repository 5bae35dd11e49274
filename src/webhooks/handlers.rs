// HTTP handler for provider webhooks

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::webhooks::error::WebhookError;
use crate::webhooks::events::WebhookEvent;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Acknowledgement returned to the provider
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    #[schema(example = "processed")]
    pub outcome: String,
}

/// Handler for POST /api/webhooks/stripe
///
/// The body is taken as raw bytes; the signature covers the exact payload.
#[utoipa::path(
    post,
    path = "/api/webhooks/stripe",
    request_body(content = String, description = "Raw provider event payload"),
    params(("stripe-signature" = String, Header, description = "t=<timestamp>,v1=<hex hmac>")),
    responses(
        (status = 200, description = "Event recorded, ignored or already recorded", body = WebhookAck),
        (status = 400, description = "Missing or invalid signature, or malformed payload"),
        (status = 409, description = "Ledger conflict; redelivery expected"),
        (status = 502, description = "Payment provider unavailable")
    ),
    tag = "webhooks"
)]
pub async fn stripe_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, WebhookError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    state.verifier.verify(&body, signature)?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    tracing::debug!("Verified webhook {} of type {}", event.id, event.event_type);

    let outcome = state.ledger.handle_event(&event).await?;
    Ok(Json(WebhookAck {
        received: true,
        outcome: outcome.as_str().to_string(),
    }))
}
