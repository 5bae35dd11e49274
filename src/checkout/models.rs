// Checkout request and response DTOs
//
// Field names are camelCase to match the storefront's existing contract.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::discounts::savings::subtotal_cents;
use crate::discounts::{DiscountError, DiscountResult, DiscountRule, ItemKey, MagnitudeFields};

fn default_quantity() -> i64 {
    1
}

fn default_currency() -> String {
    "usd".to_string()
}

/// Request body for POST /api/checkout/preview
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreviewCheckoutRequest {
    #[validate(length(min = 1))]
    #[schema(example = "price_basic_monthly")]
    pub price_id: String,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1))]
    pub quantity: i64,
    #[validate(length(min = 1))]
    #[schema(example = "42")]
    pub customer_id: String,
    #[validate(range(min = 0))]
    #[schema(example = 10000)]
    pub unit_amount_cents: i64,
    #[serde(default = "default_currency")]
    #[validate(custom = "crate::validation::validate_currency_code")]
    pub currency: String,
}

/// Redacted view of the winning rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppliedDiscountView {
    pub id: Uuid,
    pub name: String,
    pub item_key: ItemKey,
    pub magnitude: MagnitudeFields,
}

impl From<&DiscountRule> for AppliedDiscountView {
    fn from(rule: &DiscountRule) -> Self {
        Self {
            id: rule.id,
            name: rule.name.clone(),
            item_key: rule.item_key(),
            magnitude: rule.kind.to_fields(),
        }
    }
}

/// Price quote returned by the preview endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutQuote {
    pub subtotal: i64,
    pub discount: i64,
    /// Never negative
    pub total: i64,
    pub currency: String,
    pub trial_days: Option<i32>,
    pub discount_rule: Option<AppliedDiscountView>,
}

/// Request body for POST /api/checkout/subscription
///
/// Every field is optional at the JSON level so a missing one is reported as a
/// validation error naming the field.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionCheckoutRequest {
    pub price_id: Option<String>,
    pub quantity: Option<i64>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
    pub customer_id: Option<String>,
    pub unit_amount_cents: Option<i64>,
}

/// Session request with every required field present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub price_id: String,
    pub quantity: i64,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_id: String,
    pub unit_amount_cents: i64,
}

fn require(value: Option<String>, field: &str) -> DiscountResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(DiscountError::ValidationError(format!("{} is required", field))),
    }
}

impl CreateSubscriptionCheckoutRequest {
    pub fn into_params(self) -> DiscountResult<SessionParams> {
        let price_id = require(self.price_id, "priceId")?;
        let success_url = require(self.success_url, "successUrl")?;
        let cancel_url = require(self.cancel_url, "cancelUrl")?;
        let customer_id = require(self.customer_id, "customerId")?;
        let unit_amount_cents = self
            .unit_amount_cents
            .ok_or_else(|| DiscountError::ValidationError("unitAmountCents is required".to_string()))?;

        crate::validation::validate_url(&success_url)
            .map_err(|_| DiscountError::ValidationError("successUrl must be an http(s) URL".to_string()))?;
        crate::validation::validate_url(&cancel_url)
            .map_err(|_| DiscountError::ValidationError("cancelUrl must be an http(s) URL".to_string()))?;

        if unit_amount_cents < 0 {
            return Err(DiscountError::ValidationError(
                "unitAmountCents must be a non-negative integer".to_string(),
            ));
        }
        let quantity = self.quantity.unwrap_or(1);
        if quantity < 1 {
            return Err(DiscountError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }
        subtotal_cents(unit_amount_cents, quantity)?;

        Ok(SessionParams {
            price_id,
            quantity,
            success_url,
            cancel_url,
            customer_id,
            unit_amount_cents,
        })
    }
}

/// Provider session reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutSessionResponse {
    #[schema(example = "cs_test_a1b2c3")]
    pub id: String,
    pub url: Option<String>,
}
