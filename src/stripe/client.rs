// Payment provider abstraction
//
// The engine talks to the provider only through `PaymentProvider` so the live
// HTTP client can be swapped for a recording mock in tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

use crate::stripe::metadata::DiscountMetadata;

/// Errors from the payment provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider answered with a non-success status
    #[error("Stripe API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Transport failure before a response was received
    #[error("Stripe request failed: {0}")]
    Http(String),

    /// Response body did not have the expected shape
    #[error("Unexpected Stripe response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

/// How long a provider coupon applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponDuration {
    Once,
    Repeating { months: i32 },
}

impl CouponDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponDuration::Once => "once",
            CouponDuration::Repeating { .. } => "repeating",
        }
    }
}

/// Value of a provider coupon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponValue {
    PercentOff(Decimal),
    AmountOff { amount_off: i64, currency: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCouponRequest {
    pub name: String,
    pub value: CouponValue,
    pub duration: CouponDuration,
    /// Attached to the coupon so it can be traced back to its rule
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCoupon {
    pub id: String,
}

/// Discount attached to a checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionDiscount {
    Coupon(String),
    TrialPeriodDays(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCheckoutSessionRequest {
    pub price_id: String,
    pub quantity: i64,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_id: String,
    pub discount: Option<SessionDiscount>,
    /// Written to both the session and its subscription
    pub metadata: DiscountMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_coupon(&self, request: CreateCouponRequest) -> Result<ProviderCoupon, ProviderError>;

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSessionRequest,
    ) -> Result<ProviderCheckoutSession, ProviderError>;

    /// Metadata attached to a subscription
    async fn get_subscription_metadata(
        &self,
        subscription_id: &str,
    ) -> Result<HashMap<String, String>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Api {
            status: 402,
            message: "card declined".to_string(),
        };
        assert_eq!(err.to_string(), "Stripe API error (402): card declined");
    }

    #[test]
    fn test_coupon_duration_strings() {
        assert_eq!(CouponDuration::Once.as_str(), "once");
        assert_eq!(CouponDuration::Repeating { months: 3 }.as_str(), "repeating");
    }
}
