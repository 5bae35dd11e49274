// Payment provider integration
//
// Provider trait and live REST client, the session metadata contract and
// webhook signature verification.

pub mod client;
pub mod live;
pub mod metadata;
pub mod signature;

#[cfg(test)]
pub mod mock;

pub use client::{
    CouponDuration, CouponValue, CreateCheckoutSessionRequest, CreateCouponRequest,
    PaymentProvider, ProviderCheckoutSession, ProviderCoupon, ProviderError, SessionDiscount,
};
pub use live::LiveStripeClient;
pub use metadata::DiscountMetadata;
pub use signature::{SignatureError, WebhookVerifier};
