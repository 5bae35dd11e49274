// Checkout preview and subscription session builder

pub mod handlers;
pub mod models;
pub mod service;

pub use models::{
    AppliedDiscountView, CheckoutQuote, CheckoutSessionResponse, CreateSubscriptionCheckoutRequest,
    PreviewCheckoutRequest, SessionParams,
};
pub use service::CheckoutService;
