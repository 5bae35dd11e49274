// Discount engine
//
// Rule storage, eligibility and "best discount wins" selection, lazy
// provider coupon creation and the redemption ledger store.

pub mod admin;
pub mod coupon_sync;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod savings;
pub mod selection;
pub mod types;

#[cfg(test)]
pub mod memory;

pub use admin::DiscountAdmin;
pub use coupon_sync::CouponSynchronizer;
pub use error::{DiscountError, DiscountResult};
pub use metrics::{MetricsSummary, PerformanceMetrics};
pub use models::{
    BillingPeriod, DiscountRule, DiscountRuleResponse, Eligibility, NewRedemption,
    ProviderAmounts, Redemption, RuleSnapshot, StripeRefs,
};
pub use repository::{
    DiscountStore, InsertOutcome, PgDiscountStore, PgRedemptionStore, RedemptionStore,
};
pub use savings::compute_savings_cents;
pub use selection::{PurchaseContext, Selection, SelectionEngine};
pub use types::{AppliedTo, DiscountKind, ItemKey, MagnitudeFields};
