// External Coupon Synchronizer
//
// Lazily materializes a provider coupon for a rule the first time the rule
// wins a selection. The id is stored with a compare-and-set so concurrent
// winners converge on one coupon.

use std::collections::HashMap;
use std::sync::Arc;

use crate::discounts::error::{DiscountError, DiscountResult};
use crate::discounts::metrics::PerformanceMetrics;
use crate::discounts::models::DiscountRule;
use crate::discounts::repository::DiscountStore;
use crate::discounts::types::DiscountKind;
use crate::stripe::{CouponDuration, CouponValue, CreateCouponRequest, PaymentProvider};

/// Provider coupon matching a rule's magnitude; `None` for trials
pub fn coupon_request_for(rule: &DiscountRule) -> Option<CreateCouponRequest> {
    let (value, duration) = match &rule.kind {
        DiscountKind::PercentOffOnce { percent_off } => {
            (CouponValue::PercentOff(*percent_off), CouponDuration::Once)
        }
        DiscountKind::PercentOffFirstNMonths {
            percent_off,
            first_n_months,
        } => (
            CouponValue::PercentOff(*percent_off),
            CouponDuration::Repeating {
                months: *first_n_months,
            },
        ),
        DiscountKind::AmountOffOnce {
            amount_off,
            currency,
        } => (
            CouponValue::AmountOff {
                amount_off: *amount_off,
                currency: currency.clone(),
            },
            CouponDuration::Once,
        ),
        DiscountKind::TrialDays { .. } => return None,
    };

    Some(CreateCouponRequest {
        name: rule.name.clone(),
        value,
        duration,
        metadata: HashMap::from([
            ("discount_id".to_string(), rule.id.to_string()),
            ("item_key".to_string(), rule.item_key().to_string()),
        ]),
    })
}

#[derive(Clone)]
pub struct CouponSynchronizer {
    discounts: Arc<dyn DiscountStore>,
    provider: Arc<dyn PaymentProvider>,
    metrics: PerformanceMetrics,
}

impl CouponSynchronizer {
    pub fn new(
        discounts: Arc<dyn DiscountStore>,
        provider: Arc<dyn PaymentProvider>,
        metrics: PerformanceMetrics,
    ) -> Self {
        Self {
            discounts,
            provider,
            metrics,
        }
    }

    /// Ensure `rule` carries a provider coupon id
    ///
    /// Trials and rules that already have an id are returned unchanged. A
    /// provider failure propagates and leaves the rule without an id.
    pub async fn ensure_stripe_coupon(&self, mut rule: DiscountRule) -> DiscountResult<DiscountRule> {
        if rule.stripe_coupon_id.is_some() {
            return Ok(rule);
        }
        let Some(request) = coupon_request_for(&rule) else {
            return Ok(rule);
        };

        let coupon = self.provider.create_coupon(request).await?;
        self.metrics.record_coupon_created();

        let stored = self
            .discounts
            .set_stripe_coupon_id_if_absent(rule.id, &coupon.id)
            .await?
            .ok_or(DiscountError::RuleNotFound(rule.id))?;

        if stored != coupon.id {
            self.metrics.record_orphaned_coupon();
            tracing::warn!(
                "Orphaned provider coupon {} for rule {}; rule already uses {}",
                coupon.id,
                rule.id,
                stored
            );
        } else {
            tracing::info!("Materialized coupon {} for rule {}", coupon.id, rule.id);
        }

        rule.stripe_coupon_id = Some(stored);
        Ok(rule)
    }
}
