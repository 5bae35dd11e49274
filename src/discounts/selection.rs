// Eligibility & Selection Engine
//
// Picks the single auto-applied rule that saves the customer the most on a
// purchase. Candidates are walked in a fixed order (priority ASC, newest
// first) and a later candidate only wins with strictly greater savings, so
// the result is deterministic for a given rule set and ledger.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;

use crate::discounts::coupon_sync::CouponSynchronizer;
use crate::discounts::error::DiscountResult;
use crate::discounts::metrics::PerformanceMetrics;
use crate::discounts::models::DiscountRule;
use crate::discounts::repository::{DiscountStore, RedemptionStore};
use crate::discounts::savings::compute_savings_cents;

/// Purchase being priced
#[derive(Debug, Clone, Copy)]
pub struct PurchaseContext<'a> {
    pub customer_id: &'a str,
    pub price_id: &'a str,
    pub quantity: i64,
    pub unit_amount_cents: i64,
}

/// Why a candidate was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotInForce,
    QuantityOutOfRange,
    NotOnAllowList,
    NotNewCustomer,
    CustomerCapReached,
    GlobalCapReached,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Rejection::NotInForce => "inactive or outside its validity window",
            Rejection::QuantityOutOfRange => "quantity outside allowed range",
            Rejection::NotOnAllowList => "customer not on allow list",
            Rejection::NotNewCustomer => "customer has prior redemptions",
            Rejection::CustomerCapReached => "per-customer redemption cap reached",
            Rejection::GlobalCapReached => "global redemption cap reached",
        };
        f.write_str(reason)
    }
}

/// Winning rule and what it saves
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub rule: DiscountRule,
    pub savings_cents: i64,
}

#[derive(Clone)]
pub struct SelectionEngine {
    discounts: Arc<dyn DiscountStore>,
    redemptions: Arc<dyn RedemptionStore>,
    coupons: CouponSynchronizer,
    metrics: PerformanceMetrics,
}

impl SelectionEngine {
    pub fn new(
        discounts: Arc<dyn DiscountStore>,
        redemptions: Arc<dyn RedemptionStore>,
        coupons: CouponSynchronizer,
        metrics: PerformanceMetrics,
    ) -> Self {
        Self {
            discounts,
            redemptions,
            coupons,
            metrics,
        }
    }

    /// Best auto-applied discount for a purchase, if any
    ///
    /// A non-trial winner comes back with its provider coupon materialized.
    pub async fn select_auto_discount(
        &self,
        ctx: PurchaseContext<'_>,
    ) -> DiscountResult<Option<Selection>> {
        self.select_auto_discount_at(ctx, Utc::now()).await
    }

    pub async fn select_auto_discount_at(
        &self,
        ctx: PurchaseContext<'_>,
        now: DateTime<Utc>,
    ) -> DiscountResult<Option<Selection>> {
        let _timer = self.metrics.start_selection();

        let Some(selection) = self.pick_best(ctx, now).await? else {
            self.metrics.record_no_discount();
            tracing::debug!(
                "No discount for customer {} on price {}",
                ctx.customer_id,
                ctx.price_id
            );
            return Ok(None);
        };

        let rule = self.coupons.ensure_stripe_coupon(selection.rule).await?;
        tracing::debug!(
            "Selected discount {} ({}) saving {} cents",
            rule.id,
            rule.item_key(),
            selection.savings_cents
        );

        Ok(Some(Selection {
            rule,
            savings_cents: selection.savings_cents,
        }))
    }

    /// Winner without touching the provider
    async fn pick_best(
        &self,
        ctx: PurchaseContext<'_>,
        now: DateTime<Utc>,
    ) -> DiscountResult<Option<Selection>> {
        let mut candidates = self.discounts.list_auto_apply_candidates(ctx.price_id).await?;
        // Store order is not trusted for the tie-break
        candidates.sort_by_key(|rule| (rule.priority, Reverse(rule.created_at), rule.id));

        let mut best: Option<Selection> = None;
        for rule in candidates {
            if let Err(reason) = self.check_eligibility(&rule, ctx, now).await? {
                tracing::debug!("Discount {} rejected: {}", rule.id, reason);
                continue;
            }

            let savings_cents = compute_savings_cents(&rule.kind, ctx.unit_amount_cents, ctx.quantity);
            let better = match &best {
                Some(current) => savings_cents > current.savings_cents,
                None => true,
            };
            if better {
                best = Some(Selection {
                    rule,
                    savings_cents,
                });
            }
        }

        Ok(best)
    }

    /// First failing gate for a candidate; cheap checks run before ledger lookups
    pub async fn check_eligibility(
        &self,
        rule: &DiscountRule,
        ctx: PurchaseContext<'_>,
        now: DateTime<Utc>,
    ) -> DiscountResult<Result<(), Rejection>> {
        if !rule.is_in_force(now) {
            return Ok(Err(Rejection::NotInForce));
        }
        if !rule.eligibility.allows_quantity(ctx.quantity) {
            return Ok(Err(Rejection::QuantityOutOfRange));
        }
        if !rule.eligibility.allows_customer(ctx.customer_id) {
            return Ok(Err(Rejection::NotOnAllowList));
        }
        if rule.eligibility.new_customer_only
            && self.redemptions.count_any_for_customer(ctx.customer_id).await? > 0
        {
            return Ok(Err(Rejection::NotNewCustomer));
        }

        let used = self
            .redemptions
            .count_for_customer(rule.id, ctx.customer_id)
            .await?;
        if used >= rule.max_redemptions_per_customer {
            return Ok(Err(Rejection::CustomerCapReached));
        }

        if let Some(global_cap) = rule.max_redemptions_global {
            if self.redemptions.count_for_rule(rule.id).await? >= global_cap {
                return Ok(Err(Rejection::GlobalCapReached));
            }
        }

        Ok(Ok(()))
    }
}
