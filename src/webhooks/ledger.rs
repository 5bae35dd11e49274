// Redemption Ledger
//
// Turns verified provider events into append-only redemption rows. Each row
// is keyed by the provider's session or invoice id, so redelivered events
// land on a unique index and are acknowledged without a second write.

use std::sync::Arc;

use crate::discounts::{
    AppliedTo, BillingPeriod, DiscountResult, DiscountStore, InsertOutcome, ItemKey,
    NewRedemption, PerformanceMetrics, ProviderAmounts, RedemptionStore, RuleSnapshot, StripeRefs,
};
use crate::stripe::{DiscountMetadata, PaymentProvider};
use crate::webhooks::error::WebhookError;
use crate::webhooks::events::{
    CheckoutSessionObject, InvoiceObject, WebhookEvent, CHECKOUT_SESSION_COMPLETED,
    INVOICE_PAYMENT_SUCCEEDED,
};

/// Outcome of handling one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    /// Not an event or object the ledger records
    Ignored,
    /// Already in the ledger
    AlreadyProcessed,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::AlreadyProcessed => "already_processed",
        }
    }
}

#[derive(Clone)]
pub struct RedemptionLedger {
    discounts: Arc<dyn DiscountStore>,
    redemptions: Arc<dyn RedemptionStore>,
    provider: Arc<dyn PaymentProvider>,
    metrics: PerformanceMetrics,
}

impl RedemptionLedger {
    pub fn new(
        discounts: Arc<dyn DiscountStore>,
        redemptions: Arc<dyn RedemptionStore>,
        provider: Arc<dyn PaymentProvider>,
        metrics: PerformanceMetrics,
    ) -> Self {
        Self {
            discounts,
            redemptions,
            provider,
            metrics,
        }
    }

    pub async fn handle_event(&self, event: &WebhookEvent) -> Result<WebhookOutcome, WebhookError> {
        let outcome = match event.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                let session: CheckoutSessionObject = event
                    .object()
                    .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
                self.record_checkout_completed(&session).await?
            }
            INVOICE_PAYMENT_SUCCEEDED => {
                let invoice: InvoiceObject = event
                    .object()
                    .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
                self.record_invoice_payment(&invoice).await?
            }
            other => {
                tracing::debug!("Ignoring webhook event {} of type {}", event.id, other);
                WebhookOutcome::Ignored
            }
        };

        tracing::info!(
            "Webhook {} ({}) {}",
            event.id,
            event.event_type,
            outcome.as_str()
        );
        Ok(outcome)
    }

    /// Record a trial granted at checkout
    ///
    /// Non-trial discounts are recorded from their invoices, which carry the
    /// amounts the provider actually charged.
    pub async fn record_checkout_completed(
        &self,
        session: &CheckoutSessionObject,
    ) -> DiscountResult<WebhookOutcome> {
        let metadata = DiscountMetadata::from_map(&session.metadata);

        let (Some(discount_id), Some(ItemKey::TrialDays)) =
            (metadata.applied_discount_id, metadata.applied_item_key)
        else {
            return Ok(WebhookOutcome::Ignored);
        };
        let Some(customer_id) = metadata.customer_id else {
            tracing::warn!("Checkout session {} has a discount but no customer_id", session.id);
            return Ok(WebhookOutcome::Ignored);
        };

        let rule = self.discounts.get(discount_id).await?;
        let rule_snapshot = rule.as_ref().map(RuleSnapshot::of).unwrap_or_else(RuleSnapshot::missing);

        let redemption = NewRedemption {
            discount_id,
            customer_id,
            applied_to: AppliedTo::Checkout,
            stripe: StripeRefs {
                session_id: Some(session.id.clone()),
                subscription_id: session.subscription.as_ref().map(|s| s.id().to_string()),
                ..Default::default()
            },
            amounts: ProviderAmounts::reported(
                session.currency.clone(),
                session.amount_subtotal,
                session
                    .total_details
                    .as_ref()
                    .and_then(|details| details.amount_discount),
                session.amount_total,
            ),
            rule_snapshot,
            period: BillingPeriod::default(),
        };

        self.insert(redemption).await
    }

    /// Record a discounted subscription invoice
    pub async fn record_invoice_payment(&self, invoice: &InvoiceObject) -> DiscountResult<WebhookOutcome> {
        let Some(subscription_id) = invoice.subscription_id() else {
            return Ok(WebhookOutcome::Ignored);
        };

        if self.redemptions.invoice_recorded(&invoice.id).await? {
            self.metrics.record_duplicate_delivery();
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let metadata = DiscountMetadata::from_map(
            &self.provider.get_subscription_metadata(subscription_id).await?,
        );
        let (Some(discount_id), Some(item_key), Some(customer_id)) = (
            metadata.applied_discount_id,
            metadata.applied_item_key,
            metadata.customer_id,
        ) else {
            return Ok(WebhookOutcome::Ignored);
        };

        // Trials are recorded once at checkout
        if item_key == ItemKey::TrialDays {
            return Ok(WebhookOutcome::Ignored);
        }
        let discount = invoice.discount_total();
        if discount == Some(0) {
            tracing::debug!("Invoice {} carried no discount; not recorded", invoice.id);
            return Ok(WebhookOutcome::Ignored);
        }

        let rule = self.discounts.get(discount_id).await?;
        let rule_snapshot = rule.as_ref().map(RuleSnapshot::of).unwrap_or_else(RuleSnapshot::missing);
        let previous = self
            .redemptions
            .count_for_customer(discount_id, &customer_id)
            .await?;
        let month_index = i32::try_from(previous + 1).unwrap_or(i32::MAX);
        let (start, end) = invoice.billing_period();

        let redemption = NewRedemption {
            discount_id,
            customer_id,
            applied_to: AppliedTo::Invoice,
            stripe: StripeRefs {
                invoice_id: Some(invoice.id.clone()),
                subscription_id: Some(subscription_id.to_string()),
                coupon_id: rule.and_then(|r| r.stripe_coupon_id),
                ..Default::default()
            },
            amounts: ProviderAmounts::reported(
                invoice.currency.clone(),
                invoice.subtotal,
                discount,
                invoice.total,
            ),
            rule_snapshot,
            period: BillingPeriod {
                start,
                end,
                month_index: Some(month_index),
            },
        };

        self.insert(redemption).await
    }

    async fn insert(&self, redemption: NewRedemption) -> DiscountResult<WebhookOutcome> {
        match self.redemptions.insert(redemption).await? {
            InsertOutcome::Recorded(stored) => {
                self.metrics.record_redemption();
                tracing::info!(
                    "Recorded redemption {} of discount {} for customer {} ({})",
                    stored.id,
                    stored.discount_id,
                    stored.customer_id,
                    stored.applied_to
                );
                Ok(WebhookOutcome::Processed)
            }
            InsertOutcome::Duplicate => {
                self.metrics.record_duplicate_delivery();
                Ok(WebhookOutcome::AlreadyProcessed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discounts::memory::{InMemoryDiscountStore, InMemoryRedemptionStore};
    use crate::discounts::{DiscountError, DiscountKind, DiscountRule, Eligibility};
    use crate::stripe::metadata::{META_APPLIED_DISCOUNT_ID, META_APPLIED_ITEM_KEY, META_CUSTOMER_ID};
    use crate::stripe::mock::MockPaymentProvider;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::HashMap;
    use uuid::Uuid;

    struct Harness {
        discounts: Arc<InMemoryDiscountStore>,
        redemptions: Arc<InMemoryRedemptionStore>,
        provider: Arc<MockPaymentProvider>,
        ledger: RedemptionLedger,
    }

    fn harness() -> Harness {
        let discounts = Arc::new(InMemoryDiscountStore::new());
        let redemptions = Arc::new(InMemoryRedemptionStore::new());
        let provider = Arc::new(MockPaymentProvider::new());
        let ledger = RedemptionLedger::new(
            discounts.clone(),
            redemptions.clone(),
            provider.clone(),
            PerformanceMetrics::new(),
        );
        Harness {
            discounts,
            redemptions,
            provider,
            ledger,
        }
    }

    fn rule(kind: DiscountKind) -> DiscountRule {
        let now = Utc::now();
        DiscountRule {
            id: Uuid::new_v4(),
            name: "Promo".to_string(),
            kind,
            auto_apply: true,
            priority: 1,
            stackable: false,
            applies_to_price_ids: vec![],
            eligibility: Eligibility::default(),
            max_redemptions_global: None,
            max_redemptions_per_customer: 3,
            starts_at: None,
            ends_at: None,
            active: true,
            stripe_coupon_id: Some("co_1".to_string()),
            stripe_promotion_code_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn metadata(rule: &DiscountRule, customer: &str) -> HashMap<String, String> {
        HashMap::from([
            (META_APPLIED_DISCOUNT_ID.to_string(), rule.id.to_string()),
            (META_APPLIED_ITEM_KEY.to_string(), rule.item_key().to_string()),
            (META_CUSTOMER_ID.to_string(), customer.to_string()),
        ])
    }

    fn checkout_event(session_id: &str, metadata: &HashMap<String, String>) -> WebhookEvent {
        serde_json::from_value(json!({
            "id": format!("evt_{}", session_id),
            "type": CHECKOUT_SESSION_COMPLETED,
            "created": 1_700_000_000,
            "data": { "object": {
                "id": session_id,
                "metadata": metadata,
                "subscription": "sub_1",
                "currency": "usd",
                "amount_subtotal": 10000,
                "amount_total": 0,
                "total_details": { "amount_discount": 0 }
            }}
        }))
        .unwrap()
    }

    fn invoice_event(invoice_id: &str, subscription: &str, start: i64) -> WebhookEvent {
        serde_json::from_value(json!({
            "id": format!("evt_{}", invoice_id),
            "type": INVOICE_PAYMENT_SUCCEEDED,
            "created": start,
            "data": { "object": {
                "id": invoice_id,
                "subscription": subscription,
                "currency": "usd",
                "subtotal": 10000,
                "total": 8000,
                "total_discount_amounts": [{ "amount": 2000 }],
                "period_start": start,
                "period_end": start + 2_592_000,
                "lines": { "data": [{ "period": { "start": start, "end": start + 2_592_000 } }] }
            }}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_trial_checkout_recorded_once() {
        let h = harness();
        let trial = rule(DiscountKind::TrialDays { trial_days: 14 });
        h.discounts.seed(trial.clone());
        let event = checkout_event("cs_1", &metadata(&trial, "42"));

        assert_eq!(h.ledger.handle_event(&event).await.unwrap(), WebhookOutcome::Processed);
        assert_eq!(
            h.ledger.handle_event(&event).await.unwrap(),
            WebhookOutcome::AlreadyProcessed
        );

        let rows = h.redemptions.all();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.applied_to, AppliedTo::Checkout);
        assert_eq!(row.stripe.session_id.as_deref(), Some("cs_1"));
        assert_eq!(row.stripe.subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(row.rule_snapshot.magnitude.trial_days, Some(14));
        assert_eq!(row.amounts.subtotal, Some(10_000));
        assert_eq!(row.period.month_index, None);
    }

    #[tokio::test]
    async fn test_non_trial_checkout_ignored() {
        let h = harness();
        let percent = rule(DiscountKind::PercentOffOnce { percent_off: dec!(10) });
        h.discounts.seed(percent.clone());

        let event = checkout_event("cs_2", &metadata(&percent, "42"));
        assert_eq!(h.ledger.handle_event(&event).await.unwrap(), WebhookOutcome::Ignored);
        assert!(h.redemptions.all().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_without_metadata_ignored() {
        let h = harness();
        let event = checkout_event("cs_3", &HashMap::new());
        assert_eq!(h.ledger.handle_event(&event).await.unwrap(), WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_invoice_month_index_increments() {
        let h = harness();
        let monthly = rule(DiscountKind::PercentOffFirstNMonths {
            percent_off: dec!(20),
            first_n_months: 3,
        });
        h.discounts.seed(monthly.clone());
        h.provider
            .set_subscription_metadata("sub_1", metadata(&monthly, "42"));

        let start = 1_700_000_000;
        for (i, invoice_id) in ["in_1", "in_2", "in_3"].iter().enumerate() {
            let event = invoice_event(invoice_id, "sub_1", start + i as i64 * 2_592_000);
            assert_eq!(h.ledger.handle_event(&event).await.unwrap(), WebhookOutcome::Processed);
        }

        let mut indexes: Vec<_> = h
            .redemptions
            .all()
            .iter()
            .map(|r| r.period.month_index.unwrap())
            .collect();
        indexes.sort();
        assert_eq!(indexes, vec![1, 2, 3]);

        let first = &h.redemptions.all()[0];
        assert_eq!(first.applied_to, AppliedTo::Invoice);
        assert_eq!(first.amounts.discount, Some(2_000));
        assert_eq!(first.amounts.total, Some(8_000));
        assert_eq!(first.stripe.coupon_id.as_deref(), Some("co_1"));
        assert_eq!(first.period.start.unwrap().timestamp(), start);
    }

    #[tokio::test]
    async fn test_invoice_replay_is_noop() {
        let h = harness();
        let once = rule(DiscountKind::PercentOffOnce { percent_off: dec!(20) });
        h.discounts.seed(once.clone());
        h.provider.set_subscription_metadata("sub_1", metadata(&once, "42"));

        let event = invoice_event("in_1", "sub_1", 1_700_000_000);
        assert_eq!(h.ledger.handle_event(&event).await.unwrap(), WebhookOutcome::Processed);
        assert_eq!(
            h.ledger.handle_event(&event).await.unwrap(),
            WebhookOutcome::AlreadyProcessed
        );
        assert_eq!(h.redemptions.all().len(), 1);
    }

    #[tokio::test]
    async fn test_invoice_for_deleted_rule_keeps_null_snapshot() {
        let h = harness();
        let gone = rule(DiscountKind::PercentOffOnce { percent_off: dec!(20) });
        h.provider.set_subscription_metadata("sub_1", metadata(&gone, "42"));

        let event = invoice_event("in_1", "sub_1", 1_700_000_000);
        assert_eq!(h.ledger.handle_event(&event).await.unwrap(), WebhookOutcome::Processed);

        let row = &h.redemptions.all()[0];
        assert_eq!(row.rule_snapshot, RuleSnapshot::missing());
        assert_eq!(row.stripe.coupon_id, None);
    }

    #[tokio::test]
    async fn test_invoice_without_subscription_ignored() {
        let h = harness();
        let event: WebhookEvent = serde_json::from_value(json!({
            "id": "evt_x",
            "type": INVOICE_PAYMENT_SUCCEEDED,
            "data": { "object": { "id": "in_x", "subscription": null } }
        }))
        .unwrap();

        assert_eq!(h.ledger.handle_event(&event).await.unwrap(), WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_trial_and_undiscounted_invoices_ignored() {
        let h = harness();
        let trial = rule(DiscountKind::TrialDays { trial_days: 14 });
        h.provider.set_subscription_metadata("sub_trial", metadata(&trial, "42"));
        let event = invoice_event("in_trial", "sub_trial", 1_700_000_000);
        assert_eq!(h.ledger.handle_event(&event).await.unwrap(), WebhookOutcome::Ignored);

        let once = rule(DiscountKind::PercentOffOnce { percent_off: dec!(20) });
        h.provider.set_subscription_metadata("sub_once", metadata(&once, "42"));
        let event: WebhookEvent = serde_json::from_value(json!({
            "id": "evt_renewal",
            "type": INVOICE_PAYMENT_SUCCEEDED,
            "data": { "object": {
                "id": "in_renewal",
                "subscription": "sub_once",
                "subtotal": 10000,
                "total": 10000,
                "total_discount_amounts": []
            }}
        }))
        .unwrap();
        assert_eq!(h.ledger.handle_event(&event).await.unwrap(), WebhookOutcome::Ignored);
        assert!(h.redemptions.all().is_empty());
    }

    #[tokio::test]
    async fn test_month_index_conflict_is_retryable() {
        let h = harness();
        let monthly = rule(DiscountKind::PercentOffFirstNMonths {
            percent_off: dec!(20),
            first_n_months: 3,
        });
        h.discounts.seed(monthly.clone());
        h.provider.set_subscription_metadata("sub_1", metadata(&monthly, "42"));

        // Another invoice already holds month 2 while month 1 is missing
        h.redemptions
            .insert(NewRedemption {
                discount_id: monthly.id,
                customer_id: "42".to_string(),
                applied_to: AppliedTo::Invoice,
                stripe: StripeRefs {
                    invoice_id: Some("in_other".to_string()),
                    ..Default::default()
                },
                amounts: ProviderAmounts::default(),
                rule_snapshot: RuleSnapshot::of(&monthly),
                period: BillingPeriod {
                    month_index: Some(2),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        let err = h
            .ledger
            .handle_event(&invoice_event("in_1", "sub_1", 1_700_000_000))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WebhookError::Processing(DiscountError::LedgerConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_subscription_propagates_provider_error() {
        let h = harness();
        let err = h
            .ledger
            .handle_event(&invoice_event("in_1", "sub_missing", 1_700_000_000))
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Processing(DiscountError::Provider(_))));
    }

    #[tokio::test]
    async fn test_unrelated_event_ignored() {
        let h = harness();
        let event: WebhookEvent = serde_json::from_value(json!({
            "id": "evt_y",
            "type": "customer.created",
            "data": { "object": { "id": "cus_1" } }
        }))
        .unwrap();
        assert_eq!(h.ledger.handle_event(&event).await.unwrap(), WebhookOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_malformed_object_rejected() {
        let h = harness();
        let event: WebhookEvent = serde_json::from_value(json!({
            "id": "evt_z",
            "type": CHECKOUT_SESSION_COMPLETED,
            "data": { "object": { "no_id": true } }
        }))
        .unwrap();
        assert!(matches!(
            h.ledger.handle_event(&event).await,
            Err(WebhookError::InvalidPayload(_))
        ));
    }
}
