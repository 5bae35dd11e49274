// Checkout Preview & Session Builder
//
// Preview and session creation run the exact same selection so the quote a
// customer sees is the discount the provider charges.

use std::sync::Arc;
use validator::Validate;

use crate::checkout::models::{
    AppliedDiscountView, CheckoutQuote, CheckoutSessionResponse, PreviewCheckoutRequest,
    SessionParams,
};
use crate::discounts::savings::subtotal_cents;
use crate::discounts::{DiscountError, DiscountKind, DiscountResult, PurchaseContext, SelectionEngine};
use crate::stripe::{CreateCheckoutSessionRequest, DiscountMetadata, PaymentProvider, SessionDiscount};

#[derive(Clone)]
pub struct CheckoutService {
    engine: SelectionEngine,
    provider: Arc<dyn PaymentProvider>,
}

impl CheckoutService {
    pub fn new(engine: SelectionEngine, provider: Arc<dyn PaymentProvider>) -> Self {
        Self { engine, provider }
    }

    pub async fn preview_subscription_checkout(
        &self,
        request: PreviewCheckoutRequest,
    ) -> DiscountResult<CheckoutQuote> {
        request.validate()?;
        let subtotal = subtotal_cents(request.unit_amount_cents, request.quantity)?;

        let ctx = PurchaseContext {
            customer_id: &request.customer_id,
            price_id: &request.price_id,
            quantity: request.quantity,
            unit_amount_cents: request.unit_amount_cents,
        };
        let selection = self.engine.select_auto_discount(ctx).await?;

        let discount = selection.as_ref().map_or(0, |s| s.savings_cents);

        Ok(CheckoutQuote {
            subtotal,
            discount,
            total: (subtotal - discount).max(0),
            currency: request.currency,
            trial_days: selection.as_ref().and_then(|s| s.rule.kind.trial_days()),
            discount_rule: selection.as_ref().map(|s| AppliedDiscountView::from(&s.rule)),
        })
    }

    pub async fn create_subscription_checkout_session(
        &self,
        params: SessionParams,
    ) -> DiscountResult<CheckoutSessionResponse> {
        subtotal_cents(params.unit_amount_cents, params.quantity)?;

        let ctx = PurchaseContext {
            customer_id: &params.customer_id,
            price_id: &params.price_id,
            quantity: params.quantity,
            unit_amount_cents: params.unit_amount_cents,
        };
        let selection = self.engine.select_auto_discount(ctx).await?;

        let mut metadata = DiscountMetadata::new(params.customer_id.clone());
        let discount = match &selection {
            Some(selected) => {
                let rule = &selected.rule;
                metadata = metadata.with_discount(rule.id, rule.item_key());
                Some(match &rule.kind {
                    DiscountKind::TrialDays { trial_days } => SessionDiscount::TrialPeriodDays(*trial_days),
                    _ => SessionDiscount::Coupon(rule.stripe_coupon_id.clone().ok_or_else(|| {
                        DiscountError::ValidationError(format!(
                            "discount {} has no provider coupon",
                            rule.id
                        ))
                    })?),
                })
            }
            None => None,
        };

        let session = self
            .provider
            .create_checkout_session(CreateCheckoutSessionRequest {
                price_id: params.price_id,
                quantity: params.quantity,
                success_url: params.success_url,
                cancel_url: params.cancel_url,
                customer_id: params.customer_id,
                discount,
                metadata,
            })
            .await?;

        tracing::info!(
            "Created checkout session {} (discount: {})",
            session.id,
            selection
                .as_ref()
                .map(|s| s.rule.id.to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        Ok(CheckoutSessionResponse {
            id: session.id,
            url: session.url,
        })
    }
}
