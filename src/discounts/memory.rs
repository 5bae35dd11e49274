// In-memory stores used by unit and handler tests

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use uuid::Uuid;

use crate::discounts::error::{DiscountError, DiscountResult};
use crate::discounts::models::{DiscountRule, NewDiscountRule, NewRedemption, Redemption};
use crate::discounts::repository::{DiscountStore, InsertOutcome, RedemptionStore};

#[derive(Default)]
pub struct InMemoryDiscountStore {
    rules: Mutex<Vec<DiscountRule>>,
}

impl InMemoryDiscountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully built rule, bypassing validation
    pub fn seed(&self, rule: DiscountRule) {
        self.rules.lock().unwrap().push(rule);
    }

    pub fn snapshot(&self, id: Uuid) -> Option<DiscountRule> {
        self.rules.lock().unwrap().iter().find(|r| r.id == id).cloned()
    }
}

fn sort_for_selection(rules: &mut [DiscountRule]) {
    rules.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

#[async_trait]
impl DiscountStore for InMemoryDiscountStore {
    async fn create(&self, rule: NewDiscountRule) -> DiscountResult<DiscountRule> {
        let now = Utc::now();
        let created = DiscountRule {
            id: Uuid::new_v4(),
            name: rule.name,
            kind: rule.kind,
            auto_apply: rule.auto_apply,
            priority: rule.priority,
            stackable: rule.stackable,
            applies_to_price_ids: rule.applies_to_price_ids,
            eligibility: rule.eligibility,
            max_redemptions_global: rule.max_redemptions_global,
            max_redemptions_per_customer: rule.max_redemptions_per_customer,
            starts_at: rule.starts_at,
            ends_at: rule.ends_at,
            active: rule.active,
            stripe_coupon_id: None,
            stripe_promotion_code_id: None,
            created_at: now,
            updated_at: now,
        };
        self.rules.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> DiscountResult<Option<DiscountRule>> {
        Ok(self.snapshot(id))
    }

    async fn list(&self) -> DiscountResult<Vec<DiscountRule>> {
        let mut rules = self.rules.lock().unwrap().clone();
        sort_for_selection(&mut rules);
        Ok(rules)
    }

    async fn update(&self, rule: &DiscountRule) -> DiscountResult<Option<DiscountRule>> {
        let mut rules = self.rules.lock().unwrap();
        let Some(existing) = rules.iter_mut().find(|r| r.id == rule.id) else {
            return Ok(None);
        };
        let coupon_id = existing.stripe_coupon_id.clone();
        let promotion_code_id = existing.stripe_promotion_code_id.clone();
        let created_at = existing.created_at;

        *existing = DiscountRule {
            stripe_coupon_id: coupon_id,
            stripe_promotion_code_id: promotion_code_id,
            created_at,
            updated_at: Utc::now(),
            ..rule.clone()
        };
        Ok(Some(existing.clone()))
    }

    async fn set_active(&self, id: Uuid, active: bool) -> DiscountResult<Option<DiscountRule>> {
        let mut rules = self.rules.lock().unwrap();
        Ok(rules.iter_mut().find(|r| r.id == id).map(|rule| {
            rule.active = active;
            rule.updated_at = Utc::now();
            rule.clone()
        }))
    }

    async fn list_auto_apply_candidates(&self, price_id: &str) -> DiscountResult<Vec<DiscountRule>> {
        let mut rules: Vec<DiscountRule> = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.auto_apply && r.applies_to_price(price_id))
            .cloned()
            .collect();
        sort_for_selection(&mut rules);
        Ok(rules)
    }

    async fn set_stripe_coupon_id_if_absent(
        &self,
        id: Uuid,
        coupon_id: &str,
    ) -> DiscountResult<Option<String>> {
        let mut rules = self.rules.lock().unwrap();
        Ok(rules.iter_mut().find(|r| r.id == id).and_then(|rule| {
            if rule.stripe_coupon_id.is_none() {
                rule.stripe_coupon_id = Some(coupon_id.to_string());
            }
            rule.stripe_coupon_id.clone()
        }))
    }
}

#[derive(Default)]
pub struct InMemoryRedemptionStore {
    redemptions: Mutex<Vec<Redemption>>,
}

impl InMemoryRedemptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Redemption> {
        self.redemptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl RedemptionStore for InMemoryRedemptionStore {
    async fn insert(&self, redemption: NewRedemption) -> DiscountResult<InsertOutcome> {
        let mut redemptions = self.redemptions.lock().unwrap();

        let same_key = |a: &Option<String>, b: &Option<String>| a.is_some() && a == b;
        if redemptions.iter().any(|r| {
            same_key(&r.stripe.session_id, &redemption.stripe.session_id)
                || same_key(&r.stripe.invoice_id, &redemption.stripe.invoice_id)
        }) {
            return Ok(InsertOutcome::Duplicate);
        }

        if redemption.period.month_index.is_some()
            && redemptions.iter().any(|r| {
                r.discount_id == redemption.discount_id
                    && r.customer_id == redemption.customer_id
                    && r.period.month_index == redemption.period.month_index
            })
        {
            return Err(DiscountError::LedgerConflict(
                "month index already recorded for this discount and customer".to_string(),
            ));
        }

        let stored = Redemption::from_new(Uuid::new_v4(), redemption, Utc::now());
        redemptions.push(stored.clone());
        Ok(InsertOutcome::Recorded(stored))
    }

    async fn invoice_recorded(&self, invoice_id: &str) -> DiscountResult<bool> {
        let redemptions = self.redemptions.lock().unwrap();
        Ok(redemptions
            .iter()
            .any(|r| r.stripe.invoice_id.as_deref() == Some(invoice_id)))
    }

    async fn count_for_customer(&self, discount_id: Uuid, customer_id: &str) -> DiscountResult<i64> {
        let redemptions = self.redemptions.lock().unwrap();
        Ok(redemptions
            .iter()
            .filter(|r| r.discount_id == discount_id && r.customer_id == customer_id)
            .count() as i64)
    }

    async fn count_for_rule(&self, discount_id: Uuid) -> DiscountResult<i64> {
        let redemptions = self.redemptions.lock().unwrap();
        Ok(redemptions
            .iter()
            .filter(|r| r.discount_id == discount_id)
            .count() as i64)
    }

    async fn count_any_for_customer(&self, customer_id: &str) -> DiscountResult<i64> {
        let redemptions = self.redemptions.lock().unwrap();
        Ok(redemptions
            .iter()
            .filter(|r| r.customer_id == customer_id)
            .count() as i64)
    }

    async fn list_for_rule(&self, discount_id: Uuid) -> DiscountResult<Vec<Redemption>> {
        let redemptions = self.redemptions.lock().unwrap();
        Ok(redemptions
            .iter()
            .filter(|r| r.discount_id == discount_id)
            .rev()
            .cloned()
            .collect())
    }
}
