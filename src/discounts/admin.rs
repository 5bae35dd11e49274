// Operator-facing rule management
//
// Every write goes through `DiscountKind::from_fields`, so a stored rule
// always carries exactly the magnitude its item key requires.

use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::discounts::error::{DiscountError, DiscountResult};
use crate::discounts::models::{
    CreateDiscountRequest, DiscountRule, Eligibility, NewDiscountRule, Redemption,
    UpdateDiscountRequest,
};
use crate::discounts::repository::{DiscountStore, RedemptionStore};
use crate::discounts::types::{DiscountKind, ItemKey, MagnitudeFields};

#[derive(Clone)]
pub struct DiscountAdmin {
    discounts: Arc<dyn DiscountStore>,
    redemptions: Arc<dyn RedemptionStore>,
    enabled_item_keys: Arc<HashSet<ItemKey>>,
}

impl DiscountAdmin {
    pub fn new(
        discounts: Arc<dyn DiscountStore>,
        redemptions: Arc<dyn RedemptionStore>,
        enabled_item_keys: HashSet<ItemKey>,
    ) -> Self {
        Self {
            discounts,
            redemptions,
            enabled_item_keys: Arc::new(enabled_item_keys),
        }
    }

    fn ensure_enabled(&self, item_key: ItemKey) -> DiscountResult<()> {
        if self.enabled_item_keys.contains(&item_key) {
            Ok(())
        } else {
            Err(DiscountError::ItemKeyDisabled(item_key.to_string()))
        }
    }

    pub async fn create_rule(&self, request: CreateDiscountRequest) -> DiscountResult<DiscountRule> {
        request.validate()?;
        self.ensure_enabled(request.item_key)?;

        let kind = DiscountKind::from_fields(request.item_key, &request.magnitude_fields())?;
        let eligibility = Eligibility {
            new_customer_only: request.new_customer_only,
            company_allow_list: request.company_allow_list,
            min_qty: request.min_qty,
            max_qty: request.max_qty,
        };
        validate_bounds(&eligibility, request.starts_at, request.ends_at)?;

        let rule = self
            .discounts
            .create(NewDiscountRule {
                name: request.name,
                kind,
                auto_apply: request.auto_apply,
                priority: request.priority,
                stackable: request.stackable,
                applies_to_price_ids: request.applies_to_price_ids,
                eligibility,
                max_redemptions_global: request.max_redemptions_global,
                max_redemptions_per_customer: request.max_redemptions_per_customer,
                starts_at: request.starts_at,
                ends_at: request.ends_at,
                active: request.active,
            })
            .await?;

        tracing::info!("Created discount rule {} ({})", rule.id, rule.item_key());
        Ok(rule)
    }

    pub async fn get_rule(&self, id: Uuid) -> DiscountResult<DiscountRule> {
        self.discounts
            .get(id)
            .await?
            .ok_or(DiscountError::RuleNotFound(id))
    }

    pub async fn list_rules(&self) -> DiscountResult<Vec<DiscountRule>> {
        self.discounts.list().await
    }

    /// Apply a partial update
    ///
    /// The magnitude can only be replaced as a whole, and not at all once a
    /// provider coupon has been created for the rule.
    pub async fn update_rule(
        &self,
        id: Uuid,
        request: UpdateDiscountRequest,
    ) -> DiscountResult<DiscountRule> {
        request.validate()?;
        let mut rule = self.get_rule(id).await?;

        let magnitude = request.magnitude_fields();
        match request.item_key {
            Some(item_key) => {
                let kind = DiscountKind::from_fields(item_key, &magnitude)?;
                if kind != rule.kind {
                    if rule.stripe_coupon_id.is_some() {
                        return Err(DiscountError::ValidationError(
                            "magnitude cannot change once a provider coupon exists; create a new rule"
                                .to_string(),
                        ));
                    }
                    if item_key != rule.item_key() {
                        self.ensure_enabled(item_key)?;
                    }
                    rule.kind = kind;
                }
            }
            None if magnitude != MagnitudeFields::default() => {
                return Err(DiscountError::ValidationError(
                    "magnitude fields require item_key".to_string(),
                ));
            }
            None => {}
        }

        if let Some(name) = request.name {
            rule.name = name;
        }
        if let Some(auto_apply) = request.auto_apply {
            rule.auto_apply = auto_apply;
        }
        if let Some(priority) = request.priority {
            rule.priority = priority;
        }
        if let Some(stackable) = request.stackable {
            rule.stackable = stackable;
        }
        if let Some(price_ids) = request.applies_to_price_ids {
            rule.applies_to_price_ids = price_ids;
        }
        if let Some(new_customer_only) = request.new_customer_only {
            rule.eligibility.new_customer_only = new_customer_only;
        }
        if let Some(allow_list) = request.company_allow_list {
            rule.eligibility.company_allow_list = allow_list;
        }
        if let Some(min_qty) = request.min_qty {
            rule.eligibility.min_qty = min_qty;
        }
        if let Some(max_qty) = request.max_qty {
            rule.eligibility.max_qty = max_qty;
        }
        if let Some(max_redemptions_global) = request.max_redemptions_global {
            rule.max_redemptions_global = max_redemptions_global;
        }
        if let Some(per_customer) = request.max_redemptions_per_customer {
            rule.max_redemptions_per_customer = per_customer;
        }
        if let Some(starts_at) = request.starts_at {
            rule.starts_at = starts_at;
        }
        if let Some(ends_at) = request.ends_at {
            rule.ends_at = ends_at;
        }
        if let Some(active) = request.active {
            rule.active = active;
        }

        validate_bounds(&rule.eligibility, rule.starts_at, rule.ends_at)?;

        let updated = self
            .discounts
            .update(&rule)
            .await?
            .ok_or(DiscountError::RuleNotFound(id))?;

        tracing::info!("Updated discount rule {}", id);
        Ok(updated)
    }

    pub async fn toggle_rule(&self, id: Uuid) -> DiscountResult<DiscountRule> {
        let rule = self.get_rule(id).await?;
        let updated = self
            .discounts
            .set_active(id, !rule.active)
            .await?
            .ok_or(DiscountError::RuleNotFound(id))?;

        tracing::info!("Discount rule {} active={}", id, updated.active);
        Ok(updated)
    }

    pub async fn list_redemptions(&self, id: Uuid) -> DiscountResult<Vec<Redemption>> {
        self.get_rule(id).await?;
        self.redemptions.list_for_rule(id).await
    }
}

fn validate_bounds(
    eligibility: &Eligibility,
    starts_at: Option<chrono::DateTime<chrono::Utc>>,
    ends_at: Option<chrono::DateTime<chrono::Utc>>,
) -> DiscountResult<()> {
    if let Some(max_qty) = eligibility.max_qty {
        if max_qty < eligibility.min_qty {
            return Err(DiscountError::ValidationError(
                "max_qty must be greater than or equal to min_qty".to_string(),
            ));
        }
    }
    if let (Some(starts_at), Some(ends_at)) = (starts_at, ends_at) {
        if ends_at <= starts_at {
            return Err(DiscountError::ValidationError(
                "ends_at must be after starts_at".to_string(),
            ));
        }
    }
    Ok(())
}
