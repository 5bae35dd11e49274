// Discount rule and redemption models
// Database rows, domain structs and admin DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::discounts::error::{DiscountError, DiscountResult};
use crate::discounts::types::{AppliedTo, DiscountKind, ItemKey, MagnitudeFields};

/// Eligibility constraints attached to a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Eligibility {
    pub new_customer_only: bool,
    /// Customer ids allowed to use the rule; empty means everyone
    pub company_allow_list: Vec<String>,
    pub min_qty: i32,
    /// `None` means unbounded
    pub max_qty: Option<i32>,
}

impl Default for Eligibility {
    fn default() -> Self {
        Self {
            new_customer_only: false,
            company_allow_list: Vec::new(),
            min_qty: 1,
            max_qty: None,
        }
    }
}

impl Eligibility {
    pub fn allows_quantity(&self, quantity: i64) -> bool {
        if quantity < i64::from(self.min_qty) {
            return false;
        }
        match self.max_qty {
            Some(max) => quantity <= i64::from(max),
            None => true,
        }
    }

    pub fn allows_customer(&self, customer_id: &str) -> bool {
        self.company_allow_list.is_empty()
            || self.company_allow_list.iter().any(|id| id == customer_id)
    }
}

/// A promotional rule
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountRule {
    pub id: Uuid,
    pub name: String,
    pub kind: DiscountKind,
    pub auto_apply: bool,
    pub priority: i32,
    pub stackable: bool,
    pub applies_to_price_ids: Vec<String>,
    pub eligibility: Eligibility,
    pub max_redemptions_global: Option<i64>,
    pub max_redemptions_per_customer: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub stripe_coupon_id: Option<String>,
    pub stripe_promotion_code_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiscountRule {
    pub fn item_key(&self) -> ItemKey {
        self.kind.item_key()
    }

    /// Active and inside its `[starts_at, ends_at]` window
    pub fn is_in_force(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        if let Some(starts_at) = self.starts_at {
            if now < starts_at {
                return false;
            }
        }
        if let Some(ends_at) = self.ends_at {
            if now > ends_at {
                return false;
            }
        }
        true
    }

    pub fn applies_to_price(&self, price_id: &str) -> bool {
        self.applies_to_price_ids.is_empty()
            || self.applies_to_price_ids.iter().any(|id| id == price_id)
    }
}

/// Raw `discount_rules` row
#[derive(Debug, Clone, FromRow)]
pub struct DiscountRuleRow {
    pub id: Uuid,
    pub name: String,
    pub item_key: String,
    pub percent_off: Option<rust_decimal::Decimal>,
    pub amount_off: Option<i64>,
    pub currency: Option<String>,
    pub first_n_months: Option<i32>,
    pub trial_days: Option<i32>,
    pub auto_apply: bool,
    pub priority: i32,
    pub stackable: bool,
    pub applies_to_price_ids: Vec<String>,
    pub new_customer_only: bool,
    pub company_allow_list: Vec<String>,
    pub min_qty: i32,
    pub max_qty: Option<i32>,
    pub max_redemptions_global: Option<i64>,
    pub max_redemptions_per_customer: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub stripe_coupon_id: Option<String>,
    pub stripe_promotion_code_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DiscountRuleRow> for DiscountRule {
    type Error = DiscountError;

    fn try_from(row: DiscountRuleRow) -> DiscountResult<Self> {
        let item_key = ItemKey::from_str(&row.item_key).map_err(DiscountError::InvalidMagnitude)?;
        let kind = DiscountKind::from_fields(
            item_key,
            &MagnitudeFields {
                percent_off: row.percent_off,
                amount_off: row.amount_off,
                currency: row.currency,
                first_n_months: row.first_n_months,
                trial_days: row.trial_days,
            },
        )?;

        Ok(DiscountRule {
            id: row.id,
            name: row.name,
            kind,
            auto_apply: row.auto_apply,
            priority: row.priority,
            stackable: row.stackable,
            applies_to_price_ids: row.applies_to_price_ids,
            eligibility: Eligibility {
                new_customer_only: row.new_customer_only,
                company_allow_list: row.company_allow_list,
                min_qty: row.min_qty,
                max_qty: row.max_qty,
            },
            max_redemptions_global: row.max_redemptions_global,
            max_redemptions_per_customer: row.max_redemptions_per_customer,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            active: row.active,
            stripe_coupon_id: row.stripe_coupon_id,
            stripe_promotion_code_id: row.stripe_promotion_code_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Validated data for inserting a rule
#[derive(Debug, Clone)]
pub struct NewDiscountRule {
    pub name: String,
    pub kind: DiscountKind,
    pub auto_apply: bool,
    pub priority: i32,
    pub stackable: bool,
    pub applies_to_price_ids: Vec<String>,
    pub eligibility: Eligibility,
    pub max_redemptions_global: Option<i64>,
    pub max_redemptions_per_customer: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub active: bool,
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    100
}

fn default_one() -> i32 {
    1
}

fn default_per_customer() -> i64 {
    1
}

/// Request DTO for POST /api/admin/discounts
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateDiscountRequest {
    #[validate(length(min = 1, max = 200))]
    #[schema(example = "Launch 10% off")]
    pub name: String,
    pub item_key: ItemKey,
    #[schema(value_type = Option<String>, example = "10")]
    pub percent_off: Option<rust_decimal::Decimal>,
    pub amount_off: Option<i64>,
    pub currency: Option<String>,
    pub first_n_months: Option<i32>,
    pub trial_days: Option<i32>,
    #[serde(default = "default_true")]
    pub auto_apply: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub stackable: bool,
    #[serde(default)]
    pub applies_to_price_ids: Vec<String>,
    #[serde(default)]
    pub new_customer_only: bool,
    #[serde(default)]
    pub company_allow_list: Vec<String>,
    #[serde(default = "default_one")]
    #[validate(range(min = 1))]
    pub min_qty: i32,
    #[validate(range(min = 1))]
    pub max_qty: Option<i32>,
    #[validate(range(min = 1))]
    pub max_redemptions_global: Option<i64>,
    #[serde(default = "default_per_customer")]
    #[validate(range(min = 1))]
    pub max_redemptions_per_customer: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl CreateDiscountRequest {
    pub fn magnitude_fields(&self) -> MagnitudeFields {
        MagnitudeFields {
            percent_off: self.percent_off,
            amount_off: self.amount_off,
            currency: self.currency.clone(),
            first_n_months: self.first_n_months,
            trial_days: self.trial_days,
        }
    }
}

/// Request DTO for PUT /api/admin/discounts/:id
///
/// Omitted fields keep their current value. The nullable limits and the
/// validity window also take an explicit `null`, which clears them. Magnitude
/// fields are only accepted together with `item_key` and replace the
/// magnitude as a whole.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateDiscountRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub item_key: Option<ItemKey>,
    #[schema(value_type = Option<String>)]
    pub percent_off: Option<rust_decimal::Decimal>,
    pub amount_off: Option<i64>,
    pub currency: Option<String>,
    pub first_n_months: Option<i32>,
    pub trial_days: Option<i32>,
    pub auto_apply: Option<bool>,
    pub priority: Option<i32>,
    pub stackable: Option<bool>,
    pub applies_to_price_ids: Option<Vec<String>>,
    pub new_customer_only: Option<bool>,
    pub company_allow_list: Option<Vec<String>>,
    #[validate(range(min = 1))]
    pub min_qty: Option<i32>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<i32>)]
    #[validate(range(min = 1))]
    pub max_qty: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<i64>)]
    #[validate(range(min = 1))]
    pub max_redemptions_global: Option<Option<i64>>,
    #[validate(range(min = 1))]
    pub max_redemptions_per_customer: Option<i64>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub starts_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub ends_at: Option<Option<DateTime<Utc>>>,
    pub active: Option<bool>,
}

/// Outer `None` when the key is absent, `Some(None)` for an explicit null
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateDiscountRequest {
    pub fn magnitude_fields(&self) -> MagnitudeFields {
        MagnitudeFields {
            percent_off: self.percent_off,
            amount_off: self.amount_off,
            currency: self.currency.clone(),
            first_n_months: self.first_n_months,
            trial_days: self.trial_days,
        }
    }
}

/// Response DTO for a discount rule
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiscountRuleResponse {
    pub id: Uuid,
    pub name: String,
    pub item_key: ItemKey,
    #[serde(flatten)]
    pub magnitude: MagnitudeFields,
    pub auto_apply: bool,
    pub priority: i32,
    pub stackable: bool,
    pub applies_to_price_ids: Vec<String>,
    pub eligibility: Eligibility,
    pub max_redemptions_global: Option<i64>,
    pub max_redemptions_per_customer: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub stripe_coupon_id: Option<String>,
    pub stripe_promotion_code_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DiscountRule> for DiscountRuleResponse {
    fn from(rule: DiscountRule) -> Self {
        Self {
            id: rule.id,
            name: rule.name,
            item_key: rule.kind.item_key(),
            magnitude: rule.kind.to_fields(),
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
            stripe_coupon_id: rule.stripe_coupon_id,
            stripe_promotion_code_id: rule.stripe_promotion_code_id,
            created_at: rule.created_at,
            updated_at: rule.updated_at,
        }
    }
}

// ============================================================================
// Redemption ledger
// ============================================================================

/// Provider correlation ids; session and invoice ids are idempotency keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StripeRefs {
    pub session_id: Option<String>,
    pub invoice_id: Option<String>,
    pub subscription_id: Option<String>,
    pub coupon_id: Option<String>,
}

/// Amounts as reported by the payment provider
///
/// Never built from locally computed figures; the provider's charge is
/// authoritative for the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProviderAmounts {
    pub currency: Option<String>,
    pub subtotal: Option<i64>,
    pub discount: Option<i64>,
    pub total: Option<i64>,
}

impl ProviderAmounts {
    pub fn reported(
        currency: Option<String>,
        subtotal: Option<i64>,
        discount: Option<i64>,
        total: Option<i64>,
    ) -> Self {
        Self {
            currency,
            subtotal,
            discount,
            total,
        }
    }
}

/// Copy of a rule's magnitude at redemption time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RuleSnapshot {
    pub item_key: Option<ItemKey>,
    #[serde(flatten)]
    pub magnitude: MagnitudeFields,
}

impl RuleSnapshot {
    pub fn of(rule: &DiscountRule) -> Self {
        Self {
            item_key: Some(rule.item_key()),
            magnitude: rule.kind.to_fields(),
        }
    }

    /// Snapshot for a rule that no longer exists
    pub fn missing() -> Self {
        Self::default()
    }
}

/// Billing period a recurring redemption belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BillingPeriod {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// 1-based count of applications of this discount to this customer
    pub month_index: Option<i32>,
}

/// Redemption about to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewRedemption {
    pub discount_id: Uuid,
    pub customer_id: String,
    pub applied_to: AppliedTo,
    pub stripe: StripeRefs,
    pub amounts: ProviderAmounts,
    pub rule_snapshot: RuleSnapshot,
    pub period: BillingPeriod,
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Redemption {
    pub id: Uuid,
    pub discount_id: Uuid,
    pub customer_id: String,
    pub applied_to: AppliedTo,
    pub stripe: StripeRefs,
    pub amounts: ProviderAmounts,
    pub rule_snapshot: RuleSnapshot,
    pub period: BillingPeriod,
    pub created_at: DateTime<Utc>,
}

impl Redemption {
    pub fn from_new(id: Uuid, new: NewRedemption, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            discount_id: new.discount_id,
            customer_id: new.customer_id,
            applied_to: new.applied_to,
            stripe: new.stripe,
            amounts: new.amounts,
            rule_snapshot: new.rule_snapshot,
            period: new.period,
            created_at,
        }
    }
}

/// Raw `redemptions` row
#[derive(Debug, Clone, FromRow)]
pub struct RedemptionRow {
    pub id: Uuid,
    pub discount_id: Uuid,
    pub customer_id: String,
    pub applied_to: AppliedTo,
    pub stripe_session_id: Option<String>,
    pub stripe_invoice_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_coupon_id: Option<String>,
    pub currency: Option<String>,
    pub subtotal: Option<i64>,
    pub discount: Option<i64>,
    pub total: Option<i64>,
    pub snapshot_item_key: Option<String>,
    pub snapshot_percent_off: Option<rust_decimal::Decimal>,
    pub snapshot_amount_off: Option<i64>,
    pub snapshot_currency: Option<String>,
    pub snapshot_first_n_months: Option<i32>,
    pub snapshot_trial_days: Option<i32>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub month_index: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl From<RedemptionRow> for Redemption {
    fn from(row: RedemptionRow) -> Self {
        Self {
            id: row.id,
            discount_id: row.discount_id,
            customer_id: row.customer_id,
            applied_to: row.applied_to,
            stripe: StripeRefs {
                session_id: row.stripe_session_id,
                invoice_id: row.stripe_invoice_id,
                subscription_id: row.stripe_subscription_id,
                coupon_id: row.stripe_coupon_id,
            },
            amounts: ProviderAmounts::reported(row.currency, row.subtotal, row.discount, row.total),
            rule_snapshot: RuleSnapshot {
                item_key: row
                    .snapshot_item_key
                    .as_deref()
                    .and_then(|key| ItemKey::from_str(key).ok()),
                magnitude: MagnitudeFields {
                    percent_off: row.snapshot_percent_off,
                    amount_off: row.snapshot_amount_off,
                    currency: row.snapshot_currency,
                    first_n_months: row.snapshot_first_n_months,
                    trial_days: row.snapshot_trial_days,
                },
            },
            period: BillingPeriod {
                start: row.period_start,
                end: row.period_end,
                month_index: row.month_index,
            },
            created_at: row.created_at,
        }
    }
}
