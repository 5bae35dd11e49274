// Discount Rule Store and Redemption Ledger storage
//
// Both stores sit behind traits so the selection engine and the webhook
// ledger can run against PostgreSQL in production and an in-memory store in
// tests.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::discounts::error::{DiscountError, DiscountResult};
use crate::discounts::models::{
    DiscountRule, DiscountRuleRow, NewDiscountRule, NewRedemption, Redemption, RedemptionRow,
};

/// Unique index names on the redemptions table
pub const REDEMPTIONS_SESSION_UNIQUE: &str = "redemptions_stripe_session_id_key";
pub const REDEMPTIONS_INVOICE_UNIQUE: &str = "redemptions_stripe_invoice_id_key";
pub const REDEMPTIONS_MONTH_UNIQUE: &str = "redemptions_discount_customer_month_key";

const RULE_COLUMNS: &str = r#"
    id, name, item_key, percent_off, amount_off, currency, first_n_months, trial_days,
    auto_apply, priority, stackable, applies_to_price_ids,
    new_customer_only, company_allow_list, min_qty, max_qty,
    max_redemptions_global, max_redemptions_per_customer,
    starts_at, ends_at, active, stripe_coupon_id, stripe_promotion_code_id,
    created_at, updated_at
"#;

const REDEMPTION_COLUMNS: &str = r#"
    id, discount_id, customer_id, applied_to,
    stripe_session_id, stripe_invoice_id, stripe_subscription_id, stripe_coupon_id,
    currency, subtotal, discount, total,
    snapshot_item_key, snapshot_percent_off, snapshot_amount_off, snapshot_currency,
    snapshot_first_n_months, snapshot_trial_days,
    period_start, period_end, month_index, created_at
"#;

/// Result of writing a redemption
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Recorded(Redemption),
    /// Session or invoice id already present; nothing was written
    Duplicate,
}

#[async_trait]
pub trait DiscountStore: Send + Sync {
    async fn create(&self, rule: NewDiscountRule) -> DiscountResult<DiscountRule>;

    async fn get(&self, id: Uuid) -> DiscountResult<Option<DiscountRule>>;

    async fn list(&self) -> DiscountResult<Vec<DiscountRule>>;

    /// Persist every editable column of `rule`
    ///
    /// Provider ids and `created_at` are never touched.
    async fn update(&self, rule: &DiscountRule) -> DiscountResult<Option<DiscountRule>>;

    async fn set_active(&self, id: Uuid, active: bool) -> DiscountResult<Option<DiscountRule>>;

    /// Auto-apply rules that cover `price_id`, ordered by priority ASC then
    /// created_at DESC. Malformed rows are skipped.
    async fn list_auto_apply_candidates(&self, price_id: &str) -> DiscountResult<Vec<DiscountRule>>;

    /// Store `coupon_id` only if the rule has none yet
    ///
    /// Returns the coupon id stored on the rule after the write, which is the
    /// earlier one when a concurrent request won. `None` if the rule is gone.
    async fn set_stripe_coupon_id_if_absent(
        &self,
        id: Uuid,
        coupon_id: &str,
    ) -> DiscountResult<Option<String>>;
}

#[async_trait]
pub trait RedemptionStore: Send + Sync {
    /// Append a ledger entry
    ///
    /// A unique violation on the session or invoice id is reported as
    /// `Duplicate`; a violation on the month index is a `LedgerConflict`.
    async fn insert(&self, redemption: NewRedemption) -> DiscountResult<InsertOutcome>;

    async fn invoice_recorded(&self, invoice_id: &str) -> DiscountResult<bool>;

    async fn count_for_customer(&self, discount_id: Uuid, customer_id: &str) -> DiscountResult<i64>;

    async fn count_for_rule(&self, discount_id: Uuid) -> DiscountResult<i64>;

    /// Redemptions of any rule by this customer
    async fn count_any_for_customer(&self, customer_id: &str) -> DiscountResult<i64>;

    async fn list_for_rule(&self, discount_id: Uuid) -> DiscountResult<Vec<Redemption>>;
}

fn convert_rows(rows: Vec<DiscountRuleRow>) -> Vec<DiscountRule> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match DiscountRule::try_from(row) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    tracing::warn!("Skipping malformed discount rule {}: {}", id, e);
                    None
                }
            }
        })
        .collect()
}

/// PostgreSQL-backed rule store
#[derive(Clone)]
pub struct PgDiscountStore {
    pool: PgPool,
}

impl PgDiscountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DiscountStore for PgDiscountStore {
    async fn create(&self, rule: NewDiscountRule) -> DiscountResult<DiscountRule> {
        let fields = rule.kind.to_fields();
        let sql = format!(
            r#"
            INSERT INTO discount_rules (
                id, name, item_key, percent_off, amount_off, currency, first_n_months, trial_days,
                auto_apply, priority, stackable, applies_to_price_ids,
                new_customer_only, company_allow_list, min_qty, max_qty,
                max_redemptions_global, max_redemptions_per_customer,
                starts_at, ends_at, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            RETURNING {RULE_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, DiscountRuleRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&rule.name)
            .bind(rule.kind.item_key().as_str())
            .bind(fields.percent_off)
            .bind(fields.amount_off)
            .bind(fields.currency)
            .bind(fields.first_n_months)
            .bind(fields.trial_days)
            .bind(rule.auto_apply)
            .bind(rule.priority)
            .bind(rule.stackable)
            .bind(&rule.applies_to_price_ids)
            .bind(rule.eligibility.new_customer_only)
            .bind(&rule.eligibility.company_allow_list)
            .bind(rule.eligibility.min_qty)
            .bind(rule.eligibility.max_qty)
            .bind(rule.max_redemptions_global)
            .bind(rule.max_redemptions_per_customer)
            .bind(rule.starts_at)
            .bind(rule.ends_at)
            .bind(rule.active)
            .fetch_one(&self.pool)
            .await?;

        DiscountRule::try_from(row)
    }

    async fn get(&self, id: Uuid) -> DiscountResult<Option<DiscountRule>> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM discount_rules WHERE id = $1");
        let row = sqlx::query_as::<_, DiscountRuleRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(DiscountRule::try_from).transpose()
    }

    async fn list(&self) -> DiscountResult<Vec<DiscountRule>> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM discount_rules ORDER BY priority ASC, created_at DESC"
        );
        let rows = sqlx::query_as::<_, DiscountRuleRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(convert_rows(rows))
    }

    async fn update(&self, rule: &DiscountRule) -> DiscountResult<Option<DiscountRule>> {
        let fields = rule.kind.to_fields();
        let sql = format!(
            r#"
            UPDATE discount_rules SET
                name = $2, item_key = $3, percent_off = $4, amount_off = $5, currency = $6,
                first_n_months = $7, trial_days = $8, auto_apply = $9, priority = $10,
                stackable = $11, applies_to_price_ids = $12, new_customer_only = $13,
                company_allow_list = $14, min_qty = $15, max_qty = $16,
                max_redemptions_global = $17, max_redemptions_per_customer = $18,
                starts_at = $19, ends_at = $20, active = $21, updated_at = NOW()
            WHERE id = $1
            RETURNING {RULE_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, DiscountRuleRow>(&sql)
            .bind(rule.id)
            .bind(&rule.name)
            .bind(rule.kind.item_key().as_str())
            .bind(fields.percent_off)
            .bind(fields.amount_off)
            .bind(fields.currency)
            .bind(fields.first_n_months)
            .bind(fields.trial_days)
            .bind(rule.auto_apply)
            .bind(rule.priority)
            .bind(rule.stackable)
            .bind(&rule.applies_to_price_ids)
            .bind(rule.eligibility.new_customer_only)
            .bind(&rule.eligibility.company_allow_list)
            .bind(rule.eligibility.min_qty)
            .bind(rule.eligibility.max_qty)
            .bind(rule.max_redemptions_global)
            .bind(rule.max_redemptions_per_customer)
            .bind(rule.starts_at)
            .bind(rule.ends_at)
            .bind(rule.active)
            .fetch_optional(&self.pool)
            .await?;

        row.map(DiscountRule::try_from).transpose()
    }

    async fn set_active(&self, id: Uuid, active: bool) -> DiscountResult<Option<DiscountRule>> {
        let sql = format!(
            "UPDATE discount_rules SET active = $2, updated_at = NOW() WHERE id = $1 RETURNING {RULE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DiscountRuleRow>(&sql)
            .bind(id)
            .bind(active)
            .fetch_optional(&self.pool)
            .await?;

        row.map(DiscountRule::try_from).transpose()
    }

    async fn list_auto_apply_candidates(&self, price_id: &str) -> DiscountResult<Vec<DiscountRule>> {
        let sql = format!(
            r#"
            SELECT {RULE_COLUMNS}
            FROM discount_rules
            WHERE auto_apply = true
              AND (cardinality(applies_to_price_ids) = 0 OR $1 = ANY(applies_to_price_ids))
            ORDER BY priority ASC, created_at DESC
            "#
        );
        let rows = sqlx::query_as::<_, DiscountRuleRow>(&sql)
            .bind(price_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(convert_rows(rows))
    }

    async fn set_stripe_coupon_id_if_absent(
        &self,
        id: Uuid,
        coupon_id: &str,
    ) -> DiscountResult<Option<String>> {
        let updated: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE discount_rules
            SET stripe_coupon_id = $2, updated_at = NOW()
            WHERE id = $1 AND stripe_coupon_id IS NULL
            RETURNING stripe_coupon_id
            "#,
        )
        .bind(id)
        .bind(coupon_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((stored,)) = updated {
            return Ok(stored);
        }

        // Lost the race or the rule is gone; report whatever is stored now
        let existing: Option<(Option<String>,)> =
            sqlx::query_as("SELECT stripe_coupon_id FROM discount_rules WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(existing.and_then(|(stored,)| stored))
    }
}

/// PostgreSQL-backed redemption ledger
#[derive(Clone)]
pub struct PgRedemptionStore {
    pool: PgPool,
}

impl PgRedemptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Map a unique violation on the redemptions table to a ledger outcome
fn classify_unique_violation(constraint: Option<&str>) -> Option<DiscountResult<InsertOutcome>> {
    match constraint {
        Some(REDEMPTIONS_SESSION_UNIQUE) | Some(REDEMPTIONS_INVOICE_UNIQUE) => {
            Some(Ok(InsertOutcome::Duplicate))
        }
        Some(REDEMPTIONS_MONTH_UNIQUE) => Some(Err(DiscountError::LedgerConflict(
            "month index already recorded for this discount and customer".to_string(),
        ))),
        _ => None,
    }
}

#[async_trait]
impl RedemptionStore for PgRedemptionStore {
    async fn insert(&self, redemption: NewRedemption) -> DiscountResult<InsertOutcome> {
        let sql = format!(
            r#"
            INSERT INTO redemptions (
                id, discount_id, customer_id, applied_to,
                stripe_session_id, stripe_invoice_id, stripe_subscription_id, stripe_coupon_id,
                currency, subtotal, discount, total,
                snapshot_item_key, snapshot_percent_off, snapshot_amount_off, snapshot_currency,
                snapshot_first_n_months, snapshot_trial_days,
                period_start, period_end, month_index
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            RETURNING {REDEMPTION_COLUMNS}
            "#
        );

        let snapshot = &redemption.rule_snapshot;
        let result = sqlx::query_as::<_, RedemptionRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(redemption.discount_id)
            .bind(&redemption.customer_id)
            .bind(redemption.applied_to)
            .bind(&redemption.stripe.session_id)
            .bind(&redemption.stripe.invoice_id)
            .bind(&redemption.stripe.subscription_id)
            .bind(&redemption.stripe.coupon_id)
            .bind(&redemption.amounts.currency)
            .bind(redemption.amounts.subtotal)
            .bind(redemption.amounts.discount)
            .bind(redemption.amounts.total)
            .bind(snapshot.item_key.map(|key| key.as_str()))
            .bind(snapshot.magnitude.percent_off)
            .bind(snapshot.magnitude.amount_off)
            .bind(&snapshot.magnitude.currency)
            .bind(snapshot.magnitude.first_n_months)
            .bind(snapshot.magnitude.trial_days)
            .bind(redemption.period.start)
            .bind(redemption.period.end)
            .bind(redemption.period.month_index)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(row) => Ok(InsertOutcome::Recorded(row.into())),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                match classify_unique_violation(db_err.constraint()) {
                    Some(outcome) => outcome,
                    None => Err(DiscountError::DatabaseError(sqlx::Error::Database(db_err))),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn invoice_recorded(&self, invoice_id: &str) -> DiscountResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM redemptions WHERE stripe_invoice_id = $1)",
        )
        .bind(invoice_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn count_for_customer(&self, discount_id: Uuid, customer_id: &str) -> DiscountResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM redemptions WHERE discount_id = $1 AND customer_id = $2",
        )
        .bind(discount_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_for_rule(&self, discount_id: Uuid) -> DiscountResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM redemptions WHERE discount_id = $1")
                .bind(discount_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn count_any_for_customer(&self, customer_id: &str) -> DiscountResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM redemptions WHERE customer_id = $1")
                .bind(customer_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn list_for_rule(&self, discount_id: Uuid) -> DiscountResult<Vec<Redemption>> {
        let sql = format!(
            "SELECT {REDEMPTION_COLUMNS} FROM redemptions WHERE discount_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, RedemptionRow>(&sql)
            .bind(discount_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Redemption::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_keys_classified_as_duplicate() {
        assert!(matches!(
            classify_unique_violation(Some(REDEMPTIONS_SESSION_UNIQUE)),
            Some(Ok(InsertOutcome::Duplicate))
        ));
        assert!(matches!(
            classify_unique_violation(Some(REDEMPTIONS_INVOICE_UNIQUE)),
            Some(Ok(InsertOutcome::Duplicate))
        ));
    }

    #[test]
    fn test_month_index_violation_is_conflict() {
        assert!(matches!(
            classify_unique_violation(Some(REDEMPTIONS_MONTH_UNIQUE)),
            Some(Err(DiscountError::LedgerConflict(_)))
        ));
    }

    #[test]
    fn test_unknown_constraint_not_classified() {
        assert!(classify_unique_violation(Some("something_else")).is_none());
        assert!(classify_unique_violation(None).is_none());
    }
}
