// Savings calculation for a single purchase

use crate::discounts::error::{DiscountError, DiscountResult};
use crate::discounts::types::{percent_of_cents, DiscountKind};

/// Subtotal in cents for `quantity` units, `None` when it overflows
pub fn checked_subtotal_cents(unit_amount_cents: i64, quantity: i64) -> Option<i64> {
    unit_amount_cents.max(0).checked_mul(quantity.max(0))
}

/// Subtotal for a purchase request; an overflowing product is a client error
pub fn subtotal_cents(unit_amount_cents: i64, quantity: i64) -> DiscountResult<i64> {
    checked_subtotal_cents(unit_amount_cents, quantity).ok_or_else(|| {
        DiscountError::ValidationError(
            "unitAmountCents multiplied by quantity exceeds the supported amount range"
                .to_string(),
        )
    })
}

/// Cents a rule saves on one purchase
///
/// Percent kinds round down to whole cents; fixed amounts are clamped to the
/// subtotal; trials save nothing up front. Never negative. A subtotal that
/// does not fit in i64 saves nothing.
pub fn compute_savings_cents(kind: &DiscountKind, unit_amount_cents: i64, quantity: i64) -> i64 {
    let Some(subtotal) = checked_subtotal_cents(unit_amount_cents, quantity) else {
        return 0;
    };

    let savings = match kind {
        DiscountKind::PercentOffOnce { percent_off }
        | DiscountKind::PercentOffFirstNMonths { percent_off, .. } => {
            percent_of_cents(subtotal, *percent_off)
        }
        DiscountKind::AmountOffOnce { amount_off, .. } => (*amount_off).min(subtotal),
        DiscountKind::TrialDays { .. } => 0,
    };

    savings.clamp(0, subtotal)
}
