// Domain type definitions for discount rules
// The magnitude of a rule is a sum type keyed by its item key

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::discounts::error::{DiscountError, DiscountResult};

/// Closed set of discount kinds known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKey {
    PercentOffOnce,
    PercentOffFirstNMonths,
    AmountOffOnce,
    TrialDays,
}

impl ItemKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKey::PercentOffOnce => "PERCENT_OFF_ONCE",
            ItemKey::PercentOffFirstNMonths => "PERCENT_OFF_FIRST_N_MONTHS",
            ItemKey::AmountOffOnce => "AMOUNT_OFF_ONCE",
            ItemKey::TrialDays => "TRIAL_DAYS",
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERCENT_OFF_ONCE" => Ok(ItemKey::PercentOffOnce),
            "PERCENT_OFF_FIRST_N_MONTHS" => Ok(ItemKey::PercentOffFirstNMonths),
            "AMOUNT_OFF_ONCE" => Ok(ItemKey::AmountOffOnce),
            "TRIAL_DAYS" => Ok(ItemKey::TrialDays),
            _ => Err(format!("Invalid item key: {}", s)),
        }
    }
}

/// Magnitude of a discount rule
///
/// Each variant carries exactly the fields its item key requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "item_key", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountKind {
    PercentOffOnce {
        percent_off: Decimal,
    },
    PercentOffFirstNMonths {
        percent_off: Decimal,
        first_n_months: i32,
    },
    AmountOffOnce {
        /// Minor currency units
        amount_off: i64,
        currency: String,
    },
    TrialDays {
        trial_days: i32,
    },
}

/// Flat, optional view of the magnitude columns
///
/// This is the shape used by the database row, the admin write DTOs and the
/// redemption rule snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MagnitudeFields {
    #[schema(value_type = Option<String>, example = "10")]
    pub percent_off: Option<Decimal>,
    #[schema(example = 500)]
    pub amount_off: Option<i64>,
    #[schema(example = "usd")]
    pub currency: Option<String>,
    pub first_n_months: Option<i32>,
    pub trial_days: Option<i32>,
}

impl DiscountKind {
    pub fn item_key(&self) -> ItemKey {
        match self {
            DiscountKind::PercentOffOnce { .. } => ItemKey::PercentOffOnce,
            DiscountKind::PercentOffFirstNMonths { .. } => ItemKey::PercentOffFirstNMonths,
            DiscountKind::AmountOffOnce { .. } => ItemKey::AmountOffOnce,
            DiscountKind::TrialDays { .. } => ItemKey::TrialDays,
        }
    }

    pub fn is_trial(&self) -> bool {
        matches!(self, DiscountKind::TrialDays { .. })
    }

    pub fn trial_days(&self) -> Option<i32> {
        match self {
            DiscountKind::TrialDays { trial_days } => Some(*trial_days),
            _ => None,
        }
    }

    /// Build a magnitude from flat fields
    ///
    /// The present fields must exactly match what `item_key` requires: a
    /// missing required field and a stray field from another kind are both
    /// rejected.
    pub fn from_fields(item_key: ItemKey, fields: &MagnitudeFields) -> DiscountResult<Self> {
        let present = present_field_names(fields);
        let required: &[&str] = match item_key {
            ItemKey::PercentOffOnce => &["percent_off"],
            ItemKey::PercentOffFirstNMonths => &["percent_off", "first_n_months"],
            ItemKey::AmountOffOnce => &["amount_off", "currency"],
            ItemKey::TrialDays => &["trial_days"],
        };

        if let Some(missing) = required.iter().find(|name| !present.contains(name)) {
            return Err(DiscountError::InvalidMagnitude(format!(
                "{} requires {}",
                item_key, missing
            )));
        }
        if let Some(extra) = present.iter().find(|name| !required.contains(name)) {
            return Err(DiscountError::InvalidMagnitude(format!(
                "{} does not accept {}",
                item_key, extra
            )));
        }

        let kind = match item_key {
            ItemKey::PercentOffOnce => DiscountKind::PercentOffOnce {
                percent_off: fields.percent_off.unwrap_or_default(),
            },
            ItemKey::PercentOffFirstNMonths => DiscountKind::PercentOffFirstNMonths {
                percent_off: fields.percent_off.unwrap_or_default(),
                first_n_months: fields.first_n_months.unwrap_or_default(),
            },
            ItemKey::AmountOffOnce => DiscountKind::AmountOffOnce {
                amount_off: fields.amount_off.unwrap_or_default(),
                currency: fields.currency.clone().unwrap_or_default(),
            },
            ItemKey::TrialDays => DiscountKind::TrialDays {
                trial_days: fields.trial_days.unwrap_or_default(),
            },
        };

        kind.validate_ranges()?;
        Ok(kind)
    }

    /// Flatten back into optional fields
    pub fn to_fields(&self) -> MagnitudeFields {
        match self {
            DiscountKind::PercentOffOnce { percent_off } => MagnitudeFields {
                percent_off: Some(*percent_off),
                ..Default::default()
            },
            DiscountKind::PercentOffFirstNMonths {
                percent_off,
                first_n_months,
            } => MagnitudeFields {
                percent_off: Some(*percent_off),
                first_n_months: Some(*first_n_months),
                ..Default::default()
            },
            DiscountKind::AmountOffOnce {
                amount_off,
                currency,
            } => MagnitudeFields {
                amount_off: Some(*amount_off),
                currency: Some(currency.clone()),
                ..Default::default()
            },
            DiscountKind::TrialDays { trial_days } => MagnitudeFields {
                trial_days: Some(*trial_days),
                ..Default::default()
            },
        }
    }

    fn validate_ranges(&self) -> DiscountResult<()> {
        match self {
            DiscountKind::PercentOffOnce { percent_off } => validate_percent(*percent_off),
            DiscountKind::PercentOffFirstNMonths {
                percent_off,
                first_n_months,
            } => {
                validate_percent(*percent_off)?;
                if *first_n_months < 1 {
                    return Err(DiscountError::InvalidMagnitude(
                        "first_n_months must be at least 1".to_string(),
                    ));
                }
                Ok(())
            }
            DiscountKind::AmountOffOnce {
                amount_off,
                currency,
            } => {
                if *amount_off <= 0 {
                    return Err(DiscountError::InvalidMagnitude(
                        "amount_off must be a positive number of cents".to_string(),
                    ));
                }
                crate::validation::validate_currency_code(currency).map_err(|_| {
                    DiscountError::InvalidMagnitude(format!(
                        "currency '{}' is not a lowercase ISO 4217 code",
                        currency
                    ))
                })
            }
            DiscountKind::TrialDays { trial_days } => {
                if *trial_days < 1 {
                    return Err(DiscountError::InvalidMagnitude(
                        "trial_days must be at least 1".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

fn present_field_names(fields: &MagnitudeFields) -> Vec<&'static str> {
    let mut names = Vec::new();
    if fields.percent_off.is_some() {
        names.push("percent_off");
    }
    if fields.amount_off.is_some() {
        names.push("amount_off");
    }
    if fields.currency.is_some() {
        names.push("currency");
    }
    if fields.first_n_months.is_some() {
        names.push("first_n_months");
    }
    if fields.trial_days.is_some() {
        names.push("trial_days");
    }
    names
}

fn validate_percent(percent_off: Decimal) -> DiscountResult<()> {
    if percent_off <= Decimal::ZERO || percent_off > Decimal::ONE_HUNDRED {
        return Err(DiscountError::InvalidMagnitude(
            "percent_off must be greater than 0 and at most 100".to_string(),
        ));
    }
    Ok(())
}

/// Percent of a subtotal rounded down to whole cents
pub(crate) fn percent_of_cents(subtotal: i64, percent_off: Decimal) -> i64 {
    (Decimal::from(subtotal) * percent_off / Decimal::ONE_HUNDRED)
        .floor()
        .to_i64()
        .unwrap_or(0)
}

/// Kind of provider event that produced a redemption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AppliedTo {
    Checkout,
    Invoice,
    Subscription,
}

impl fmt::Display for AppliedTo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppliedTo::Checkout => write!(f, "checkout"),
            AppliedTo::Invoice => write!(f, "invoice"),
            AppliedTo::Subscription => write!(f, "subscription"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn test_item_key_round_trip_strings() {
        for key in [
            ItemKey::PercentOffOnce,
            ItemKey::PercentOffFirstNMonths,
            ItemKey::AmountOffOnce,
            ItemKey::TrialDays,
        ] {
            assert_eq!(ItemKey::from_str(key.as_str()).unwrap(), key);
        }
        assert!(ItemKey::from_str("percent_off_once").is_err());
    }

    #[test]
    fn test_item_key_serialization() {
        let json = serde_json::to_string(&ItemKey::PercentOffFirstNMonths).unwrap();
        assert_eq!(json, "\"PERCENT_OFF_FIRST_N_MONTHS\"");
    }

    #[test]
    fn test_percent_off_once_requires_percent() {
        let err = DiscountKind::from_fields(ItemKey::PercentOffOnce, &MagnitudeFields::default())
            .unwrap_err();
        assert!(matches!(err, DiscountError::InvalidMagnitude(_)));
        assert!(err.to_string().contains("percent_off"));
    }

    #[test]
    fn test_trial_days_requires_trial_days() {
        let err = DiscountKind::from_fields(ItemKey::TrialDays, &MagnitudeFields::default())
            .unwrap_err();
        assert!(err.to_string().contains("trial_days"));
    }

    #[test]
    fn test_stray_field_rejected() {
        let fields = MagnitudeFields {
            percent_off: Some(dec!(10)),
            trial_days: Some(14),
            ..Default::default()
        };
        let err = DiscountKind::from_fields(ItemKey::PercentOffOnce, &fields).unwrap_err();
        assert!(err.to_string().contains("does not accept trial_days"));
    }

    #[test]
    fn test_percent_range_enforced() {
        let fields = MagnitudeFields {
            percent_off: Some(dec!(100.5)),
            ..Default::default()
        };
        assert!(DiscountKind::from_fields(ItemKey::PercentOffOnce, &fields).is_err());

        let fields = MagnitudeFields {
            percent_off: Some(dec!(0)),
            ..Default::default()
        };
        assert!(DiscountKind::from_fields(ItemKey::PercentOffOnce, &fields).is_err());
    }

    #[test]
    fn test_amount_off_requires_valid_currency() {
        let fields = MagnitudeFields {
            amount_off: Some(500),
            currency: Some("USD".to_string()),
            ..Default::default()
        };
        assert!(DiscountKind::from_fields(ItemKey::AmountOffOnce, &fields).is_err());

        let fields = MagnitudeFields {
            amount_off: Some(500),
            currency: Some("usd".to_string()),
            ..Default::default()
        };
        let kind = DiscountKind::from_fields(ItemKey::AmountOffOnce, &fields).unwrap();
        assert_eq!(kind.item_key(), ItemKey::AmountOffOnce);
        assert_eq!(kind.to_fields(), fields);
    }

    #[test]
    fn test_first_n_months_fields() {
        let fields = MagnitudeFields {
            percent_off: Some(dec!(25)),
            first_n_months: Some(3),
            ..Default::default()
        };
        let kind = DiscountKind::from_fields(ItemKey::PercentOffFirstNMonths, &fields).unwrap();
        assert_eq!(
            kind,
            DiscountKind::PercentOffFirstNMonths {
                percent_off: dec!(25),
                first_n_months: 3
            }
        );
    }

    #[test]
    fn test_percent_of_cents_floors() {
        assert_eq!(percent_of_cents(999, dec!(10)), 99);
        assert_eq!(percent_of_cents(10000, dec!(12.5)), 1250);
        assert_eq!(percent_of_cents(0, dec!(50)), 0);
    }

    #[test]
    fn test_discount_kind_tagged_json() {
        let kind = DiscountKind::TrialDays { trial_days: 14 };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["item_key"], "TRIAL_DAYS");
        assert_eq!(json["trial_days"], 14);
    }

    #[test]
    fn test_applied_to_display() {
        assert_eq!(AppliedTo::Checkout.to_string(), "checkout");
        assert_eq!(AppliedTo::Invoice.to_string(), "invoice");
        assert_eq!(AppliedTo::Subscription.to_string(), "subscription");
    }
}
