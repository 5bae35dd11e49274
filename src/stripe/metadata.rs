// Metadata contract between checkout and the webhook ledger
//
// The checkout builder writes these keys onto the session and the
// subscription; webhook handlers read them back to find the applied rule.

use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::discounts::ItemKey;

pub const META_APPLIED_DISCOUNT_ID: &str = "applied_discount_id";
pub const META_APPLIED_ITEM_KEY: &str = "applied_item_key";
pub const META_CUSTOMER_ID: &str = "customer_id";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscountMetadata {
    pub customer_id: Option<String>,
    pub applied_discount_id: Option<Uuid>,
    pub applied_item_key: Option<ItemKey>,
}

impl DiscountMetadata {
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: Some(customer_id.into()),
            ..Default::default()
        }
    }

    pub fn with_discount(mut self, discount_id: Uuid, item_key: ItemKey) -> Self {
        self.applied_discount_id = Some(discount_id);
        self.applied_item_key = Some(item_key);
        self
    }

    /// Key/value pairs; the applied keys are sent as empty strings when no
    /// discount applies so stale values on a reused object are cleared
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                META_APPLIED_DISCOUNT_ID,
                self.applied_discount_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            ),
            (
                META_APPLIED_ITEM_KEY,
                self.applied_item_key
                    .map(|key| key.to_string())
                    .unwrap_or_default(),
            ),
            (
                META_CUSTOMER_ID,
                self.customer_id.clone().unwrap_or_default(),
            ),
        ]
    }

    /// Read the contract back; blank or unparseable values become `None`
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let non_empty = |key: &str| {
            map.get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };

        Self {
            customer_id: non_empty(META_CUSTOMER_ID).map(str::to_string),
            applied_discount_id: non_empty(META_APPLIED_DISCOUNT_ID)
                .and_then(|value| Uuid::parse_str(value).ok()),
            applied_item_key: non_empty(META_APPLIED_ITEM_KEY)
                .and_then(|value| ItemKey::from_str(value).ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_include_all_keys() {
        let id = Uuid::new_v4();
        let metadata = DiscountMetadata::new("42").with_discount(id, ItemKey::TrialDays);
        let pairs: HashMap<_, _> = metadata.to_pairs().into_iter().collect();

        assert_eq!(pairs[META_APPLIED_DISCOUNT_ID], id.to_string());
        assert_eq!(pairs[META_APPLIED_ITEM_KEY], "TRIAL_DAYS");
        assert_eq!(pairs[META_CUSTOMER_ID], "42");
    }

    #[test]
    fn test_no_discount_sends_blank_values() {
        let pairs: HashMap<_, _> = DiscountMetadata::new("42").to_pairs().into_iter().collect();
        assert_eq!(pairs[META_APPLIED_DISCOUNT_ID], "");
        assert_eq!(pairs[META_APPLIED_ITEM_KEY], "");
    }

    #[test]
    fn test_from_map_reads_contract() {
        let id = Uuid::new_v4();
        let map = HashMap::from([
            (META_APPLIED_DISCOUNT_ID.to_string(), id.to_string()),
            (META_APPLIED_ITEM_KEY.to_string(), "PERCENT_OFF_ONCE".to_string()),
            (META_CUSTOMER_ID.to_string(), "7".to_string()),
        ]);

        let metadata = DiscountMetadata::from_map(&map);
        assert_eq!(metadata.applied_discount_id, Some(id));
        assert_eq!(metadata.applied_item_key, Some(ItemKey::PercentOffOnce));
        assert_eq!(metadata.customer_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_from_map_tolerates_garbage() {
        let map = HashMap::from([
            (META_APPLIED_DISCOUNT_ID.to_string(), "not-a-uuid".to_string()),
            (META_APPLIED_ITEM_KEY.to_string(), "".to_string()),
        ]);

        assert_eq!(DiscountMetadata::from_map(&map), DiscountMetadata::default());
    }
}
