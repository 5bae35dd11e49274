// Stripe event envelopes and the object shapes the ledger reads

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const INVOICE_PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
    #[serde(default)]
    pub created: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// Deserialize `data.object` into a typed shape
    pub fn object<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.object.clone())
    }
}

/// A reference that may arrive as a bare id or an expanded object
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    pub fn id(&self) -> &str {
        match self {
            Expandable::Id(id) | Expandable::Object { id } => id,
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub subscription: Option<Expandable>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub amount_subtotal: Option<i64>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub total_details: Option<TotalDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TotalDetails {
    #[serde(default)]
    pub amount_discount: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub id: String,
    #[serde(default)]
    pub subscription: Option<Expandable>,
    /// Newer API versions move the subscription under `parent`
    #[serde(default)]
    pub parent: Option<InvoiceParent>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub subtotal: Option<i64>,
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub total_discount_amounts: Option<Vec<DiscountAmount>>,
    #[serde(default)]
    pub period_start: Option<i64>,
    #[serde(default)]
    pub period_end: Option<i64>,
    #[serde(default)]
    pub lines: Option<InvoiceLines>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceParent {
    #[serde(default)]
    pub subscription_details: Option<SubscriptionDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionDetails {
    #[serde(default)]
    pub subscription: Option<Expandable>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscountAmount {
    pub amount: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceLines {
    #[serde(default)]
    pub data: Vec<InvoiceLine>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceLine {
    #[serde(default)]
    pub period: Option<LinePeriod>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinePeriod {
    pub start: i64,
    pub end: i64,
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

impl InvoiceObject {
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription
            .as_ref()
            .or_else(|| {
                self.parent
                    .as_ref()
                    .and_then(|p| p.subscription_details.as_ref())
                    .and_then(|d| d.subscription.as_ref())
            })
            .map(Expandable::id)
    }

    /// Sum of all discount amounts; `None` when the provider omitted them
    pub fn discount_total(&self) -> Option<i64> {
        self.total_discount_amounts
            .as_ref()
            .map(|amounts| amounts.iter().map(|a| a.amount).sum())
    }

    /// Billing period of the first line, falling back to the invoice period
    pub fn billing_period(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let line_period = self
            .lines
            .as_ref()
            .and_then(|lines| lines.data.iter().find_map(|line| line.period.as_ref()));

        match line_period {
            Some(period) => (timestamp(period.start), timestamp(period.end)),
            None => (
                self.period_start.and_then(timestamp),
                self.period_end.and_then(timestamp),
            ),
        }
    }
}
