// Live Stripe client over the REST API
//
// Requests are form-encoded; one attempt per call, errors propagate to the
// caller unchanged.

use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::stripe::client::{
    CouponDuration, CouponValue, CreateCheckoutSessionRequest, CreateCouponRequest,
    PaymentProvider, ProviderCheckoutSession, ProviderCoupon, ProviderError, SessionDiscount,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct LiveStripeClient {
    http: Client,
    api_base: String,
    secret_key: SecretString,
}

impl std::fmt::Debug for LiveStripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStripeClient")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

impl LiveStripeClient {
    pub fn new(api_base: impl Into<String>, secret_key: SecretString) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn post_form(&self, path: &str, form: &[(String, String)]) -> Result<Value, ProviderError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(self.secret_key.expose_secret())
            .form(form)
            .send()
            .await?;

        read_json(response).await
    }

    async fn get(&self, path: &str) -> Result<Value, ProviderError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        read_json(response).await
    }
}

async fn read_json(response: Response) -> Result<Value, ProviderError> {
    let status = response.status();
    let body: Value = response.json().await?;

    if !status.is_success() {
        let message = body["error"]["message"]
            .as_str()
            .unwrap_or("unknown error")
            .to_string();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(body)
}

fn required_str(body: &Value, field: &str) -> Result<String, ProviderError> {
    body[field]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ProviderError::Decode(format!("missing '{}' in response", field)))
}

/// Form body for POST /v1/coupons
pub(crate) fn coupon_form(request: &CreateCouponRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("name".to_string(), request.name.clone()),
        ("duration".to_string(), request.duration.as_str().to_string()),
    ];

    if let CouponDuration::Repeating { months } = request.duration {
        form.push(("duration_in_months".to_string(), months.to_string()));
    }

    match &request.value {
        CouponValue::PercentOff(percent) => {
            form.push(("percent_off".to_string(), percent.normalize().to_string()));
        }
        CouponValue::AmountOff {
            amount_off,
            currency,
        } => {
            form.push(("amount_off".to_string(), amount_off.to_string()));
            form.push(("currency".to_string(), currency.clone()));
        }
    }

    let mut metadata: Vec<_> = request.metadata.iter().collect();
    metadata.sort();
    for (key, value) in metadata {
        form.push((format!("metadata[{}]", key), value.clone()));
    }

    form
}

/// Form body for POST /v1/checkout/sessions in subscription mode
pub(crate) fn checkout_session_form(request: &CreateCheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "subscription".to_string()),
        ("line_items[0][price]".to_string(), request.price_id.clone()),
        ("line_items[0][quantity]".to_string(), request.quantity.to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("client_reference_id".to_string(), request.customer_id.clone()),
    ];

    for (key, value) in request.metadata.to_pairs() {
        form.push((format!("metadata[{}]", key), value.clone()));
        form.push((format!("subscription_data[metadata][{}]", key), value));
    }

    match &request.discount {
        Some(SessionDiscount::Coupon(coupon_id)) => {
            form.push(("discounts[0][coupon]".to_string(), coupon_id.clone()));
        }
        Some(SessionDiscount::TrialPeriodDays(days)) => {
            form.push((
                "subscription_data[trial_period_days]".to_string(),
                days.to_string(),
            ));
        }
        None => {}
    }

    form
}

#[async_trait]
impl PaymentProvider for LiveStripeClient {
    async fn create_coupon(&self, request: CreateCouponRequest) -> Result<ProviderCoupon, ProviderError> {
        let body = self.post_form("/v1/coupons", &coupon_form(&request)).await?;
        Ok(ProviderCoupon {
            id: required_str(&body, "id")?,
        })
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSessionRequest,
    ) -> Result<ProviderCheckoutSession, ProviderError> {
        let body = self
            .post_form("/v1/checkout/sessions", &checkout_session_form(&request))
            .await?;

        Ok(ProviderCheckoutSession {
            id: required_str(&body, "id")?,
            url: body["url"].as_str().map(str::to_string),
        })
    }

    async fn get_subscription_metadata(
        &self,
        subscription_id: &str,
    ) -> Result<HashMap<String, String>, ProviderError> {
        let body = self
            .get(&format!("/v1/subscriptions/{}", subscription_id))
            .await?;

        match body.get("metadata") {
            None | Some(Value::Null) => Ok(HashMap::new()),
            Some(metadata) => serde_json::from_value(metadata.clone())
                .map_err(|e| ProviderError::Decode(format!("subscription metadata: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discounts::ItemKey;
    use crate::stripe::metadata::DiscountMetadata;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn lookup<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn session_request(discount: Option<SessionDiscount>) -> CreateCheckoutSessionRequest {
        CreateCheckoutSessionRequest {
            price_id: "price_basic".to_string(),
            quantity: 2,
            success_url: "https://dealer.example/ok".to_string(),
            cancel_url: "https://dealer.example/cancel".to_string(),
            customer_id: "42".to_string(),
            discount,
            metadata: DiscountMetadata::new("42"),
        }
    }

    #[test]
    fn test_percent_coupon_form() {
        let request = CreateCouponRequest {
            name: "Launch".to_string(),
            value: CouponValue::PercentOff(dec!(12.50)),
            duration: CouponDuration::Repeating { months: 3 },
            metadata: HashMap::from([("discount_id".to_string(), "abc".to_string())]),
        };
        let form = coupon_form(&request);

        assert_eq!(lookup(&form, "duration"), Some("repeating"));
        assert_eq!(lookup(&form, "duration_in_months"), Some("3"));
        assert_eq!(lookup(&form, "percent_off"), Some("12.5"));
        assert_eq!(lookup(&form, "metadata[discount_id]"), Some("abc"));
        assert_eq!(lookup(&form, "amount_off"), None);
    }

    #[test]
    fn test_amount_coupon_form() {
        let request = CreateCouponRequest {
            name: "Five off".to_string(),
            value: CouponValue::AmountOff {
                amount_off: 500,
                currency: "usd".to_string(),
            },
            duration: CouponDuration::Once,
            metadata: HashMap::new(),
        };
        let form = coupon_form(&request);

        assert_eq!(lookup(&form, "duration"), Some("once"));
        assert_eq!(lookup(&form, "duration_in_months"), None);
        assert_eq!(lookup(&form, "amount_off"), Some("500"));
        assert_eq!(lookup(&form, "currency"), Some("usd"));
    }

    #[test]
    fn test_session_form_with_coupon() {
        let id = Uuid::new_v4();
        let mut request = session_request(Some(SessionDiscount::Coupon("co_123".to_string())));
        request.metadata = request.metadata.with_discount(id, ItemKey::PercentOffOnce);
        let form = checkout_session_form(&request);

        assert_eq!(lookup(&form, "mode"), Some("subscription"));
        assert_eq!(lookup(&form, "line_items[0][quantity]"), Some("2"));
        assert_eq!(lookup(&form, "discounts[0][coupon]"), Some("co_123"));
        assert_eq!(lookup(&form, "subscription_data[trial_period_days]"), None);
        assert_eq!(
            lookup(&form, "metadata[applied_discount_id]"),
            Some(id.to_string().as_str())
        );
        assert_eq!(
            lookup(&form, "subscription_data[metadata][applied_item_key]"),
            Some("PERCENT_OFF_ONCE")
        );
        assert_eq!(lookup(&form, "subscription_data[metadata][customer_id]"), Some("42"));
    }

    #[test]
    fn test_session_form_with_trial() {
        let form = checkout_session_form(&session_request(Some(SessionDiscount::TrialPeriodDays(14))));

        assert_eq!(lookup(&form, "subscription_data[trial_period_days]"), Some("14"));
        assert_eq!(lookup(&form, "discounts[0][coupon]"), None);
    }

    #[test]
    fn test_session_form_without_discount() {
        let form = checkout_session_form(&session_request(None));

        assert_eq!(lookup(&form, "discounts[0][coupon]"), None);
        assert_eq!(lookup(&form, "metadata[applied_discount_id]"), Some(""));
        assert_eq!(lookup(&form, "client_reference_id"), Some("42"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = LiveStripeClient::new(
            "https://api.stripe.com/",
            SecretString::new("sk_test_supersecret".to_string()),
        )
        .unwrap();
        let debug = format!("{:?}", client);

        assert!(!debug.contains("supersecret"));
        assert_eq!(client.url("/v1/coupons"), "https://api.stripe.com/v1/coupons");
    }
}
