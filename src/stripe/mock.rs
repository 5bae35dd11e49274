// Recording payment provider for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::stripe::client::{
    CreateCheckoutSessionRequest, CreateCouponRequest, PaymentProvider, ProviderCheckoutSession,
    ProviderCoupon, ProviderError,
};

#[derive(Default)]
pub struct MockPaymentProvider {
    coupon_counter: AtomicUsize,
    session_counter: AtomicUsize,
    fail_coupons: AtomicBool,
    pub coupons: Mutex<Vec<CreateCouponRequest>>,
    pub sessions: Mutex<Vec<CreateCheckoutSessionRequest>>,
    subscription_metadata: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_coupon_creation(&self, fail: bool) {
        self.fail_coupons.store(fail, Ordering::SeqCst);
    }

    pub fn set_subscription_metadata(&self, subscription_id: &str, metadata: HashMap<String, String>) {
        self.subscription_metadata
            .lock()
            .unwrap()
            .insert(subscription_id.to_string(), metadata);
    }

    pub fn coupon_count(&self) -> usize {
        self.coupons.lock().unwrap().len()
    }

    pub fn last_session(&self) -> Option<CreateCheckoutSessionRequest> {
        self.sessions.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_coupon(&self, request: CreateCouponRequest) -> Result<ProviderCoupon, ProviderError> {
        if self.fail_coupons.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 500,
                message: "coupon service unavailable".to_string(),
            });
        }
        let n = self.coupon_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.coupons.lock().unwrap().push(request);
        Ok(ProviderCoupon {
            id: format!("co_mock_{}", n),
        })
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSessionRequest,
    ) -> Result<ProviderCheckoutSession, ProviderError> {
        let n = self.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.sessions.lock().unwrap().push(request);
        Ok(ProviderCheckoutSession {
            id: format!("cs_mock_{}", n),
            url: Some(format!("https://checkout.stripe.test/cs_mock_{}", n)),
        })
    }

    async fn get_subscription_metadata(
        &self,
        subscription_id: &str,
    ) -> Result<HashMap<String, String>, ProviderError> {
        self.subscription_metadata
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| ProviderError::Api {
                status: 404,
                message: format!("No such subscription: '{}'", subscription_id),
            })
    }
}
