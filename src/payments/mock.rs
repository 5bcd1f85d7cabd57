//! Deterministic in-process gateway for tests: no network, predictable
//! references, switchable outcomes.

use async_trait::async_trait;

use crate::entity::{purchases, users};
use crate::jobs::WebhookJob;
use crate::models::{PaymentProviderKind, Purchasable};

use super::{CheckoutPayload, GatewayError, PaymentGateway, RemotePayment};

pub struct MockGateway {
    kind: PaymentProviderKind,
    /// What `retrieve_payment` reports.
    pub paid: bool,
    /// Force `create_payment` to fail like a declined provider call.
    pub fail_create: bool,
}

impl MockGateway {
    pub fn new(kind: PaymentProviderKind) -> Self {
        Self {
            kind,
            paid: true,
            fail_create: false,
        }
    }

    pub fn failing(kind: PaymentProviderKind) -> Self {
        Self {
            kind,
            paid: false,
            fail_create: true,
        }
    }

    pub fn session_reference(purchase: &purchases::Model) -> String {
        format!("cs_mock_{}", purchase.id.simple())
    }

    pub fn order_reference(purchase: &purchases::Model) -> String {
        format!("order_mock_{}", purchase.id.simple())
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_payment(
        &self,
        purchase: &purchases::Model,
        item: &Purchasable,
        buyer: &users::Model,
    ) -> Result<CheckoutPayload, GatewayError> {
        if self.fail_create {
            return Err(GatewayError::Provider("mock gateway declined".into()));
        }

        let payload = match self.kind {
            PaymentProviderKind::Stripe => CheckoutPayload::Redirect {
                checkout_url: format!(
                    "https://checkout.mock/{}",
                    Self::session_reference(purchase)
                ),
                session_id: Self::session_reference(purchase),
            },
            PaymentProviderKind::Razorpay => CheckoutPayload::Order {
                order_id: Self::order_reference(purchase),
                amount: purchase.amount,
                currency: purchase.currency.clone(),
                key_id: "rzp_mock".into(),
                description: item.title().to_string(),
                prefill_name: buyer.name.clone(),
                prefill_email: buyer.email.clone(),
            },
        };
        Ok(payload)
    }

    async fn retrieve_payment(&self, reference: &str) -> Result<RemotePayment, GatewayError> {
        Ok(RemotePayment {
            reference: reference.to_string(),
            paid: self.paid,
            raw_status: if self.paid { "paid" } else { "unpaid" }.to_string(),
        })
    }

    fn verify_webhook_signature(&self, _payload: &[u8], signature: &str) -> bool {
        signature == "mock-valid"
    }

    fn completion_job(&self, _payload: &[u8]) -> Result<Option<WebhookJob>, GatewayError> {
        Ok(None)
    }
}
