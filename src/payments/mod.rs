//! Payment gateways behind one narrow interface. The purchase orchestrator
//! and the webhook routes depend only on [`PaymentGateway`], never on
//! provider SDKs or wire formats.

pub mod mock;
pub mod razorpay;
pub mod stripe;

use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::PaymentConfig;
use crate::entity::{purchases, users};
use crate::jobs::WebhookJob;
use crate::models::{PaymentProviderKind, Purchasable};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Provider(String),

    #[error("{0} is not configured")]
    Unconfigured(&'static str),

    #[error("malformed gateway payload: {0}")]
    Malformed(String),
}

/// What the client needs to finish checkout, per provider flavour.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CheckoutPayload {
    /// Hosted checkout: redirect the browser to the provider.
    Redirect {
        checkout_url: String,
        session_id: String,
    },
    /// Embedded checkout: parameters for the provider's client widget.
    Order {
        order_id: String,
        amount: i64,
        currency: String,
        key_id: String,
        description: String,
        prefill_name: String,
        prefill_email: String,
    },
}

/// Provider-side payment state, as reported on a re-query.
#[derive(Debug, Clone)]
pub struct RemotePayment {
    pub reference: String,
    pub paid: bool,
    pub raw_status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Register the pending purchase with the provider and return whatever
    /// the client needs to pay.
    async fn create_payment(
        &self,
        purchase: &purchases::Model,
        item: &Purchasable,
        buyer: &users::Model,
    ) -> Result<CheckoutPayload, GatewayError>;

    /// Re-query the provider for the state of a payment or session.
    async fn retrieve_payment(&self, reference: &str) -> Result<RemotePayment, GatewayError>;

    /// Check the webhook trust boundary. Must be called on the raw body
    /// before anything is parsed or any state is touched.
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool;

    /// Parse a verified webhook body and filter for the provider's
    /// payment-completed event. `None` means a valid but irrelevant event.
    fn completion_job(&self, payload: &[u8]) -> Result<Option<WebhookJob>, GatewayError>;
}

/// The configured gateway per provider, selected by the purchase's tag.
#[derive(Clone)]
pub struct GatewayRegistry {
    stripe: Arc<dyn PaymentGateway>,
    razorpay: Arc<dyn PaymentGateway>,
}

impl GatewayRegistry {
    pub fn from_config(config: &PaymentConfig) -> Self {
        Self {
            stripe: Arc::new(stripe::StripeGateway::new(config.stripe.clone())),
            razorpay: Arc::new(razorpay::RazorpayGateway::new(config.razorpay.clone())),
        }
    }

    /// Registry with explicit gateways, used by tests to install mocks.
    pub fn with_gateways(
        stripe: Arc<dyn PaymentGateway>,
        razorpay: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self { stripe, razorpay }
    }

    pub fn get(&self, kind: PaymentProviderKind) -> &dyn PaymentGateway {
        match kind {
            PaymentProviderKind::Stripe => self.stripe.as_ref(),
            PaymentProviderKind::Razorpay => self.razorpay.as_ref(),
        }
    }
}

pub(crate) fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of an expected hex digest against a caller-supplied
/// signature string.
pub(crate) fn signatures_match(expected_hex: &str, provided: &str) -> bool {
    expected_hex.as_bytes().ct_eq(provided.as_bytes()).into()
}
