//! Razorpay adapter: order creation for the embedded checkout widget, the
//! client-side payment signature check, and signed webhook parsing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::RazorpayConfig;
use crate::entity::{purchases, users};
use crate::jobs::WebhookJob;
use crate::models::Purchasable;

use super::{
    CheckoutPayload, GatewayError, PaymentGateway, RemotePayment, hmac_sha256_hex,
    signatures_match,
};

const API_BASE: &str = "https://api.razorpay.com/v1";

pub struct RazorpayGateway {
    config: RazorpayConfig,
    http: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RazorpayPaymentEntity {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RazorpayEvent {
    event: String,
    payload: RazorpayEventPayload,
}

#[derive(Debug, Deserialize)]
struct RazorpayEventPayload {
    payment: RazorpayEventPayment,
}

#[derive(Debug, Deserialize)]
struct RazorpayEventPayment {
    entity: RazorpayPaymentEntity,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorBody {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    description: String,
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_payment(
        &self,
        purchase: &purchases::Model,
        item: &Purchasable,
        buyer: &users::Model,
    ) -> Result<CheckoutPayload, GatewayError> {
        if self.config.key_id.is_empty() || self.config.key_secret.is_empty() {
            return Err(GatewayError::Unconfigured("Razorpay API keys"));
        }

        let body = json!({
            "amount": purchase.amount,
            "currency": purchase.currency,
            "receipt": format!("purchase_{}", purchase.id),
            "notes": {
                "purchase_id": purchase.id.to_string(),
                "user_id": purchase.user_id.to_string(),
                "purchasable_type": purchase.purchasable_type,
                "purchasable_id": purchase.purchasable_id.to_string(),
                "title": item.title(),
            },
        });

        let response = self
            .http
            .post(format!("{API_BASE}/orders"))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let order: RazorpayOrder = response.json().await?;

        Ok(CheckoutPayload::Order {
            order_id: order.id,
            amount: order.amount,
            currency: order.currency,
            key_id: self.config.key_id.clone(),
            description: item.title().to_string(),
            prefill_name: buyer.name.clone(),
            prefill_email: buyer.email.clone(),
        })
    }

    async fn retrieve_payment(&self, reference: &str) -> Result<RemotePayment, GatewayError> {
        if self.config.key_id.is_empty() || self.config.key_secret.is_empty() {
            return Err(GatewayError::Unconfigured("Razorpay API keys"));
        }

        let response = self
            .http
            .get(format!("{API_BASE}/payments/{reference}"))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let payment: RazorpayPaymentEntity = response.json().await?;
        Ok(RemotePayment {
            reference: payment.id,
            paid: payment.status == "captured",
            raw_status: payment.status,
        })
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        if self.config.webhook_secret.is_empty() {
            tracing::warn!("Razorpay webhook secret not configured");
            return false;
        }
        let expected = hmac_sha256_hex(self.config.webhook_secret.as_bytes(), payload);
        signatures_match(&expected, signature)
    }

    fn completion_job(&self, payload: &[u8]) -> Result<Option<WebhookJob>, GatewayError> {
        let event: RazorpayEvent = serde_json::from_slice(payload)
            .map_err(|err| GatewayError::Malformed(err.to_string()))?;

        if event.event == "payment.captured" {
            return Ok(Some(WebhookJob::Razorpay(event.payload.payment.entity)));
        }
        Ok(None)
    }
}

async fn provider_error(response: reqwest::Response) -> GatewayError {
    let status = response.status();
    match response.json::<RazorpayErrorBody>().await {
        Ok(body) => GatewayError::Provider(body.error.description),
        Err(_) => GatewayError::Provider(format!("Razorpay returned {status}")),
    }
}

/// Check the signature Razorpay's client widget hands back after payment:
/// HMAC-SHA256 over `"{order_id}|{payment_id}"` with the key secret.
pub fn verify_payment_signature(
    key_secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> bool {
    if key_secret.is_empty() {
        return false;
    }
    let message = format!("{order_id}|{payment_id}");
    let expected = hmac_sha256_hex(key_secret.as_bytes(), message.as_bytes());
    signatures_match(&expected, signature)
}
