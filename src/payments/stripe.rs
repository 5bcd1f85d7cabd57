//! Stripe adapter: hosted Checkout sessions over the REST API, plus signed
//! webhook event parsing.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::StripeConfig;
use crate::entity::{purchases, users};
use crate::jobs::WebhookJob;
use crate::models::Purchasable;

use super::{
    CheckoutPayload, GatewayError, PaymentGateway, RemotePayment, hmac_sha256_hex,
    signatures_match,
};

const API_BASE: &str = "https://api.stripe.com/v1";

/// Reject signed events older than this (provider retries re-sign, so a
/// stale timestamp means a replay).
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub struct StripeGateway {
    config: StripeConfig,
    http: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub purchase_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub purchasable_type: Option<String>,
    #[serde(default)]
    pub purchasable_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: StripeCheckoutSession,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: String,
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment(
        &self,
        purchase: &purchases::Model,
        item: &Purchasable,
        _buyer: &users::Model,
    ) -> Result<CheckoutPayload, GatewayError> {
        if self.config.secret_key.is_empty() {
            return Err(GatewayError::Unconfigured("Stripe secret key"));
        }

        let success_url = format!(
            "{}?purchase_id={}&session_id={{CHECKOUT_SESSION_ID}}",
            self.config.success_url, purchase.id
        );
        let cancel_url = format!("{}?purchase_id={}", self.config.cancel_url, purchase.id);

        let form = [
            ("mode", "payment".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "line_items[0][price_data][currency]",
                purchase.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                purchase.amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                item.title().to_string(),
            ),
            (
                "line_items[0][price_data][product_data][description]",
                item.description().to_string(),
            ),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("metadata[purchase_id]", purchase.id.to_string()),
            ("metadata[user_id]", purchase.user_id.to_string()),
            (
                "metadata[purchasable_type]",
                purchase.purchasable_type.clone(),
            ),
            (
                "metadata[purchasable_id]",
                purchase.purchasable_id.to_string(),
            ),
        ];

        let response = self
            .http
            .post(format!("{API_BASE}/checkout/sessions"))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let session: StripeCheckoutSession = response.json().await?;
        let checkout_url = session
            .url
            .ok_or_else(|| GatewayError::Malformed("checkout session without url".into()))?;

        Ok(CheckoutPayload::Redirect {
            checkout_url,
            session_id: session.id,
        })
    }

    async fn retrieve_payment(&self, reference: &str) -> Result<RemotePayment, GatewayError> {
        if self.config.secret_key.is_empty() {
            return Err(GatewayError::Unconfigured("Stripe secret key"));
        }

        let response = self
            .http
            .get(format!("{API_BASE}/checkout/sessions/{reference}"))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let session: StripeCheckoutSession = response.json().await?;
        let raw_status = session.payment_status.unwrap_or_default();
        Ok(RemotePayment {
            reference: session.id,
            paid: raw_status == "paid",
            raw_status,
        })
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        if self.config.webhook_secret.is_empty() {
            tracing::warn!("Stripe webhook secret not configured");
            return false;
        }

        let Some(header) = SignatureHeader::parse(signature) else {
            return false;
        };

        let age = Utc::now().timestamp() - header.timestamp;
        if age.abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::warn!(age, "Stripe webhook signature timestamp out of tolerance");
            return false;
        }

        let mut signed_payload = header.timestamp.to_string().into_bytes();
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(payload);

        let expected =
            hmac_sha256_hex(self.config.webhook_secret.as_bytes(), &signed_payload);
        signatures_match(&expected, &header.v1)
    }

    fn completion_job(&self, payload: &[u8]) -> Result<Option<WebhookJob>, GatewayError> {
        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|err| GatewayError::Malformed(err.to_string()))?;

        if event.event_type == "checkout.session.completed" {
            return Ok(Some(WebhookJob::Stripe(event.data.object)));
        }
        Ok(None)
    }
}

async fn provider_error(response: reqwest::Response) -> GatewayError {
    let status = response.status();
    match response.json::<StripeErrorBody>().await {
        Ok(body) => GatewayError::Provider(body.error.message),
        Err(_) => GatewayError::Provider(format!("Stripe returned {status}")),
    }
}

/// Parsed `Stripe-Signature` header: `t=<unix>,v1=<hex>[,...]`.
struct SignatureHeader {
    timestamp: i64,
    v1: String,
}

impl SignatureHeader {
    fn parse(header: &str) -> Option<Self> {
        let mut timestamp = None;
        let mut v1 = None;
        for part in header.split(',') {
            let (key, value) = part.trim().split_once('=')?;
            match key {
                "t" => timestamp = value.parse::<i64>().ok(),
                "v1" => v1 = Some(value.to_string()),
                _ => {}
            }
        }
        Some(Self {
            timestamp: timestamp?,
            v1: v1?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(webhook_secret: &str) -> StripeGateway {
        StripeGateway::new(StripeConfig {
            secret_key: "sk_test_x".into(),
            webhook_secret: webhook_secret.into(),
            success_url: "http://localhost/success".into(),
            cancel_url: "http://localhost/cancel".into(),
        })
    }

    fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
        let mut signed = timestamp.to_string().into_bytes();
        signed.push(b'.');
        signed.extend_from_slice(body);
        format!(
            "t={timestamp},v1={}",
            hmac_sha256_hex(secret.as_bytes(), &signed)
        )
    }

    #[test]
    fn accepts_a_correctly_signed_recent_payload() {
        let gateway = gateway("whsec_test");
        let body = br#"{"type":"checkout.session.completed"}"#;
        let header = sign("whsec_test", Utc::now().timestamp(), body);
        assert!(gateway.verify_webhook_signature(body, &header));
    }

    #[test]
    fn rejects_a_tampered_payload() {
        let gateway = gateway("whsec_test");
        let header = sign("whsec_test", Utc::now().timestamp(), b"original");
        assert!(!gateway.verify_webhook_signature(b"tampered", &header));
    }

    #[test]
    fn rejects_a_stale_timestamp() {
        let gateway = gateway("whsec_test");
        let body = b"payload";
        let stale = Utc::now().timestamp() - SIGNATURE_TOLERANCE_SECS - 10;
        let header = sign("whsec_test", stale, body);
        assert!(!gateway.verify_webhook_signature(body, &header));
    }

    #[test]
    fn rejects_when_secret_is_unconfigured() {
        let gateway = gateway("");
        let body = b"payload";
        let header = sign("whsec_test", Utc::now().timestamp(), body);
        assert!(!gateway.verify_webhook_signature(body, &header));
    }

    #[test]
    fn rejects_garbage_headers() {
        let gateway = gateway("whsec_test");
        assert!(!gateway.verify_webhook_signature(b"x", "not-a-header"));
        assert!(!gateway.verify_webhook_signature(b"x", "t=abc,v1=00"));
    }

    #[test]
    fn completion_job_filters_event_types() {
        let gateway = gateway("whsec_test");
        let completed = br#"{
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_1", "payment_status": "paid",
                "metadata": {"purchase_id": "7b5dcb2d-55bb-4a44-9925-1a7a65fbd200"}}}
        }"#;
        let job = gateway.completion_job(completed).unwrap();
        match job {
            Some(WebhookJob::Stripe(session)) => {
                assert_eq!(session.id, "cs_1");
                assert_eq!(
                    session.metadata.purchase_id.as_deref(),
                    Some("7b5dcb2d-55bb-4a44-9925-1a7a65fbd200")
                );
            }
            other => panic!("expected stripe job, got {other:?}"),
        }

        let ignored = br#"{"type": "invoice.paid", "data": {"object": {"id": "in_1"}}}"#;
        assert!(gateway.completion_job(ignored).unwrap().is_none());
    }
}
