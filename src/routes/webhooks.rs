//! Provider webhook endpoints. Unauthenticated by design: the signature over
//! the raw body is the only trust boundary, and it is checked before any
//! state is touched. Accepted events are queued for the background worker
//! and the response returns immediately, so provider retry timeouts never
//! depend on our database.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};

use crate::{models::PaymentProviderKind, state::AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stripe", post(stripe_webhook))
        .route("/razorpay", post(razorpay_webhook))
}

#[utoipa::path(post, path = "/webhooks/stripe", tag = "Webhooks", request_body = String)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    handle(&state, PaymentProviderKind::Stripe, &headers, "Stripe-Signature", &body)
}

#[utoipa::path(post, path = "/webhooks/razorpay", tag = "Webhooks", request_body = String)]
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    handle(
        &state,
        PaymentProviderKind::Razorpay,
        &headers,
        "X-Razorpay-Signature",
        &body,
    )
}

fn handle(
    state: &AppState,
    provider: PaymentProviderKind,
    headers: &HeaderMap,
    signature_header: &'static str,
    body: &[u8],
) -> (StatusCode, &'static str) {
    let Some(signature) = headers
        .get(signature_header)
        .and_then(|value| value.to_str().ok())
    else {
        tracing::warn!(provider = provider.as_str(), "missing webhook signature header");
        return (StatusCode::BAD_REQUEST, "Missing signature");
    };

    let gateway = state.gateways.get(provider);

    if !gateway.verify_webhook_signature(body, signature) {
        tracing::warn!(provider = provider.as_str(), "invalid webhook signature");
        return (StatusCode::BAD_REQUEST, "Invalid signature");
    }

    match gateway.completion_job(body) {
        Ok(Some(job)) => {
            state.jobs.enqueue(job);
            (StatusCode::OK, "Webhook handled")
        }
        // Valid signature, uninteresting event type: acknowledge and move on.
        Ok(None) => (StatusCode::OK, "Webhook ignored"),
        Err(err) => {
            tracing::warn!(
                provider = provider.as_str(),
                error = %err,
                "webhook payload could not be parsed"
            );
            (StatusCode::BAD_REQUEST, "Webhook failed")
        }
    }
}
