use sea_orm::EntityTrait;
use serde_json::{Map, json};
use uuid::Uuid;

use crate::db::OrmConn;
use crate::entity::purchases;
use crate::error::AppResult;
use crate::models::PurchaseStatus;
use crate::payments::stripe::StripeCheckoutSession;

use super::mark_completed;

/// Idempotent completion from a verified `checkout.session.completed` event.
/// Safe to run zero, one or many times per delivery: unresolvable sessions
/// and already-completed purchases exit quietly so the provider is never
/// driven into an endless retry loop.
pub async fn process(conn: &OrmConn, session: &StripeCheckoutSession) -> AppResult<()> {
    let Some(raw_purchase_id) = session.metadata.purchase_id.as_deref() else {
        tracing::warn!(
            session_id = %session.id,
            "Stripe webhook: purchase id not found in session metadata"
        );
        return Ok(());
    };

    let Ok(purchase_id) = Uuid::parse_str(raw_purchase_id) else {
        tracing::warn!(
            session_id = %session.id,
            purchase_id = raw_purchase_id,
            "Stripe webhook: purchase id in session metadata is not a uuid"
        );
        return Ok(());
    };

    let Some(purchase) = purchases::Entity::find_by_id(purchase_id).one(conn).await? else {
        tracing::warn!(
            purchase_id = %purchase_id,
            session_id = %session.id,
            "Stripe webhook: purchase not found"
        );
        return Ok(());
    };

    if purchase.status == PurchaseStatus::Completed.as_str() {
        tracing::info!(purchase_id = %purchase_id, "Stripe webhook: purchase already completed");
        return Ok(());
    }

    if session.payment_status.as_deref() == Some("paid") {
        let mut fields = Map::new();
        fields.insert("stripe_session_id".into(), json!(session.id));
        fields.insert(
            "stripe_payment_intent".into(),
            json!(session.payment_intent),
        );
        fields.insert("stripe_customer".into(), json!(session.customer));

        mark_completed(
            conn,
            purchase,
            session.payment_intent.clone(),
            "stripe",
            fields,
        )
        .await?;

        tracing::info!(
            purchase_id = %purchase_id,
            payment_intent = ?session.payment_intent,
            "Stripe webhook: purchase completed"
        );
    } else {
        // Not a failure: a later event can still complete the purchase.
        tracing::warn!(
            purchase_id = %purchase_id,
            session_id = %session.id,
            payment_status = ?session.payment_status,
            "Stripe webhook: session not paid"
        );
    }

    Ok(())
}
