use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::{Map, json};

use crate::db::OrmConn;
use crate::entity::purchases;
use crate::error::AppResult;
use crate::models::{PaymentProviderKind, PurchaseStatus};
use crate::payments::razorpay::RazorpayPaymentEntity;

use super::mark_completed;

/// Idempotent completion from a verified `payment.captured` event. The
/// purchase is correlated through the Razorpay order id stored as
/// `payment_id` at order creation.
pub async fn process(conn: &OrmConn, payment: &RazorpayPaymentEntity) -> AppResult<()> {
    let Some(order_id) = payment.order_id.as_deref() else {
        tracing::warn!(
            payment_id = %payment.id,
            "Razorpay webhook: order id not found in payment data"
        );
        return Ok(());
    };

    let purchase = purchases::Entity::find()
        .filter(purchases::Column::PaymentId.eq(order_id))
        .filter(
            purchases::Column::PaymentProvider.eq(PaymentProviderKind::Razorpay.as_str()),
        )
        .one(conn)
        .await?;

    let Some(purchase) = purchase else {
        tracing::warn!(
            order_id,
            payment_id = %payment.id,
            "Razorpay webhook: purchase not found"
        );
        return Ok(());
    };

    if purchase.status == PurchaseStatus::Completed.as_str() {
        tracing::info!(purchase_id = %purchase.id, "Razorpay webhook: purchase already completed");
        return Ok(());
    }

    if payment.status == "captured" {
        let purchase_id = purchase.id;
        let mut fields = Map::new();
        fields.insert("razorpay_order_id".into(), json!(order_id));
        fields.insert("razorpay_payment_id".into(), json!(payment.id));
        fields.insert("razorpay_amount_captured".into(), json!(payment.amount));
        fields.insert("razorpay_method".into(), json!(payment.method));

        mark_completed(conn, purchase, Some(payment.id.clone()), "razorpay", fields).await?;

        tracing::info!(
            purchase_id = %purchase_id,
            payment_id = %payment.id,
            "Razorpay webhook: purchase completed"
        );
    } else {
        // Leave the purchase pending: a capture can still follow.
        tracing::warn!(
            purchase_id = %purchase.id,
            payment_id = %payment.id,
            payment_status = %payment.status,
            "Razorpay webhook: payment not captured"
        );
    }

    Ok(())
}
