//! Background processing for webhook deliveries. The HTTP handler verifies
//! the signature, filters the event, enqueues a job and returns immediately;
//! the worker mutates purchase state out of band so provider retries never
//! hold a request open.

pub mod razorpay_webhook;
pub mod stripe_webhook;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, SqlErr};
use sea_orm::ActiveValue::Set;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::time::{Duration, sleep};

use crate::db::OrmConn;
use crate::entity::purchases;
use crate::error::AppResult;
use crate::models::{PurchaseMetadata, PurchaseStatus};
use crate::payments::razorpay::RazorpayPaymentEntity;
use crate::payments::stripe::StripeCheckoutSession;

#[derive(Debug, Clone)]
pub enum WebhookJob {
    Stripe(StripeCheckoutSession),
    Razorpay(RazorpayPaymentEntity),
}

/// Handle for enqueuing jobs onto the worker.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<WebhookJob>,
}

impl JobQueue {
    pub fn enqueue(&self, job: WebhookJob) {
        if self.tx.send(job).is_err() {
            tracing::error!("webhook worker is gone, dropping job");
        }
    }
}

const MAX_ATTEMPTS: u32 = 3;

/// Spawn the single consumer task. Jobs are retried on unexpected errors
/// (transient infrastructure failures); business anomalies are swallowed
/// inside the processors and never reach the retry loop.
pub fn spawn_webhook_worker(conn: OrmConn) -> JobQueue {
    let (tx, mut rx) = mpsc::unbounded_channel::<WebhookJob>();

    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            run_with_retry(&conn, &job).await;
        }
    });

    JobQueue { tx }
}

async fn run_with_retry(conn: &OrmConn, job: &WebhookJob) {
    for attempt in 1..=MAX_ATTEMPTS {
        let result = match job {
            WebhookJob::Stripe(session) => stripe_webhook::process(conn, session).await,
            WebhookJob::Razorpay(payment) => razorpay_webhook::process(conn, payment).await,
        };

        match result {
            Ok(()) => return,
            Err(err) => {
                tracing::error!(
                    error = %err,
                    attempt,
                    job = ?job,
                    "webhook job failed"
                );
                if attempt < MAX_ATTEMPTS {
                    sleep(Duration::from_millis(500 * attempt as u64)).await;
                }
            }
        }
    }
    tracing::error!(job = ?job, "webhook job dropped after {MAX_ATTEMPTS} attempts");
}

/// Shared completion step: append the provider event to the metadata log and
/// flip the purchase to completed. A unique-index conflict means another
/// completed purchase for the same (user, purchasable) already exists, which
/// is a lost race, not a retryable failure.
pub(crate) async fn mark_completed(
    conn: &OrmConn,
    purchase: purchases::Model,
    payment_id: Option<String>,
    source: &str,
    fields: Map<String, Value>,
) -> AppResult<()> {
    let purchase_id = purchase.id;
    let mut metadata = PurchaseMetadata::from_column(purchase.metadata.as_ref());
    metadata.record(source, fields);

    let mut active: purchases::ActiveModel = purchase.into();
    active.status = Set(PurchaseStatus::Completed.as_str().to_string());
    if let Some(payment_id) = payment_id {
        active.payment_id = Set(Some(payment_id));
    }
    active.metadata = Set(Some(metadata.to_column()));
    active.updated_at = Set(Utc::now().into());

    match active.update(conn).await {
        Ok(_) => Ok(()),
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                tracing::warn!(
                    purchase_id = %purchase_id,
                    "completed purchase already exists for this user and item"
                );
                Ok(())
            }
            _ => Err(err.into()),
        },
    }
}
