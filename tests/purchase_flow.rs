//! Purchase lifecycle: checkout creation, rejections, webhook-driven
//! completion and its idempotence, verification, cancellation, and the
//! course-module reorder and attachment-cascade operations around them.

mod common;

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use sha2::Sha256;
use uuid::Uuid;

use axum_coursehub_api::{
    dto::purchases::{CreatePurchaseRequest, VerifyRazorpayRequest},
    entity::{attachments, course_modules, purchases},
    error::AppError,
    jobs::{razorpay_webhook, stripe_webhook},
    models::{
        PaymentProviderKind, PurchasableKind, PurchaseMetadata, PurchaseStatus, Role,
    },
    payments::{CheckoutPayload, GatewayRegistry, mock::MockGateway},
    payments::razorpay::RazorpayPaymentEntity,
    payments::stripe::{SessionMetadata, StripeCheckoutSession},
    services::{course_service, module_service, purchase_service},
    state::AppState,
};
use common::{
    TEST_RAZORPAY_SECRET, create_course, create_module, create_theme, create_user, setup_state,
};

fn hmac_hex(secret: &str, message: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(message.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

async fn reload(state: &AppState, id: Uuid) -> anyhow::Result<purchases::Model> {
    Ok(purchases::Entity::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("purchase row"))
}

#[tokio::test]
async fn stripe_checkout_creates_pending_purchase_with_redirect() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let coach = create_user(&state, Role::Coach).await?;
    let student = create_user(&state, Role::Student).await?;
    let theme = create_theme(&state).await?;
    let course = create_course(&state, coach.user_id, theme.id, true, false, Some(9999)).await?;

    let resp = purchase_service::create_purchase(
        &state,
        &student,
        CreatePurchaseRequest {
            kind: PurchasableKind::Course,
            id: course.id,
            payment_provider: PaymentProviderKind::Stripe,
        },
    )
    .await?;

    let checkout = resp.data.expect("checkout response");
    assert_eq!(checkout.purchase.status, PurchaseStatus::Pending);
    assert_eq!(checkout.purchase.amount, 9999);

    let session_id = match &checkout.checkout {
        CheckoutPayload::Redirect { session_id, .. } => session_id.clone(),
        other => panic!("expected redirect payload, got {other:?}"),
    };

    let row = reload(&state, checkout.purchase.id).await?;
    assert_eq!(row.checkout_session_id.as_deref(), Some(session_id.as_str()));
    assert_eq!(row.status, "pending");
    Ok(())
}

#[tokio::test]
async fn free_and_already_purchased_content_is_rejected() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let coach = create_user(&state, Role::Coach).await?;
    let student = create_user(&state, Role::Student).await?;
    let theme = create_theme(&state).await?;

    let free_course = create_course(&state, coach.user_id, theme.id, true, true, None).await?;
    let err = purchase_service::create_purchase(
        &state,
        &student,
        CreatePurchaseRequest {
            kind: PurchasableKind::Course,
            id: free_course.id,
            payment_provider: PaymentProviderKind::Stripe,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains("free")));

    let paid_course =
        create_course(&state, coach.user_id, theme.id, true, false, Some(4900)).await?;
    purchases::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(student.user_id),
        purchasable_type: Set("course".into()),
        purchasable_id: Set(paid_course.id),
        amount: Set(4900),
        currency: Set("USD".into()),
        payment_provider: Set("stripe".into()),
        payment_id: Set(None),
        checkout_session_id: Set(None),
        status: Set("completed".into()),
        metadata: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let err = purchase_service::create_purchase(
        &state,
        &student,
        CreatePurchaseRequest {
            kind: PurchasableKind::Course,
            id: paid_course.id,
            payment_provider: PaymentProviderKind::Stripe,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains("already purchased")));

    // Nothing beyond the seeded completed purchase was inserted.
    let rows = purchases::Entity::find()
        .filter(purchases::Column::UserId.eq(student.user_id))
        .filter(purchases::Column::PurchasableId.eq(paid_course.id))
        .all(&state.orm)
        .await?;
    assert_eq!(rows.len(), 1);
    Ok(())
}

#[tokio::test]
async fn gateway_failure_marks_the_purchase_failed() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let failing = AppState {
        gateways: GatewayRegistry::with_gateways(
            Arc::new(MockGateway::failing(PaymentProviderKind::Stripe)),
            Arc::new(MockGateway::failing(PaymentProviderKind::Razorpay)),
        ),
        ..state.clone()
    };

    let coach = create_user(&failing, Role::Coach).await?;
    let student = create_user(&failing, Role::Student).await?;
    let theme = create_theme(&failing).await?;
    let course =
        create_course(&failing, coach.user_id, theme.id, true, false, Some(9999)).await?;

    let err = purchase_service::create_purchase(
        &failing,
        &student,
        CreatePurchaseRequest {
            kind: PurchasableKind::Course,
            id: course.id,
            payment_provider: PaymentProviderKind::Stripe,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::PaymentGateway(_)));

    // Never silently pending after a provider failure.
    let row = purchases::Entity::find()
        .filter(purchases::Column::UserId.eq(student.user_id))
        .one(&failing.orm)
        .await?
        .expect("purchase row");
    assert_eq!(row.status, "failed");
    Ok(())
}

#[tokio::test]
async fn stripe_webhook_completion_is_idempotent() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let coach = create_user(&state, Role::Coach).await?;
    let student = create_user(&state, Role::Student).await?;
    let theme = create_theme(&state).await?;
    let course = create_course(&state, coach.user_id, theme.id, true, false, Some(9999)).await?;

    let resp = purchase_service::create_purchase(
        &state,
        &student,
        CreatePurchaseRequest {
            kind: PurchasableKind::Course,
            id: course.id,
            payment_provider: PaymentProviderKind::Stripe,
        },
    )
    .await?;
    let purchase = resp.data.expect("checkout response").purchase;

    let session = StripeCheckoutSession {
        id: format!("cs_mock_{}", purchase.id.simple()),
        url: None,
        payment_status: Some("paid".into()),
        payment_intent: Some("pi_test_1".into()),
        customer: Some("cus_test_1".into()),
        metadata: SessionMetadata {
            purchase_id: Some(purchase.id.to_string()),
            user_id: Some(student.user_id.to_string()),
            purchasable_type: Some("course".into()),
            purchasable_id: Some(course.id.to_string()),
        },
    };

    stripe_webhook::process(&state.orm, &session).await?;
    let row = reload(&state, purchase.id).await?;
    assert_eq!(row.status, "completed");
    assert_eq!(row.payment_id.as_deref(), Some("pi_test_1"));
    let events_after_first = PurchaseMetadata::from_column(row.metadata.as_ref()).events.len();

    // Second delivery of the same event: no second transition, no metadata
    // corruption.
    stripe_webhook::process(&state.orm, &session).await?;
    let row = reload(&state, purchase.id).await?;
    assert_eq!(row.status, "completed");
    let metadata = PurchaseMetadata::from_column(row.metadata.as_ref());
    assert_eq!(metadata.events.len(), events_after_first);
    // The checkout artifact recorded at creation survived the completion.
    assert!(metadata.merged().contains_key("stripe_session_url"));
    Ok(())
}

#[tokio::test]
async fn razorpay_uncaptured_webhook_leaves_purchase_pending() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let coach = create_user(&state, Role::Coach).await?;
    let student = create_user(&state, Role::Student).await?;
    let theme = create_theme(&state).await?;
    let course = create_course(&state, coach.user_id, theme.id, true, false, Some(9999)).await?;

    let resp = purchase_service::create_purchase(
        &state,
        &student,
        CreatePurchaseRequest {
            kind: PurchasableKind::Course,
            id: course.id,
            payment_provider: PaymentProviderKind::Razorpay,
        },
    )
    .await?;
    let purchase = resp.data.expect("checkout response").purchase;
    let order_id = purchase.payment_id.clone().expect("order id");

    let authorized = RazorpayPaymentEntity {
        id: "pay_auth_1".into(),
        order_id: Some(order_id.clone()),
        status: "authorized".into(),
        amount: Some(9999),
        currency: Some("USD".into()),
        method: None,
        email: None,
    };
    razorpay_webhook::process(&state.orm, &authorized).await?;
    let row = reload(&state, purchase.id).await?;
    assert_eq!(row.status, "pending", "ambiguous webhook must not fail the purchase");

    // The capture that follows still completes it.
    let captured = RazorpayPaymentEntity {
        status: "captured".into(),
        ..authorized
    };
    razorpay_webhook::process(&state.orm, &captured).await?;
    let row = reload(&state, purchase.id).await?;
    assert_eq!(row.status, "completed");
    assert_eq!(row.payment_id.as_deref(), Some("pay_auth_1"));
    Ok(())
}

#[tokio::test]
async fn razorpay_verification_checks_the_signature() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let coach = create_user(&state, Role::Coach).await?;
    let student = create_user(&state, Role::Student).await?;
    let theme = create_theme(&state).await?;

    // Valid signature completes the purchase.
    let course = create_course(&state, coach.user_id, theme.id, true, false, Some(9999)).await?;
    let resp = purchase_service::create_purchase(
        &state,
        &student,
        CreatePurchaseRequest {
            kind: PurchasableKind::Course,
            id: course.id,
            payment_provider: PaymentProviderKind::Razorpay,
        },
    )
    .await?;
    let purchase = resp.data.expect("checkout response").purchase;
    let order_id = purchase.payment_id.clone().expect("order id");

    let signature = hmac_hex(TEST_RAZORPAY_SECRET, &format!("{order_id}|pay_ok_1"));
    purchase_service::verify_razorpay(
        &state,
        &student,
        purchase.id,
        VerifyRazorpayRequest {
            razorpay_payment_id: "pay_ok_1".into(),
            razorpay_order_id: order_id,
            razorpay_signature: signature,
        },
    )
    .await?;
    let row = reload(&state, purchase.id).await?;
    assert_eq!(row.status, "completed");
    assert_eq!(row.payment_id.as_deref(), Some("pay_ok_1"));

    // A bad signature fails the purchase and reports a verification error.
    let other = create_course(&state, coach.user_id, theme.id, true, false, Some(9999)).await?;
    let resp = purchase_service::create_purchase(
        &state,
        &student,
        CreatePurchaseRequest {
            kind: PurchasableKind::Course,
            id: other.id,
            payment_provider: PaymentProviderKind::Razorpay,
        },
    )
    .await?;
    let purchase = resp.data.expect("checkout response").purchase;
    let order_id = purchase.payment_id.clone().expect("order id");

    let err = purchase_service::verify_razorpay(
        &state,
        &student,
        purchase.id,
        VerifyRazorpayRequest {
            razorpay_payment_id: "pay_bad_1".into(),
            razorpay_order_id: order_id,
            razorpay_signature: "forged".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains("verification failed")));
    let row = reload(&state, purchase.id).await?;
    assert_eq!(row.status, "failed");
    Ok(())
}

#[tokio::test]
async fn cancel_applies_only_to_pending_purchases() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let coach = create_user(&state, Role::Coach).await?;
    let student = create_user(&state, Role::Student).await?;
    let theme = create_theme(&state).await?;
    let course = create_course(&state, coach.user_id, theme.id, true, false, Some(9999)).await?;

    let resp = purchase_service::create_purchase(
        &state,
        &student,
        CreatePurchaseRequest {
            kind: PurchasableKind::Course,
            id: course.id,
            payment_provider: PaymentProviderKind::Stripe,
        },
    )
    .await?;
    let purchase = resp.data.expect("checkout response").purchase;

    purchase_service::cancel_purchase(&state, &student, purchase.id).await?;
    let row = reload(&state, purchase.id).await?;
    assert_eq!(row.status, "cancelled");

    // Cancelling again is a no-op on a terminal purchase.
    purchase_service::cancel_purchase(&state, &student, purchase.id).await?;
    let row = reload(&state, purchase.id).await?;
    assert_eq!(row.status, "cancelled");
    Ok(())
}

#[tokio::test]
async fn module_resync_replaces_the_pivot_rows_in_order() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let admin = create_user(&state, Role::Admin).await?;
    let theme = create_theme(&state).await?;
    let course = create_course(&state, admin.user_id, theme.id, true, true, None).await?;

    let first = create_module(&state, None, true, None).await?;
    let second = create_module(&state, None, true, None).await?;
    let third = create_module(&state, None, true, None).await?;

    course_service::sync_modules(&state.orm, course.id, &[first.id, second.id, third.id]).await?;
    course_service::sync_modules(&state.orm, course.id, &[third.id, first.id]).await?;

    let rows = course_modules::Entity::find()
        .filter(course_modules::Column::CourseId.eq(course.id))
        .order_by_asc(course_modules::Column::Position)
        .all(&state.orm)
        .await?;

    let listed: Vec<(Uuid, i32)> = rows.iter().map(|r| (r.module_id, r.position)).collect();
    assert_eq!(listed, vec![(third.id, 1), (first.id, 2)]);
    Ok(())
}

#[tokio::test]
async fn module_delete_cascades_attachments_despite_missing_files() -> anyhow::Result<()> {
    let Some(state) = setup_state().await? else {
        return Ok(());
    };

    let admin = create_user(&state, Role::Admin).await?;
    let module = create_module(&state, None, true, None).await?;

    // Row whose stored object was never written (or already swept).
    let attachment = attachments::ActiveModel {
        id: Set(Uuid::new_v4()),
        module_id: Set(module.id),
        name: Set("Ghost tabs".into()),
        filename: Set("deadbeef.pdf".into()),
        disk: Set("private".into()),
        path: Set("attachments/deadbeef.pdf".into()),
        size: Set(1234),
        mime_type: Set("application/pdf".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    module_service::delete_module(&state, &admin, module.id).await?;

    let remaining = attachments::Entity::find_by_id(attachment.id)
        .one(&state.orm)
        .await?;
    assert!(remaining.is_none());
    Ok(())
}
