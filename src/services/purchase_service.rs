use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde_json::{Map, json};
use uuid::Uuid;

use crate::{
    access,
    audit::log_audit,
    dto::purchases::{
        CheckoutResponse, CreatePurchaseRequest, PurchasableSummary, PurchaseList,
        PurchaseWithItem, VerifyRazorpayRequest,
    },
    entity::{purchases, users},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{
        PaymentProviderKind, Purchasable, PurchasableKind, Purchase, PurchaseMetadata,
        PurchaseStatus,
    },
    payments::CheckoutPayload,
    policy,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub async fn list_purchases(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<PurchaseList>> {
    if !policy::purchase::view_any(user) {
        return Err(AppError::Forbidden);
    }

    let (page, limit, offset) = pagination.normalize();
    let finder = purchases::Entity::find()
        .filter(purchases::Column::UserId.eq(user.user_id))
        .order_by_desc(purchases::Column::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let rows = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(with_purchasable(state, row).await?);
    }

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Purchases",
        PurchaseList { items },
        Some(meta),
    ))
}

pub async fn get_purchase(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<PurchaseWithItem>> {
    let purchase = find_visible(state, user, id).await?;
    let item = with_purchasable(state, purchase).await?;
    Ok(ApiResponse::success("Purchase", item, Some(Meta::empty())))
}

/// Create a pending purchase and hand it to the selected payment gateway.
///
/// Free content and repeat purchases are rejected before anything is
/// inserted; a gateway failure flips the fresh purchase to failed rather
/// than leaving it silently pending.
pub async fn create_purchase(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePurchaseRequest,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    if !policy::purchase::create(user) {
        return Err(AppError::Forbidden);
    }

    let item = Purchasable::load(&state.orm, payload.kind, payload.id)
        .await?
        .ok_or(AppError::NotFound)?;

    if item.is_free() {
        return Err(AppError::BadRequest(
            "This content is free and does not require purchase.".into(),
        ));
    }

    let buyer = users::Entity::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    // Check-and-insert in one transaction. The partial unique index on
    // completed purchases closes the remaining race between two concurrent
    // creates that both complete later.
    let txn = state.orm.begin().await?;

    if access::has_purchased(&txn, user.user_id, item.kind(), item.id()).await? {
        return Err(AppError::BadRequest(
            "You have already purchased this content.".into(),
        ));
    }

    let purchase = purchases::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        purchasable_type: Set(item.kind().as_str().to_string()),
        purchasable_id: Set(item.id()),
        amount: Set(item.price_minor().unwrap_or(0)),
        currency: Set(state.config.payments.default_currency.clone()),
        payment_provider: Set(payload.payment_provider.as_str().to_string()),
        payment_id: Set(None),
        checkout_session_id: Set(None),
        status: Set(PurchaseStatus::Pending.as_str().to_string()),
        metadata: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    let gateway = state.gateways.get(payload.payment_provider);
    let checkout = match gateway.create_payment(&purchase, &item, &buyer).await {
        Ok(checkout) => checkout,
        Err(err) => {
            mark_failed(state, purchase).await;
            return Err(AppError::PaymentGateway(err.to_string()));
        }
    };

    // Persist the provider artifacts the completion paths correlate on.
    let mut metadata = PurchaseMetadata::from_column(purchase.metadata.as_ref());
    let mut active: purchases::ActiveModel = purchase.into();
    match &checkout {
        CheckoutPayload::Redirect {
            checkout_url,
            session_id,
        } => {
            active.checkout_session_id = Set(Some(session_id.clone()));
            let mut fields = Map::new();
            fields.insert("stripe_session_id".into(), json!(session_id));
            fields.insert("stripe_session_url".into(), json!(checkout_url));
            metadata.record("stripe", fields);
        }
        CheckoutPayload::Order {
            order_id,
            amount,
            currency,
            ..
        } => {
            active.payment_id = Set(Some(order_id.clone()));
            let mut fields = Map::new();
            fields.insert("razorpay_order_id".into(), json!(order_id));
            fields.insert("razorpay_order_amount".into(), json!(amount));
            fields.insert("razorpay_order_currency".into(), json!(currency));
            metadata.record("razorpay", fields);
        }
    }
    active.metadata = Set(Some(metadata.to_column()));
    active.updated_at = Set(Utc::now().into());
    let purchase = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "purchase_create",
        Some("purchases"),
        Some(json!({
            "purchase_id": purchase.id,
            "purchasable_type": purchase.purchasable_type,
            "purchasable_id": purchase.purchasable_id,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Purchase created",
        CheckoutResponse {
            purchase: purchase_from_entity(purchase)?,
            checkout,
        },
        Some(Meta::empty()),
    ))
}

/// Stripe redirect return: confirm against the provider if the session id
/// matches what we stored at checkout creation. The webhook stays the
/// authoritative backstop; this only shortens the wait.
pub async fn confirm_stripe(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    session_id: &str,
) -> AppResult<ApiResponse<PurchaseWithItem>> {
    let purchase = find_visible(state, user, id).await?;

    if purchase.payment_provider != PaymentProviderKind::Stripe.as_str() {
        return Err(AppError::BadRequest(
            "Purchase was not made through Stripe".into(),
        ));
    }

    let already_completed = purchase.status == PurchaseStatus::Completed.as_str();
    let session_matches = purchase.checkout_session_id.as_deref() == Some(session_id);

    let purchase = if !already_completed && session_matches {
        let gateway = state.gateways.get(PaymentProviderKind::Stripe);
        match gateway.retrieve_payment(session_id).await {
            Ok(remote) if remote.paid => {
                let mut metadata = PurchaseMetadata::from_column(purchase.metadata.as_ref());
                let mut fields = Map::new();
                fields.insert("stripe_session_id".into(), json!(session_id));
                fields.insert("stripe_payment_status".into(), json!(remote.raw_status));
                metadata.record("stripe", fields);

                let mut active: purchases::ActiveModel = purchase.into();
                active.status = Set(PurchaseStatus::Completed.as_str().to_string());
                active.metadata = Set(Some(metadata.to_column()));
                active.updated_at = Set(Utc::now().into());
                active.update(&state.orm).await?
            }
            Ok(_) => purchase,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    purchase_id = %purchase.id,
                    "Stripe session confirmation failed, webhook will settle it"
                );
                purchase
            }
        }
    } else {
        purchase
    };

    let item = with_purchasable(state, purchase).await?;
    Ok(ApiResponse::success("Purchase", item, Some(Meta::empty())))
}

/// Razorpay client-side completion: validate the widget's signature against
/// the stored order, then complete. An invalid signature is an explicit
/// failure, unlike an ambiguous webhook.
pub async fn verify_razorpay(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: VerifyRazorpayRequest,
) -> AppResult<ApiResponse<PurchaseWithItem>> {
    let purchase = find_visible(state, user, id).await?;

    if purchase.payment_provider != PaymentProviderKind::Razorpay.as_str() {
        return Err(AppError::BadRequest(
            "Purchase was not made through Razorpay".into(),
        ));
    }

    if purchase.status == PurchaseStatus::Completed.as_str() {
        let item = with_purchasable(state, purchase).await?;
        return Ok(ApiResponse::success("Purchase", item, Some(Meta::empty())));
    }

    let order_matches = purchase.payment_id.as_deref() == Some(payload.razorpay_order_id.as_str());
    let signature_valid = crate::payments::razorpay::verify_payment_signature(
        &state.config.payments.razorpay.key_secret,
        &payload.razorpay_order_id,
        &payload.razorpay_payment_id,
        &payload.razorpay_signature,
    );

    if !order_matches || !signature_valid {
        mark_failed(state, purchase).await;
        return Err(AppError::BadRequest("Payment verification failed.".into()));
    }

    let mut metadata = PurchaseMetadata::from_column(purchase.metadata.as_ref());
    let mut fields = Map::new();
    fields.insert(
        "razorpay_payment_id".into(),
        json!(payload.razorpay_payment_id),
    );
    fields.insert(
        "razorpay_signature".into(),
        json!(payload.razorpay_signature),
    );
    metadata.record("razorpay", fields);

    let mut active: purchases::ActiveModel = purchase.into();
    active.status = Set(PurchaseStatus::Completed.as_str().to_string());
    active.payment_id = Set(Some(payload.razorpay_payment_id.clone()));
    active.metadata = Set(Some(metadata.to_column()));
    active.updated_at = Set(Utc::now().into());

    let purchase = match active.update(&state.orm).await {
        Ok(purchase) => purchase,
        Err(err) => match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                return Err(AppError::BadRequest(
                    "You have already purchased this content.".into(),
                ));
            }
            _ => return Err(err.into()),
        },
    };

    let item = with_purchasable(state, purchase).await?;
    Ok(ApiResponse::success(
        "Payment verified",
        item,
        Some(Meta::empty()),
    ))
}

/// Abandon a checkout. Only a pending purchase can be cancelled; terminal
/// purchases are returned unchanged.
pub async fn cancel_purchase(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<PurchaseWithItem>> {
    let purchase = find_visible(state, user, id).await?;

    let purchase = if purchase.status == PurchaseStatus::Pending.as_str() {
        let mut active: purchases::ActiveModel = purchase.into();
        active.status = Set(PurchaseStatus::Cancelled.as_str().to_string());
        active.updated_at = Set(Utc::now().into());
        active.update(&state.orm).await?
    } else {
        purchase
    };

    let item = with_purchasable(state, purchase).await?;
    Ok(ApiResponse::success(
        "Purchase cancelled",
        item,
        Some(Meta::empty()),
    ))
}

async fn find_visible(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<purchases::Model> {
    let purchase = purchases::Entity::find_by_id(id).one(&state.orm).await?;
    let purchase = match purchase {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };
    if !policy::purchase::view(user, &purchase) {
        return Err(AppError::Forbidden);
    }
    Ok(purchase)
}

async fn mark_failed(state: &AppState, purchase: purchases::Model) {
    let purchase_id = purchase.id;
    let mut active: purchases::ActiveModel = purchase.into();
    active.status = Set(PurchaseStatus::Failed.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    if let Err(err) = active.update(&state.orm).await {
        tracing::error!(
            error = %err,
            purchase_id = %purchase_id,
            "failed to mark purchase as failed"
        );
    }
}

async fn with_purchasable(
    state: &AppState,
    purchase: purchases::Model,
) -> AppResult<PurchaseWithItem> {
    let kind = PurchasableKind::parse(&purchase.purchasable_type);
    let purchasable = match kind {
        Some(kind) => Purchasable::load(&state.orm, kind, purchase.purchasable_id)
            .await?
            .as_ref()
            .map(PurchasableSummary::from_purchasable),
        None => None,
    };
    Ok(PurchaseWithItem {
        purchase: purchase_from_entity(purchase)?,
        purchasable,
    })
}

pub(crate) fn purchase_from_entity(model: purchases::Model) -> AppResult<Purchase> {
    let purchasable_type = PurchasableKind::parse(&model.purchasable_type).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "unknown purchasable type {}",
            model.purchasable_type
        ))
    })?;
    let payment_provider = PaymentProviderKind::parse(&model.payment_provider).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "unknown payment provider {}",
            model.payment_provider
        ))
    })?;
    let status = PurchaseStatus::parse(&model.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!("unknown purchase status {}", model.status))
    })?;

    let metadata = PurchaseMetadata::from_column(model.metadata.as_ref());

    Ok(Purchase {
        id: model.id,
        user_id: model.user_id,
        purchasable_type,
        purchasable_id: model.purchasable_id,
        amount: model.amount,
        currency: model.currency,
        payment_provider,
        payment_id: model.payment_id,
        checkout_session_id: model.checkout_session_id,
        status,
        metadata: serde_json::Value::Object(metadata.merged()),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}
