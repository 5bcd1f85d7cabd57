use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::purchases::{
        CheckoutResponse, CreatePurchaseRequest, PurchaseList, PurchaseWithItem,
        VerifyRazorpayRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::Pagination,
    services::purchase_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_purchases).post(create_purchase))
        .route("/{id}", get(get_purchase))
        .route("/{id}/success", get(purchase_success))
        .route("/{id}/verify-razorpay", post(verify_razorpay))
        .route("/{id}/cancel", post(cancel_purchase))
}

#[utoipa::path(get, path = "/api/purchases", tag = "Purchases")]
pub async fn list_purchases(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<PurchaseList>>> {
    let resp = purchase_service::list_purchases(&state, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/purchases",
    request_body = CreatePurchaseRequest,
    tag = "Purchases"
)]
pub async fn create_purchase(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePurchaseRequest>,
) -> AppResult<Json<ApiResponse<CheckoutResponse>>> {
    let resp = purchase_service::create_purchase(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(get, path = "/api/purchases/{id}", tag = "Purchases")]
pub async fn get_purchase(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PurchaseWithItem>>> {
    let resp = purchase_service::get_purchase(&state, &user, id).await?;
    Ok(Json(resp))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StripeSuccessQuery {
    pub session_id: Option<String>,
}

/// Stripe redirect return. Confirms the session against the provider when
/// the id matches; the webhook remains the source of truth.
#[utoipa::path(get, path = "/api/purchases/{id}/success", tag = "Purchases")]
pub async fn purchase_success(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<StripeSuccessQuery>,
) -> AppResult<Json<ApiResponse<PurchaseWithItem>>> {
    let resp = match query.session_id {
        Some(session_id) => {
            purchase_service::confirm_stripe(&state, &user, id, &session_id).await?
        }
        None => purchase_service::get_purchase(&state, &user, id).await?,
    };
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/purchases/{id}/verify-razorpay",
    request_body = VerifyRazorpayRequest,
    tag = "Purchases"
)]
pub async fn verify_razorpay(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<VerifyRazorpayRequest>,
) -> AppResult<Json<ApiResponse<PurchaseWithItem>>> {
    let resp = purchase_service::verify_razorpay(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(post, path = "/api/purchases/{id}/cancel", tag = "Purchases")]
pub async fn cancel_purchase(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PurchaseWithItem>>> {
    let resp = purchase_service::cancel_purchase(&state, &user, id).await?;
    Ok(Json(resp))
}
