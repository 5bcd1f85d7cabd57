use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{PaymentProviderKind, Purchasable, Purchase, PurchasableKind};
use crate::payments::CheckoutPayload;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePurchaseRequest {
    #[serde(rename = "type")]
    pub kind: PurchasableKind,
    pub id: Uuid,
    pub payment_provider: PaymentProviderKind,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyRazorpayRequest {
    pub razorpay_payment_id: String,
    pub razorpay_order_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub purchase: Purchase,
    pub checkout: CheckoutPayload,
}

/// Compact purchasable summary embedded in purchase listings.
#[derive(Debug, Serialize, ToSchema)]
pub struct PurchasableSummary {
    pub kind: PurchasableKind,
    pub id: Uuid,
    pub title: String,
}

impl PurchasableSummary {
    pub fn from_purchasable(item: &Purchasable) -> Self {
        Self {
            kind: item.kind(),
            id: item.id(),
            title: item.title().to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseWithItem {
    pub purchase: Purchase,
    pub purchasable: Option<PurchasableSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseList {
    pub items: Vec<PurchaseWithItem>,
}
