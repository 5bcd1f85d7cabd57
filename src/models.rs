use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::OrmConn;
use crate::entity::{courses, modules};
use crate::error::AppResult;

/// Actor role. Rules in the policy layer match on this exhaustively, so a new
/// role forces a review of every rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Coach,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Coach => "coach",
            Role::Student => "student",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "coach" => Some(Role::Coach),
            "student" => Some(Role::Student),
            _ => None,
        }
    }
}

/// The two entity kinds that can be bought, as a tag dispatched on explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PurchasableKind {
    Course,
    Module,
}

impl PurchasableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchasableKind::Course => "course",
            PurchasableKind::Module => "module",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "course" => Some(PurchasableKind::Course),
            "module" => Some(PurchasableKind::Module),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProviderKind {
    Stripe,
    Razorpay,
}

impl PaymentProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProviderKind::Stripe => "stripe",
            PaymentProviderKind::Razorpay => "razorpay",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stripe" => Some(PaymentProviderKind::Stripe),
            "razorpay" => Some(PaymentProviderKind::Razorpay),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Completed => "completed",
            PurchaseStatus::Failed => "failed",
            PurchaseStatus::Cancelled => "cancelled",
            PurchaseStatus::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(PurchaseStatus::Pending),
            "completed" => Some(PurchaseStatus::Completed),
            "failed" => Some(PurchaseStatus::Failed),
            "cancelled" => Some(PurchaseStatus::Cancelled),
            "refunded" => Some(PurchaseStatus::Refunded),
            _ => None,
        }
    }

    /// Only pending purchases may transition; a retry creates a new purchase.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PurchaseStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// Pricing rules shared by courses and modules. A nullable or non-positive
/// price means free regardless of the flag.
pub trait Pricing {
    fn free_flag(&self) -> bool;
    fn price_minor(&self) -> Option<i64>;

    fn is_free(&self) -> bool {
        self.free_flag() || self.price_minor().is_none_or(|p| p <= 0)
    }
}

impl Pricing for courses::Model {
    fn free_flag(&self) -> bool {
        self.is_free
    }

    fn price_minor(&self) -> Option<i64> {
        self.price
    }
}

impl Pricing for modules::Model {
    fn free_flag(&self) -> bool {
        self.is_free
    }

    fn price_minor(&self) -> Option<i64> {
        self.price
    }
}

/// A loaded purchasable record behind one tag.
#[derive(Debug, Clone)]
pub enum Purchasable {
    Course(courses::Model),
    Module(modules::Model),
}

impl Purchasable {
    pub async fn load(
        conn: &OrmConn,
        kind: PurchasableKind,
        id: Uuid,
    ) -> AppResult<Option<Purchasable>> {
        let item = match kind {
            PurchasableKind::Course => courses::Entity::find()
                .filter(courses::Column::Id.eq(id))
                .one(conn)
                .await?
                .map(Purchasable::Course),
            PurchasableKind::Module => modules::Entity::find()
                .filter(modules::Column::Id.eq(id))
                .one(conn)
                .await?
                .map(Purchasable::Module),
        };
        Ok(item)
    }

    pub fn kind(&self) -> PurchasableKind {
        match self {
            Purchasable::Course(_) => PurchasableKind::Course,
            Purchasable::Module(_) => PurchasableKind::Module,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Purchasable::Course(c) => c.id,
            Purchasable::Module(m) => m.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Purchasable::Course(c) => &c.title,
            Purchasable::Module(m) => &m.title,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Purchasable::Course(c) => &c.description,
            Purchasable::Module(m) => &m.description,
        }
    }

    pub fn price_minor(&self) -> Option<i64> {
        match self {
            Purchasable::Course(c) => c.price,
            Purchasable::Module(m) => m.price,
        }
    }

    pub fn is_free(&self) -> bool {
        match self {
            Purchasable::Course(c) => Pricing::is_free(c),
            Purchasable::Module(m) => Pricing::is_free(m),
        }
    }
}

/// Append-only log of provider events backing the purchase metadata column.
/// Webhook deliveries and checkout artifacts are appended, never merged in
/// place, so concurrent deliveries cannot clobber earlier fields. The API
/// exposes the folded view.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PurchaseMetadata {
    pub events: Vec<ProviderEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderEvent {
    pub source: String,
    pub recorded_at: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

impl PurchaseMetadata {
    pub fn from_column(value: Option<&Value>) -> Self {
        match value {
            None => Self::default(),
            Some(value) => {
                if let Ok(parsed) = serde_json::from_value::<PurchaseMetadata>(value.clone()) {
                    return parsed;
                }
                // A flat object from before the event log existed becomes the
                // first event rather than being dropped.
                match value {
                    Value::Object(fields) => Self {
                        events: vec![ProviderEvent {
                            source: "legacy".to_string(),
                            recorded_at: Utc::now(),
                            fields: fields.clone(),
                        }],
                    },
                    _ => Self::default(),
                }
            }
        }
    }

    pub fn record(&mut self, source: &str, fields: Map<String, Value>) {
        self.events.push(ProviderEvent {
            source: source.to_string(),
            recorded_at: Utc::now(),
            fields,
        });
    }

    /// Fold the event log into one object. Later events win per key; earlier
    /// values stay reachable through the raw log.
    pub fn merged(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        for event in &self.events {
            for (key, value) in &event.fields {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }

    pub fn to_column(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Theme {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Course {
    pub id: Uuid,
    pub theme_id: Uuid,
    pub coach_id: Uuid,
    pub title: String,
    pub description: String,
    pub cover_image: Option<String>,
    pub is_approved: bool,
    pub is_free: bool,
    pub price: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Module {
    pub id: Uuid,
    pub coach_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub video_url: Option<String>,
    pub is_free: bool,
    pub price: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub id: Uuid,
    pub module_id: Uuid,
    pub name: String,
    pub filename: String,
    pub disk: String,
    pub path: String,
    pub size: i64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub purchasable_type: PurchasableKind,
    pub purchasable_id: Uuid,
    pub amount: i64,
    pub currency: String,
    pub payment_provider: PaymentProviderKind,
    pub payment_id: Option<String>,
    pub checkout_session_id: Option<String>,
    pub status: PurchaseStatus,
    /// Folded view of the provider event log.
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn course(is_free: bool, price: Option<i64>) -> courses::Model {
        courses::Model {
            id: Uuid::new_v4(),
            theme_id: Uuid::new_v4(),
            coach_id: Uuid::new_v4(),
            title: "Blues Basics".into(),
            description: "Twelve bars".into(),
            cover_image: None,
            is_approved: true,
            is_free,
            price,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn priced_course_is_not_free() {
        assert!(!Pricing::is_free(&course(false, Some(9999))));
    }

    #[test]
    fn null_or_non_positive_price_means_free() {
        assert!(Pricing::is_free(&course(false, None)));
        assert!(Pricing::is_free(&course(false, Some(0))));
        assert!(Pricing::is_free(&course(false, Some(-5))));
    }

    #[test]
    fn free_flag_wins_over_price() {
        assert!(Pricing::is_free(&course(true, Some(9999))));
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!PurchaseStatus::Pending.is_terminal());
        assert!(PurchaseStatus::Completed.is_terminal());
        assert!(PurchaseStatus::Failed.is_terminal());
        assert!(PurchaseStatus::Cancelled.is_terminal());
        assert!(PurchaseStatus::Refunded.is_terminal());
    }

    #[test]
    fn metadata_appends_instead_of_overwriting() {
        let mut metadata = PurchaseMetadata::default();
        let mut first = Map::new();
        first.insert("stripe_session_url".into(), json!("https://checkout/a"));
        metadata.record("stripe", first);

        let mut second = Map::new();
        second.insert("stripe_payment_intent".into(), json!("pi_123"));
        second.insert("stripe_session_url".into(), json!("https://checkout/b"));
        metadata.record("stripe", second);

        assert_eq!(metadata.events.len(), 2);
        let merged = metadata.merged();
        assert_eq!(merged["stripe_payment_intent"], json!("pi_123"));
        // Later event wins in the folded view, earlier value kept in the log.
        assert_eq!(merged["stripe_session_url"], json!("https://checkout/b"));
        assert_eq!(
            metadata.events[0].fields["stripe_session_url"],
            json!("https://checkout/a")
        );
    }

    #[test]
    fn metadata_round_trips_through_column() {
        let mut metadata = PurchaseMetadata::default();
        let mut fields = Map::new();
        fields.insert("razorpay_order_id".into(), json!("order_9"));
        metadata.record("razorpay", fields);

        let column = metadata.to_column();
        let reloaded = PurchaseMetadata::from_column(Some(&column));
        assert_eq!(reloaded, metadata);
    }

    #[test]
    fn flat_legacy_metadata_becomes_first_event() {
        let legacy = json!({"stripe_customer": "cus_1"});
        let metadata = PurchaseMetadata::from_column(Some(&legacy));
        assert_eq!(metadata.events.len(), 1);
        assert_eq!(metadata.merged()["stripe_customer"], json!("cus_1"));
    }
}
