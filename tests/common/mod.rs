//! Shared setup for the DB-backed flow tests. Tests skip gracefully when no
//! database is configured in the environment.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

use axum_coursehub_api::{
    config::{AppConfig, PaymentConfig, RazorpayConfig, StorageConfig, StripeConfig},
    db::{create_orm_conn, create_pool, run_migrations},
    entity::{course_modules, courses, modules, themes, users},
    jobs::spawn_webhook_worker,
    middleware::auth::AuthUser,
    models::{PaymentProviderKind, Role},
    payments::{GatewayRegistry, mock::MockGateway},
    state::AppState,
    storage::LocalDisk,
};

pub const TEST_RAZORPAY_SECRET: &str = "rzp_test_secret";

pub async fn setup_state() -> anyhow::Result<Option<AppState>> {
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(None);
            }
        };

    let pool = create_pool(&database_url).await?;
    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    let attachment_root = std::env::temp_dir().join(format!("coursehub-test-{}", Uuid::new_v4()));

    let config = AppConfig {
        database_url,
        host: "127.0.0.1".into(),
        port: 0,
        payments: PaymentConfig {
            default_currency: "USD".into(),
            stripe: StripeConfig {
                secret_key: String::new(),
                webhook_secret: "whsec_test".into(),
                success_url: "http://localhost/purchases/success".into(),
                cancel_url: "http://localhost/purchases/cancel".into(),
            },
            razorpay: RazorpayConfig {
                key_id: "rzp_test_key".into(),
                key_secret: TEST_RAZORPAY_SECRET.into(),
                webhook_secret: "rzp_hook_secret".into(),
            },
        },
        storage: StorageConfig {
            attachment_root: attachment_root.to_string_lossy().into_owned(),
        },
    };

    let gateways = GatewayRegistry::with_gateways(
        Arc::new(MockGateway::new(PaymentProviderKind::Stripe)),
        Arc::new(MockGateway::new(PaymentProviderKind::Razorpay)),
    );
    let jobs = spawn_webhook_worker(orm.clone());
    let store = Arc::new(LocalDisk::new(attachment_root));

    Ok(Some(AppState {
        pool,
        orm,
        config: Arc::new(config),
        gateways,
        jobs,
        store,
    }))
}

pub async fn create_user(state: &AppState, role: Role) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    users::ActiveModel {
        id: Set(id),
        name: Set(format!("{} {}", role.as_str(), id.simple())),
        email: Set(format!("{}-{}@example.com", role.as_str(), id.simple())),
        password_hash: Set("not-a-real-hash".into()),
        role: Set(role.as_str().to_string()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser { user_id: id, role })
}

pub async fn create_theme(state: &AppState) -> anyhow::Result<themes::Model> {
    let theme = themes::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(format!("Theme {}", Uuid::new_v4().simple())),
        description: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(theme)
}

pub async fn create_course(
    state: &AppState,
    coach_id: Uuid,
    theme_id: Uuid,
    is_approved: bool,
    is_free: bool,
    price: Option<i64>,
) -> anyhow::Result<courses::Model> {
    let course = courses::ActiveModel {
        id: Set(Uuid::new_v4()),
        theme_id: Set(theme_id),
        coach_id: Set(coach_id),
        title: Set(format!("Course {}", Uuid::new_v4().simple())),
        description: Set("A course".into()),
        cover_image: Set(None),
        is_approved: Set(is_approved),
        is_free: Set(is_free),
        price: Set(price),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(course)
}

pub async fn create_module(
    state: &AppState,
    coach_id: Option<Uuid>,
    is_free: bool,
    price: Option<i64>,
) -> anyhow::Result<modules::Model> {
    let module = modules::ActiveModel {
        id: Set(Uuid::new_v4()),
        coach_id: Set(coach_id),
        title: Set(format!("Module {}", Uuid::new_v4().simple())),
        description: Set("A module".into()),
        difficulty: Set("easy".into()),
        video_url: Set(None),
        is_free: Set(is_free),
        price: Set(price),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(module)
}

pub async fn attach_module(
    state: &AppState,
    course_id: Uuid,
    module_id: Uuid,
    position: i32,
) -> anyhow::Result<()> {
    course_modules::ActiveModel {
        id: Set(Uuid::new_v4()),
        course_id: Set(course_id),
        module_id: Set(module_id),
        position: Set(position),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(())
}
