use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        attachments::{AttachmentList, UpdateAttachmentRequest},
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        courses::{CourseDetail, CourseList, CourseModuleView, CreateCourseRequest,
            UpdateCourseRequest},
        modules::{CreateModuleRequest, ModuleDetail, ModuleInCourse, ModuleList,
            UpdateModuleRequest},
        purchases::{CheckoutResponse, CreatePurchaseRequest, PurchasableSummary, PurchaseList,
            PurchaseWithItem, VerifyRazorpayRequest},
        themes::{CreateThemeRequest, ThemeList, UpdateThemeRequest},
    },
    models::{
        Attachment, Course, Difficulty, Module, PaymentProviderKind, Purchase, PurchasableKind,
        PurchaseStatus, Role, Theme, User,
    },
    payments::CheckoutPayload,
    response::{ApiResponse, Meta},
    routes::{
        attachments, auth, courses, health, modules, params, purchases, themes, webhooks,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        themes::list_themes,
        themes::get_theme,
        themes::create_theme,
        themes::update_theme,
        themes::delete_theme,
        courses::list_courses,
        courses::approval_queue,
        courses::get_course,
        courses::create_course,
        courses::update_course,
        courses::delete_course,
        courses::approve_course,
        courses::get_module_in_course,
        modules::list_modules,
        modules::get_module,
        modules::create_module,
        modules::update_module,
        modules::delete_module,
        attachments::upload_attachment,
        attachments::update_attachment,
        attachments::delete_attachment,
        attachments::download_attachment,
        purchases::list_purchases,
        purchases::create_purchase,
        purchases::get_purchase,
        purchases::purchase_success,
        purchases::verify_razorpay,
        purchases::cancel_purchase,
        webhooks::stripe_webhook,
        webhooks::razorpay_webhook
    ),
    components(
        schemas(
            User,
            Theme,
            Course,
            Module,
            Attachment,
            Purchase,
            Role,
            Difficulty,
            PurchasableKind,
            PaymentProviderKind,
            PurchaseStatus,
            CheckoutPayload,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            CreateThemeRequest,
            UpdateThemeRequest,
            ThemeList,
            CreateCourseRequest,
            UpdateCourseRequest,
            CourseList,
            CourseDetail,
            CourseModuleView,
            CreateModuleRequest,
            UpdateModuleRequest,
            ModuleList,
            ModuleDetail,
            ModuleInCourse,
            UpdateAttachmentRequest,
            AttachmentList,
            CreatePurchaseRequest,
            VerifyRazorpayRequest,
            CheckoutResponse,
            PurchasableSummary,
            PurchaseWithItem,
            PurchaseList,
            purchases::StripeSuccessQuery,
            params::Pagination,
            params::CourseQuery,
            params::ModuleQuery,
            Meta,
            ApiResponse<Theme>,
            ApiResponse<CourseDetail>,
            ApiResponse<ModuleDetail>,
            ApiResponse<CheckoutResponse>,
            ApiResponse<PurchaseList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Themes", description = "Theme endpoints"),
        (name = "Courses", description = "Course endpoints"),
        (name = "Modules", description = "Module endpoints"),
        (name = "Attachments", description = "Attachment endpoints"),
        (name = "Purchases", description = "Purchase endpoints"),
        (name = "Webhooks", description = "Payment provider webhooks"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
