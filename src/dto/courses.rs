use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Course, Module};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCourseRequest {
    pub theme_id: Uuid,
    pub title: String,
    pub description: String,
    pub cover_image: Option<String>,
    /// Price in minor units; absent or non-positive means free.
    pub price: Option<i64>,
    #[serde(default)]
    pub is_free: bool,
    /// Admin only: modules to attach, ordered by list index.
    pub module_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCourseRequest {
    pub theme_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub price: Option<i64>,
    pub is_free: Option<bool>,
    /// Admin only: full replacement of the module list, ordered by index.
    pub module_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CourseList {
    pub items: Vec<Course>,
}

/// A module as it appears inside a course, with its position and the
/// caller's entitlement verdict.
#[derive(Debug, Serialize, ToSchema)]
pub struct CourseModuleView {
    pub module: Module,
    pub position: i32,
    pub can_access: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CourseDetail {
    pub course: Course,
    pub can_access: bool,
    pub modules: Vec<CourseModuleView>,
}
