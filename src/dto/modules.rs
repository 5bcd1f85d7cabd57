use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Attachment, Difficulty, Module};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateModuleRequest {
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub video_url: Option<String>,
    /// Price in minor units; absent or non-positive means free.
    pub price: Option<i64>,
    #[serde(default)]
    pub is_free: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateModuleRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub video_url: Option<String>,
    pub price: Option<i64>,
    pub is_free: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModuleList {
    pub items: Vec<Module>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ModuleDetail {
    pub module: Module,
    pub attachments: Vec<Attachment>,
    pub can_access: bool,
}

/// A module opened in the context of one course, with sequential navigation
/// over the course's ordered module list.
#[derive(Debug, Serialize, ToSchema)]
pub struct ModuleInCourse {
    pub course_id: Uuid,
    pub module: Module,
    pub attachments: Vec<Attachment>,
    pub can_access_course: bool,
    pub can_access_module: bool,
    pub previous_module_id: Option<Uuid>,
    pub next_module_id: Option<Uuid>,
}
