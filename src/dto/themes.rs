use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Theme;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateThemeRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateThemeRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ThemeList {
    pub items: Vec<Theme>,
}
