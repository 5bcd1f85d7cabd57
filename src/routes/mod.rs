use axum::Router;

use crate::state::AppState;

pub mod attachments;
pub mod auth;
pub mod courses;
pub mod doc;
pub mod health;
pub mod modules;
pub mod params;
pub mod purchases;
pub mod themes;
pub mod webhooks;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/themes", themes::router())
        .nest("/courses", courses::router())
        .nest("/modules", modules::router())
        .nest("/attachments", attachments::router())
        .nest("/purchases", purchases::router())
}
