use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::themes::{CreateThemeRequest, ThemeList, UpdateThemeRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Theme,
    response::ApiResponse,
    routes::params::Pagination,
    services::theme_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_themes).post(create_theme))
        .route(
            "/{id}",
            get(get_theme).put(update_theme).delete(delete_theme),
        )
}

#[utoipa::path(get, path = "/api/themes", tag = "Themes")]
pub async fn list_themes(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ThemeList>>> {
    let resp = theme_service::list_themes(&state, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(get, path = "/api/themes/{id}", tag = "Themes")]
pub async fn get_theme(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Theme>>> {
    let resp = theme_service::get_theme(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/themes",
    request_body = CreateThemeRequest,
    tag = "Themes"
)]
pub async fn create_theme(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateThemeRequest>,
) -> AppResult<Json<ApiResponse<Theme>>> {
    let resp = theme_service::create_theme(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/themes/{id}",
    request_body = UpdateThemeRequest,
    tag = "Themes"
)]
pub async fn update_theme(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateThemeRequest>,
) -> AppResult<Json<ApiResponse<Theme>>> {
    let resp = theme_service::update_theme(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(delete, path = "/api/themes/{id}", tag = "Themes")]
pub async fn delete_theme(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = theme_service::delete_theme(&state, &user, id).await?;
    Ok(Json(resp))
}
