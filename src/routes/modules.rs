use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::modules::{CreateModuleRequest, ModuleDetail, ModuleList, UpdateModuleRequest},
    error::AppResult,
    middleware::auth::{AuthUser, MaybeUser},
    models::Module,
    response::ApiResponse,
    routes::params::ModuleQuery,
    services::module_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_modules).post(create_module))
        .route(
            "/{id}",
            get(get_module).put(update_module).delete(delete_module),
        )
}

#[utoipa::path(get, path = "/api/modules", tag = "Modules")]
pub async fn list_modules(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<ModuleQuery>,
) -> AppResult<Json<ApiResponse<ModuleList>>> {
    let resp = module_service::list_modules(&state, user.as_ref(), query).await?;
    Ok(Json(resp))
}

#[utoipa::path(get, path = "/api/modules/{id}", tag = "Modules")]
pub async fn get_module(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ModuleDetail>>> {
    let resp = module_service::get_module(&state, user.as_ref(), id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/modules",
    request_body = CreateModuleRequest,
    tag = "Modules"
)]
pub async fn create_module(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateModuleRequest>,
) -> AppResult<Json<ApiResponse<Module>>> {
    let resp = module_service::create_module(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/modules/{id}",
    request_body = UpdateModuleRequest,
    tag = "Modules"
)]
pub async fn update_module(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateModuleRequest>,
) -> AppResult<Json<ApiResponse<Module>>> {
    let resp = module_service::update_module(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(delete, path = "/api/modules/{id}", tag = "Modules")]
pub async fn delete_module(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = module_service::delete_module(&state, &user, id).await?;
    Ok(Json(resp))
}
