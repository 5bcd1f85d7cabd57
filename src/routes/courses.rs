use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::courses::{CourseDetail, CourseList, CreateCourseRequest, UpdateCourseRequest},
    dto::modules::ModuleInCourse,
    error::AppResult,
    middleware::auth::{AuthUser, MaybeUser},
    models::Course,
    response::ApiResponse,
    routes::params::{CourseQuery, Pagination},
    services::{course_service, module_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_courses).post(create_course))
        .route("/approval-queue", get(approval_queue))
        .route(
            "/{id}",
            get(get_course).put(update_course).delete(delete_course),
        )
        .route("/{id}/approve", post(approve_course))
        .route("/{id}/modules/{module_id}", get(get_module_in_course))
}

#[utoipa::path(get, path = "/api/courses", tag = "Courses")]
pub async fn list_courses(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<CourseQuery>,
) -> AppResult<Json<ApiResponse<CourseList>>> {
    let resp = course_service::list_courses(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(get, path = "/api/courses/approval-queue", tag = "Courses")]
pub async fn approval_queue(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<CourseList>>> {
    let resp = course_service::approval_queue(&state, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(get, path = "/api/courses/{id}", tag = "Courses")]
pub async fn get_course(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CourseDetail>>> {
    let resp = course_service::get_course(&state, user.as_ref(), id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/courses",
    request_body = CreateCourseRequest,
    tag = "Courses"
)]
pub async fn create_course(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateCourseRequest>,
) -> AppResult<Json<ApiResponse<Course>>> {
    let resp = course_service::create_course(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/courses/{id}",
    request_body = UpdateCourseRequest,
    tag = "Courses"
)]
pub async fn update_course(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCourseRequest>,
) -> AppResult<Json<ApiResponse<Course>>> {
    let resp = course_service::update_course(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(delete, path = "/api/courses/{id}", tag = "Courses")]
pub async fn delete_course(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = course_service::delete_course(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(post, path = "/api/courses/{id}/approve", tag = "Courses")]
pub async fn approve_course(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Course>>> {
    let resp = course_service::approve_course(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/courses/{id}/modules/{module_id}",
    tag = "Courses"
)]
pub async fn get_module_in_course(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path((id, module_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<ModuleInCourse>>> {
    let resp =
        module_service::get_module_in_course(&state, user.as_ref(), id, module_id).await?;
    Ok(Json(resp))
}
