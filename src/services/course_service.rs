use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::courses::{
        CourseDetail, CourseList, CourseModuleView, CreateCourseRequest, UpdateCourseRequest,
    },
    entity::{course_modules, courses, modules, themes},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Course, Purchasable, Role},
    policy,
    response::{ApiResponse, Meta},
    routes::params::{CourseQuery, SortOrder},
    services::module_service::{entitled, module_from_entity},
    state::AppState,
};

pub async fn list_courses(
    state: &AppState,
    user: &AuthUser,
    query: CourseQuery,
) -> AppResult<ApiResponse<CourseList>> {
    if !policy::course::view_any(user) {
        return Err(AppError::Forbidden);
    }

    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.search.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(Expr::col(courses::Column::Title).ilike(pattern));
    }

    // Students browse the approved catalogue; coaches manage their own
    // courses; admins see everything.
    condition = match user.role {
        Role::Admin => condition,
        Role::Coach => condition.add(courses::Column::CoachId.eq(user.user_id)),
        Role::Student => condition.add(courses::Column::IsApproved.eq(true)),
    };

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let mut finder = courses::Entity::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(courses::Column::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(courses::Column::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(course_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Courses", CourseList { items }, Some(meta)))
}

pub async fn get_course(
    state: &AppState,
    user: Option<&AuthUser>,
    id: Uuid,
) -> AppResult<ApiResponse<CourseDetail>> {
    let course = courses::Entity::find_by_id(id).one(&state.orm).await?;
    let course = match course {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    if !policy::course::view(user, &course) {
        return Err(AppError::Forbidden);
    }

    let can_access = entitled(state, user, &Purchasable::Course(course.clone())).await?;

    let ordered = course_modules::Entity::find()
        .filter(course_modules::Column::CourseId.eq(course.id))
        .order_by_asc(course_modules::Column::Position)
        .all(&state.orm)
        .await?;

    let module_ids: Vec<Uuid> = ordered.iter().map(|row| row.module_id).collect();
    let mut loaded: HashMap<Uuid, modules::Model> = modules::Entity::find()
        .filter(modules::Column::Id.is_in(module_ids))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();

    let mut views = Vec::with_capacity(ordered.len());
    for row in &ordered {
        let Some(module) = loaded.remove(&row.module_id) else {
            continue;
        };
        let can_access =
            entitled(state, user, &Purchasable::Module(module.clone())).await?;
        views.push(CourseModuleView {
            module: module_from_entity(module),
            position: row.position,
            can_access,
        });
    }

    let detail = CourseDetail {
        course: course_from_entity(course),
        can_access,
        modules: views,
    };
    Ok(ApiResponse::success("Course", detail, Some(Meta::empty())))
}

pub async fn create_course(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCourseRequest,
) -> AppResult<ApiResponse<Course>> {
    if !policy::course::create(user) {
        return Err(AppError::Forbidden);
    }

    let theme = themes::Entity::find_by_id(payload.theme_id)
        .one(&state.orm)
        .await?;
    if theme.is_none() {
        return Err(AppError::BadRequest("Theme not found".into()));
    }

    let txn = state.orm.begin().await?;

    let course = courses::ActiveModel {
        id: Set(Uuid::new_v4()),
        theme_id: Set(payload.theme_id),
        coach_id: Set(user.user_id),
        title: Set(payload.title),
        description: Set(payload.description),
        cover_image: Set(payload.cover_image),
        is_approved: Set(false),
        is_free: Set(payload.is_free),
        price: Set(payload.price),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    // Only admins assemble the module list.
    if user.role == Role::Admin {
        if let Some(module_ids) = payload.module_ids {
            sync_modules(&txn, course.id, &module_ids).await?;
        }
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "course_create",
        Some("courses"),
        Some(serde_json::json!({ "course_id": course.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Course created",
        course_from_entity(course),
        Some(Meta::empty()),
    ))
}

pub async fn update_course(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCourseRequest,
) -> AppResult<ApiResponse<Course>> {
    let existing = courses::Entity::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    if !policy::course::update(user, &existing) {
        return Err(AppError::Forbidden);
    }

    if let Some(theme_id) = payload.theme_id {
        let theme = themes::Entity::find_by_id(theme_id).one(&state.orm).await?;
        if theme.is_none() {
            return Err(AppError::BadRequest("Theme not found".into()));
        }
    }

    let txn = state.orm.begin().await?;

    let mut active: courses::ActiveModel = existing.into();
    if let Some(theme_id) = payload.theme_id {
        active.theme_id = Set(theme_id);
    }
    if let Some(title) = payload.title {
        active.title = Set(title);
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(cover_image) = payload.cover_image {
        active.cover_image = Set(Some(cover_image));
    }
    if let Some(price) = payload.price {
        active.price = Set(Some(price));
    }
    if let Some(is_free) = payload.is_free {
        active.is_free = Set(is_free);
    }
    active.updated_at = Set(Utc::now().into());

    let course = active.update(&txn).await?;

    if user.role == Role::Admin {
        if let Some(module_ids) = payload.module_ids {
            sync_modules(&txn, course.id, &module_ids).await?;
        }
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "course_update",
        Some("courses"),
        Some(serde_json::json!({ "course_id": course.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        course_from_entity(course),
        Some(Meta::empty()),
    ))
}

pub async fn delete_course(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = courses::Entity::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    if !policy::course::delete(user, &existing) {
        return Err(AppError::Forbidden);
    }

    courses::Entity::delete_by_id(id).exec(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "course_delete",
        Some("courses"),
        Some(serde_json::json!({ "course_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn approve_course(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Course>> {
    if !policy::course::approve(user) {
        return Err(AppError::Forbidden);
    }

    let existing = courses::Entity::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    let mut active: courses::ActiveModel = existing.into();
    active.is_approved = Set(true);
    active.updated_at = Set(Utc::now().into());
    let course = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "course_approve",
        Some("courses"),
        Some(serde_json::json!({ "course_id": course.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Course approved",
        course_from_entity(course),
        Some(Meta::empty()),
    ))
}

pub async fn approval_queue(
    state: &AppState,
    user: &AuthUser,
    pagination: crate::routes::params::Pagination,
) -> AppResult<ApiResponse<CourseList>> {
    if !policy::course::approve(user) {
        return Err(AppError::Forbidden);
    }

    let (page, limit, offset) = pagination.normalize();
    let finder = courses::Entity::find()
        .filter(courses::Column::IsApproved.eq(false))
        .order_by_desc(courses::Column::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(course_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Approval queue",
        CourseList { items },
        Some(meta),
    ))
}

/// Replace the course's module list with exactly `module_ids`, ordered by
/// list index. Runs inside the caller's transaction so readers never see a
/// half-applied ordering.
pub async fn sync_modules<C: ConnectionTrait>(
    conn: &C,
    course_id: Uuid,
    module_ids: &[Uuid],
) -> AppResult<()> {
    let known = modules::Entity::find()
        .filter(modules::Column::Id.is_in(module_ids.to_vec()))
        .count(conn)
        .await? as usize;
    if known != module_ids.len() {
        return Err(AppError::BadRequest("Unknown module in list".into()));
    }

    course_modules::Entity::delete_many()
        .filter(course_modules::Column::CourseId.eq(course_id))
        .exec(conn)
        .await?;

    for (index, module_id) in module_ids.iter().enumerate() {
        course_modules::ActiveModel {
            id: Set(Uuid::new_v4()),
            course_id: Set(course_id),
            module_id: Set(*module_id),
            position: Set(index as i32 + 1),
            created_at: NotSet,
        }
        .insert(conn)
        .await?;
    }

    Ok(())
}

pub(crate) fn course_from_entity(model: courses::Model) -> Course {
    Course {
        id: model.id,
        theme_id: model.theme_id,
        coach_id: model.coach_id,
        title: model.title,
        description: model.description,
        cover_image: model.cover_image,
        is_approved: model.is_approved,
        is_free: model.is_free,
        price: model.price,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}
