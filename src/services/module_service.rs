use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    access,
    audit::log_audit,
    dto::modules::{CreateModuleRequest, ModuleDetail, ModuleInCourse, ModuleList,
        UpdateModuleRequest},
    entity::{attachments, course_modules, courses, modules},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Attachment, Difficulty, Module, Purchasable, Role},
    policy,
    response::{ApiResponse, Meta},
    routes::params::{ModuleQuery, SortOrder},
    state::AppState,
};

pub async fn list_modules(
    state: &AppState,
    user: Option<&AuthUser>,
    query: ModuleQuery,
) -> AppResult<ApiResponse<ModuleList>> {
    if !policy::module::view_any(user) {
        return Err(AppError::Forbidden);
    }

    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.search.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(Expr::col(modules::Column::Title).ilike(pattern));
    }

    if let Some(difficulty) = query.difficulty {
        condition = condition.add(modules::Column::Difficulty.eq(difficulty.as_str()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let mut finder = modules::Entity::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(modules::Column::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(modules::Column::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(module_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Modules", ModuleList { items }, Some(meta)))
}

pub async fn get_module(
    state: &AppState,
    user: Option<&AuthUser>,
    id: Uuid,
) -> AppResult<ApiResponse<ModuleDetail>> {
    let module = modules::Entity::find_by_id(id).one(&state.orm).await?;
    let module = match module {
        Some(m) => m,
        None => return Err(AppError::NotFound),
    };

    if !policy::module::view(user, &module) {
        return Err(AppError::Forbidden);
    }

    let can_access = entitled(state, user, &Purchasable::Module(module.clone())).await?;

    let attachment_items = attachments::Entity::find()
        .filter(attachments::Column::ModuleId.eq(module.id))
        .order_by_asc(attachments::Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(attachment_from_entity)
        .collect();

    let detail = ModuleDetail {
        module: module_from_entity(module),
        attachments: attachment_items,
        can_access,
    };
    Ok(ApiResponse::success("Module", detail, Some(Meta::empty())))
}

/// A module opened through a course page: verifies membership and adds
/// previous/next navigation along the course's ordered module list.
pub async fn get_module_in_course(
    state: &AppState,
    user: Option<&AuthUser>,
    course_id: Uuid,
    module_id: Uuid,
) -> AppResult<ApiResponse<ModuleInCourse>> {
    let course = courses::Entity::find_by_id(course_id).one(&state.orm).await?;
    let course = match course {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    if !policy::course::view(user, &course) {
        return Err(AppError::Forbidden);
    }

    let ordered = course_modules::Entity::find()
        .filter(course_modules::Column::CourseId.eq(course_id))
        .order_by_asc(course_modules::Column::Position)
        .all(&state.orm)
        .await?;

    let index = ordered
        .iter()
        .position(|row| row.module_id == module_id)
        .ok_or(AppError::NotFound)?;

    let previous_module_id = index.checked_sub(1).map(|i| ordered[i].module_id);
    let next_module_id = ordered.get(index + 1).map(|row| row.module_id);

    let module = modules::Entity::find_by_id(module_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let can_access_course = entitled(state, user, &Purchasable::Course(course.clone())).await?;
    let can_access_module = entitled(state, user, &Purchasable::Module(module.clone())).await?;

    let attachment_items = attachments::Entity::find()
        .filter(attachments::Column::ModuleId.eq(module.id))
        .order_by_asc(attachments::Column::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(attachment_from_entity)
        .collect();

    let detail = ModuleInCourse {
        course_id,
        module: module_from_entity(module),
        attachments: attachment_items,
        can_access_course,
        can_access_module,
        previous_module_id,
        next_module_id,
    };
    Ok(ApiResponse::success("Module", detail, Some(Meta::empty())))
}

pub async fn create_module(
    state: &AppState,
    user: &AuthUser,
    payload: CreateModuleRequest,
) -> AppResult<ApiResponse<Module>> {
    if !policy::module::create(user) {
        return Err(AppError::Forbidden);
    }

    // Admin-created modules have no owning coach.
    let coach_id = match user.role {
        Role::Coach => Some(user.user_id),
        Role::Admin | Role::Student => None,
    };

    let module = modules::ActiveModel {
        id: Set(Uuid::new_v4()),
        coach_id: Set(coach_id),
        title: Set(payload.title),
        description: Set(payload.description),
        difficulty: Set(payload.difficulty.as_str().to_string()),
        video_url: Set(payload.video_url),
        is_free: Set(payload.is_free),
        price: Set(payload.price),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "module_create",
        Some("modules"),
        Some(serde_json::json!({ "module_id": module.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Module created",
        module_from_entity(module),
        Some(Meta::empty()),
    ))
}

pub async fn update_module(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateModuleRequest,
) -> AppResult<ApiResponse<Module>> {
    let existing = modules::Entity::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(m) => m,
        None => return Err(AppError::NotFound),
    };

    if !policy::module::update(user, &existing) {
        return Err(AppError::Forbidden);
    }

    let mut active: modules::ActiveModel = existing.into();
    if let Some(title) = payload.title {
        active.title = Set(title);
    }
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(difficulty) = payload.difficulty {
        active.difficulty = Set(difficulty.as_str().to_string());
    }
    if let Some(video_url) = payload.video_url {
        active.video_url = Set(Some(video_url));
    }
    if let Some(price) = payload.price {
        active.price = Set(Some(price));
    }
    if let Some(is_free) = payload.is_free {
        active.is_free = Set(is_free);
    }
    active.updated_at = Set(Utc::now().into());

    let module = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "module_update",
        Some("modules"),
        Some(serde_json::json!({ "module_id": module.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        module_from_entity(module),
        Some(Meta::empty()),
    ))
}

/// Deleting a module cascades to its attachment rows; the stored objects are
/// removed best-effort first so a missing file never blocks the delete.
pub async fn delete_module(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = modules::Entity::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(m) => m,
        None => return Err(AppError::NotFound),
    };

    if !policy::module::delete(user, &existing) {
        return Err(AppError::Forbidden);
    }

    let stored = attachments::Entity::find()
        .filter(attachments::Column::ModuleId.eq(id))
        .all(&state.orm)
        .await?;
    for attachment in &stored {
        if state.store.exists(&attachment.path).await {
            if let Err(err) = state.store.delete(&attachment.path).await {
                tracing::warn!(
                    error = %err,
                    attachment_id = %attachment.id,
                    path = %attachment.path,
                    "failed to remove stored attachment file"
                );
            }
        }
    }

    modules::Entity::delete_by_id(id).exec(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "module_delete",
        Some("modules"),
        Some(serde_json::json!({ "module_id": id, "attachments": stored.len() })),
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

/// Entitlement for a possibly-unauthenticated caller: guests only ever get
/// free content.
pub(crate) async fn entitled(
    state: &AppState,
    user: Option<&AuthUser>,
    item: &Purchasable,
) -> AppResult<bool> {
    match user {
        Some(user) => access::can_access(&state.orm, user, item).await,
        None => Ok(item.is_free()),
    }
}

pub(crate) fn module_from_entity(model: modules::Model) -> Module {
    let difficulty = Difficulty::parse(&model.difficulty).unwrap_or(Difficulty::Easy);
    Module {
        id: model.id,
        coach_id: model.coach_id,
        title: model.title,
        description: model.description,
        difficulty,
        video_url: model.video_url,
        is_free: model.is_free,
        price: model.price,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

pub(crate) fn attachment_from_entity(model: attachments::Model) -> Attachment {
    Attachment {
        id: model.id,
        module_id: model.module_id,
        name: model.name,
        filename: model.filename,
        disk: model.disk,
        path: model.path,
        size: model.size,
        mime_type: model.mime_type,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
