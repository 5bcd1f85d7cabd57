use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::themes::{CreateThemeRequest, ThemeList, UpdateThemeRequest},
    entity::{courses, themes},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Theme,
    policy,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub async fn list_themes(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<ThemeList>> {
    let (page, limit, offset) = pagination.normalize();

    let finder = themes::Entity::find().order_by_asc(themes::Column::Name);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(theme_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Themes", ThemeList { items }, Some(meta)))
}

pub async fn get_theme(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Theme>> {
    let theme = themes::Entity::find_by_id(id)
        .one(&state.orm)
        .await?
        .map(theme_from_entity);
    match theme {
        Some(theme) => Ok(ApiResponse::success("Theme", theme, None)),
        None => Err(AppError::NotFound),
    }
}

pub async fn create_theme(
    state: &AppState,
    user: &AuthUser,
    payload: CreateThemeRequest,
) -> AppResult<ApiResponse<Theme>> {
    if !policy::theme::create(user) {
        return Err(AppError::Forbidden);
    }

    let theme = themes::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        description: Set(payload.description),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "theme_create",
        Some("themes"),
        Some(serde_json::json!({ "theme_id": theme.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Theme created",
        theme_from_entity(theme),
        Some(Meta::empty()),
    ))
}

pub async fn update_theme(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateThemeRequest,
) -> AppResult<ApiResponse<Theme>> {
    if !policy::theme::update(user) {
        return Err(AppError::Forbidden);
    }

    let existing = themes::Entity::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(t) => t,
        None => return Err(AppError::NotFound),
    };

    let mut active: themes::ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }

    let theme = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "theme_update",
        Some("themes"),
        Some(serde_json::json!({ "theme_id": theme.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Updated",
        theme_from_entity(theme),
        Some(Meta::empty()),
    ))
}

pub async fn delete_theme(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    if !policy::theme::delete(user) {
        return Err(AppError::Forbidden);
    }

    let in_use = courses::Entity::find()
        .filter(courses::Column::ThemeId.eq(id))
        .count(&state.orm)
        .await?;
    if in_use > 0 {
        return Err(AppError::BadRequest(
            "Theme has courses and cannot be deleted".into(),
        ));
    }

    let result = themes::Entity::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "theme_delete",
        Some("themes"),
        Some(serde_json::json!({ "theme_id": id })),
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

pub(crate) fn theme_from_entity(model: themes::Model) -> Theme {
    Theme {
        id: model.id,
        name: model.name,
        description: model.description,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
