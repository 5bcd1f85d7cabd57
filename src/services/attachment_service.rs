use std::path::Path;

use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::{
    access,
    audit::log_audit,
    dto::attachments::{UpdateAttachmentRequest, UploadedFile},
    entity::{attachments, modules},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Attachment, Purchasable},
    policy,
    response::{ApiResponse, Meta},
    services::module_service::attachment_from_entity,
    state::AppState,
    storage::generated_filename,
};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub async fn store_attachment(
    state: &AppState,
    user: &AuthUser,
    module_id: Uuid,
    name: String,
    upload: UploadedFile,
) -> AppResult<ApiResponse<Attachment>> {
    let module = modules::Entity::find_by_id(module_id)
        .one(&state.orm)
        .await?;
    let module = match module {
        Some(m) => m,
        None => return Err(AppError::NotFound),
    };

    // Uploading is an edit of the module.
    if !policy::module::update(user, &module) {
        return Err(AppError::Forbidden);
    }

    if name.trim().is_empty() {
        return Err(AppError::BadRequest("Attachment name is required".into()));
    }
    if upload.bytes.is_empty() {
        return Err(AppError::BadRequest("File is empty".into()));
    }
    if upload.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::BadRequest("File exceeds the 10MB limit".into()));
    }

    let filename = generated_filename(&upload.original_filename);
    let path = format!("attachments/{filename}");

    state
        .store
        .store(&path, &upload.bytes)
        .await
        .map_err(AppError::Internal)?;

    let attachment = attachments::ActiveModel {
        id: Set(Uuid::new_v4()),
        module_id: Set(module.id),
        name: Set(name),
        filename: Set(filename),
        disk: Set(state.store.disk().to_string()),
        path: Set(path),
        size: Set(upload.bytes.len() as i64),
        mime_type: Set(upload.mime_type),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "attachment_create",
        Some("attachments"),
        Some(serde_json::json!({
            "attachment_id": attachment.id,
            "module_id": module.id,
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Attachment uploaded",
        attachment_from_entity(attachment),
        Some(Meta::empty()),
    ))
}

pub async fn update_attachment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateAttachmentRequest,
) -> AppResult<ApiResponse<Attachment>> {
    let (attachment, module) = load_with_module(state, id).await?;

    if !policy::module::update(user, &module) {
        return Err(AppError::Forbidden);
    }

    let mut active: attachments::ActiveModel = attachment.into();
    active.name = Set(payload.name);
    let attachment = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Attachment updated",
        attachment_from_entity(attachment),
        Some(Meta::empty()),
    ))
}

/// Removes the record and the stored object. A storage failure is logged and
/// never blocks the record deletion.
pub async fn delete_attachment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let (attachment, module) = load_with_module(state, id).await?;

    if !policy::module::update(user, &module) {
        return Err(AppError::Forbidden);
    }

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

    attachments::Entity::delete_by_id(attachment.id)
        .exec(&state.orm)
        .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "attachment_delete",
        Some("attachments"),
        Some(serde_json::json!({ "attachment_id": id })),
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

pub struct DownloadPayload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
}

/// Serving the bytes is consumption of protected content, so this runs the
/// entitlement check, not just the metadata policy.
pub async fn download_attachment(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<DownloadPayload> {
    let (attachment, module) = load_with_module(state, id).await?;

    if !access::can_access(&state.orm, user, &Purchasable::Module(module)).await? {
        return Err(AppError::Forbidden);
    }

    if !state.store.exists(&attachment.path).await {
        return Err(AppError::NotFound);
    }

    let bytes = state
        .store
        .read(&attachment.path)
        .await
        .map_err(AppError::Internal)?;

    Ok(DownloadPayload {
        bytes,
        file_name: download_name(&attachment.name, &attachment.filename),
        mime_type: attachment.mime_type,
    })
}

async fn load_with_module(
    state: &AppState,
    id: Uuid,
) -> AppResult<(attachments::Model, modules::Model)> {
    let attachment = attachments::Entity::find_by_id(id).one(&state.orm).await?;
    let attachment = match attachment {
        Some(a) => a,
        None => return Err(AppError::NotFound),
    };

    let module = modules::Entity::find()
        .filter(modules::Column::Id.eq(attachment.module_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok((attachment, module))
}

/// The logical name plus the stored file's real extension.
fn download_name(name: &str, filename: &str) -> String {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{name}.{ext}"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_name_uses_logical_name_with_stored_extension() {
        assert_eq!(
            download_name("Lesson tabs", "8f14e45f.pdf"),
            "Lesson tabs.pdf"
        );
        assert_eq!(download_name("Notes", "8f14e45f"), "Notes");
    }
}
