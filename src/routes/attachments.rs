use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use uuid::Uuid;

use crate::{
    dto::attachments::{UpdateAttachmentRequest, UploadedFile},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Attachment,
    response::ApiResponse,
    services::attachment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(upload_attachment))
        .route(
            "/{id}",
            patch(update_attachment).delete(delete_attachment),
        )
        .route("/{id}/download", get(download_attachment))
}

#[utoipa::path(post, path = "/api/attachments", tag = "Attachments")]
pub async fn upload_attachment(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<Attachment>>> {
    let mut name: Option<String> = None;
    let mut module_id: Option<Uuid> = None;
    let mut upload: Option<UploadedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.to_string()))?
    {
        let field_name = field.name().map(|s| s.to_string());
        match field_name.as_deref() {
            Some("name") => {
                name = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| AppError::BadRequest(err.to_string()))?,
                );
            }
            Some("module_id") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(err.to_string()))?;
                module_id = Some(
                    Uuid::parse_str(&raw)
                        .map_err(|_| AppError::BadRequest("Invalid module id".into()))?,
                );
            }
            Some("file") => {
                let original_filename = field
                    .file_name()
                    .unwrap_or("upload")
                    .to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::BadRequest(err.to_string()))?
                    .to_vec();
                upload = Some(UploadedFile {
                    original_filename,
                    mime_type,
                    bytes,
                });
            }
            _ => {}
        }
    }

    let name = name.ok_or_else(|| AppError::BadRequest("Missing name field".into()))?;
    let module_id =
        module_id.ok_or_else(|| AppError::BadRequest("Missing module_id field".into()))?;
    let upload = upload.ok_or_else(|| AppError::BadRequest("Missing file field".into()))?;

    let resp =
        attachment_service::store_attachment(&state, &user, module_id, name, upload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/attachments/{id}",
    request_body = UpdateAttachmentRequest,
    tag = "Attachments"
)]
pub async fn update_attachment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAttachmentRequest>,
) -> AppResult<Json<ApiResponse<Attachment>>> {
    let resp = attachment_service::update_attachment(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(delete, path = "/api/attachments/{id}", tag = "Attachments")]
pub async fn delete_attachment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = attachment_service::delete_attachment(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(get, path = "/api/attachments/{id}/download", tag = "Attachments")]
pub async fn download_attachment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let payload = attachment_service::download_attachment(&state, &user, id).await?;

    let headers = [
        (header::CONTENT_TYPE, payload.mime_type.clone()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", payload.file_name),
        ),
    ];
    Ok((headers, payload.bytes).into_response())
}
