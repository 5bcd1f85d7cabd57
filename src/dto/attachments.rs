use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Attachment;

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAttachmentRequest {
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AttachmentList {
    pub items: Vec<Attachment>,
}

/// An upload extracted from the multipart body by the route layer.
#[derive(Debug)]
pub struct UploadedFile {
    pub original_filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}
