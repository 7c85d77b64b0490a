use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
};
use tracing::{error, info, warn};
use uuid::Uuid;

use nova_types::api::{DocumentResponse, DocumentsResponse, UploadResponse};

use crate::auth::AppState;
use crate::blocking;
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::pdf;

struct Upload {
    filename: String,
    bytes: Vec<u8>,
}

/// POST /upload_pdf — multipart `file` plus an optional `chat_id`. The text
/// is extracted and stored for the caller; when `chat_id` names one of their
/// chats, an upload marker message is appended to it.
pub async fn upload_pdf(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload: Option<Upload> = None;
    let mut chat_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                upload = Some(Upload {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            Some("chat_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                chat_id = Some(value.trim().to_string()).filter(|c| !c.is_empty());
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| AppError::BadRequest("No file provided".into()))?;
    if upload.filename.is_empty() {
        return Err(AppError::BadRequest("No file selected".into()));
    }
    if !pdf::has_pdf_extension(&upload.filename) {
        return Err(AppError::UnsupportedFile("Only PDF files are allowed".into()));
    }
    if upload.bytes.len() > state.max_upload_bytes {
        return Err(AppError::UnsupportedFile("File is too large".into()));
    }

    let Upload { filename, bytes } = upload;
    let text = tokio::task::spawn_blocking(move || pdf::extract_text(&bytes))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AppError::Store(anyhow::anyhow!("PDF extraction task failed: {}", e))
        })?
        .map_err(|e| {
            warn!(%filename, error = %e, "Rejected PDF upload");
            AppError::UnsupportedFile(format!("Could not read PDF: {}", e))
        })?;

    let document_id = Uuid::new_v4().to_string();
    let marker = format!("{} {}", state.turns.context_config().upload_marker, filename);

    let uid = user.id.clone();
    let did = document_id.clone();
    let name = filename.clone();
    blocking(&state.db, move |db| {
        let attach = chat_id.as_deref().map(|c| (c, marker.as_str()));
        db.insert_document_with_marker(&did, &uid, &name, &text, attach)
    })
    .await?
    .ok_or_else(|| AppError::NotFound("Chat not found".into()))?;

    info!(%document_id, %filename, username = %user.username, "Document stored");
    Ok(Json(UploadResponse {
        success: true,
        message: format!("{} uploaded successfully", filename),
        document_id,
    }))
}

pub async fn get_documents(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<DocumentsResponse>, AppError> {
    let documents = blocking(&state.db, move |db| {
        db.list_documents(&user.id, nova_db::models::DocumentScope::All)
    })
    .await?
    .into_iter()
    .map(|d| DocumentResponse {
        id: d.id,
        filename: d.filename,
        upload_date: d.upload_date,
        content: d.content,
    })
    .collect();

    Ok(Json(DocumentsResponse { documents }))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<DocumentResponse>, AppError> {
    let doc = blocking(&state.db, move |db| db.get_document(&user.id, &document_id))
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".into()))?;

    Ok(Json(DocumentResponse {
        id: doc.id,
        filename: doc.filename,
        upload_date: doc.upload_date,
        content: doc.content,
    }))
}
