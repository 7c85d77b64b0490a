use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};
use tracing::info;
use uuid::Uuid;

use nova_types::api::{
    ChatHistoryResponse, ChatSummary, MessagesResponse, NewChatResponse, SuccessResponse,
    UpdateTitleRequest,
};

use crate::auth::AppState;
use crate::blocking;
use crate::error::AppError;
use crate::middleware::CurrentUser;

pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

pub async fn new_chat(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<NewChatResponse>, AppError> {
    let chat_id = Uuid::new_v4().to_string();

    let cid = chat_id.clone();
    let uid = user.id.clone();
    let chat = blocking(&state.db, move |db| db.create_chat(&cid, &uid, DEFAULT_CHAT_TITLE)).await?;

    info!(%chat_id, username = %user.username, "Chat created");
    Ok(Json(NewChatResponse {
        chat_id: chat.id,
        title: chat.title,
    }))
}

pub async fn update_chat_title(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(user): Extension<CurrentUser>,
    payload: Result<Json<UpdateTitleRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let title = req
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("No title provided".into()))?;

    let uid = user.id.clone();
    let renamed = blocking(&state.db, move |db| db.rename_chat(&uid, &chat_id, &title)).await?;
    if !renamed {
        return Err(AppError::NotFound("Chat not found".into()));
    }

    Ok(Json(SuccessResponse { success: true }))
}

pub async fn get_chat_history(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ChatHistoryResponse>, AppError> {
    let chats = blocking(&state.db, move |db| db.list_chats(&user.id))
        .await?
        .into_iter()
        .map(|c| ChatSummary {
            id: c.id,
            title: c.title,
            created_at: c.created_at,
        })
        .collect();

    Ok(Json(ChatHistoryResponse { chats }))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<MessagesResponse>, AppError> {
    let rows = blocking(&state.db, move |db| {
        if db.get_chat(&user.id, &chat_id)?.is_none() {
            return Ok(None);
        }
        db.list_messages(&user.id, &chat_id).map(Some)
    })
    .await?
    .ok_or_else(|| AppError::NotFound("Chat not found".into()))?;

    let messages = rows
        .into_iter()
        .map(|m| (m.role.as_str().to_string(), m.content))
        .collect();

    Ok(Json(MessagesResponse { messages }))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<SuccessResponse>, AppError> {
    let uid = user.id.clone();
    let cid = chat_id.clone();
    let deleted = blocking(&state.db, move |db| db.delete_chat(&uid, &cid)).await?;
    if !deleted {
        return Err(AppError::NotFound("Chat not found".into()));
    }

    info!(%chat_id, username = %user.username, "Chat deleted");
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn clear_history(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<SuccessResponse>, AppError> {
    let uid = user.id.clone();
    let removed = blocking(&state.db, move |db| db.clear_history(&uid)).await?;

    info!(username = %user.username, removed, "Chat history cleared");
    Ok(Json(SuccessResponse { success: true }))
}
