use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};

use nova_types::api::{SendMessageRequest, SendMessageResponse};

use crate::auth::AppState;
use crate::error::AppError;
use crate::middleware::CurrentUser;

pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let reply = state.turns.run(&user.id, req).await?;

    Ok(Json(SendMessageResponse {
        response: reply.response,
        citations: reply.citations,
    }))
}
