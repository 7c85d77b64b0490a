pub mod auth;
pub mod chats;
pub mod context;
pub mod documents;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod pages;
pub mod pdf;
pub mod templates;
pub mod turn;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use nova_db::Database;
use tracing::error;

use crate::auth::AppState;
use crate::error::AppError;
use crate::middleware::{require_auth, require_page_auth};

/// Room for multipart framing around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

fn upload_body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes.saturating_add(MULTIPART_OVERHEAD)
}

/// Runs a store operation off the async runtime.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, AppError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            AppError::Store(anyhow::anyhow!("blocking task failed: {}", e))
        })?
        .map_err(AppError::Store)
}

/// Every route of the application, without static assets or tracing layers.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/login", get(pages::login_page).post(pages::login))
        .route("/register", get(pages::register_page).post(pages::register))
        .route("/health", get(|| async { "ok" }))
        .with_state(state.clone());

    let page_routes = Router::new()
        .route("/", get(pages::index))
        .route("/logout", get(pages::logout))
        .layer(from_fn_with_state(state.clone(), require_page_auth))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/new_chat", post(chats::new_chat))
        .route("/update_chat_title/{chat_id}", post(chats::update_chat_title))
        .route("/get_chat_history", get(chats::get_chat_history))
        .route("/get_messages/{chat_id}", get(chats::get_messages))
        .route("/delete_chat/{chat_id}", post(chats::delete_chat))
        .route("/clear_history", post(chats::clear_history))
        .route("/send_message", post(messages::send_message))
        .route(
            "/upload_pdf",
            post(documents::upload_pdf)
                .layer(DefaultBodyLimit::max(upload_body_limit(state.max_upload_bytes))),
        )
        .route("/get_documents", get(documents::get_documents))
        .route("/get_document/{document_id}", get(documents::get_document))
        .layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(page_routes)
        .merge(api_routes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_limit_saturates() {
        assert_eq!(upload_body_limit(1024), 1024 + MULTIPART_OVERHEAD);
        assert_eq!(upload_body_limit(usize::MAX), usize::MAX);
    }
}
