use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::{AppState, SESSION_COOKIE, decode_token};
use crate::blocking;
use crate::error::AppError;

/// The user a request acts on behalf of. Inserted as a request extension by
/// the session middleware; every store query is scoped to `id`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
}

/// Session token from `Authorization: Bearer`, falling back to the cookie.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
}

/// Decodes the session and re-resolves the user through the store, so a
/// token for a user that no longer exists is rejected.
pub async fn resolve_session(state: &AppState, headers: &HeaderMap) -> Result<CurrentUser, AppError> {
    let token = session_token(headers).ok_or(AppError::Unauthenticated)?;
    let claims = decode_token(&state.jwt_secret, &token).ok_or(AppError::Unauthenticated)?;

    let user_id = claims.sub.to_string();
    let user = blocking(&state.db, move |db| db.get_user_by_id(&user_id))
        .await?
        .ok_or(AppError::Unauthenticated)?;

    if user.username != claims.username {
        return Err(AppError::Unauthenticated);
    }

    Ok(CurrentUser {
        id: user.id,
        username: user.username,
    })
}

/// JSON routes: 401 `{error}` without a valid session.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = resolve_session(&state, req.headers()).await?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Page routes: redirect to the login form without a valid session.
pub async fn require_page_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match resolve_session(&state, req.headers()).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(AppError::Unauthenticated) => Redirect::to("/login").into_response(),
        Err(e) => e.into_response(),
    }
}
