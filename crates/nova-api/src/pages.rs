//! Server-rendered pages: login, registration, logout and the chat index.

use axum::{
    Extension, Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use minijinja::context;
use nova_types::api::{ChatSummary, LoginForm, RegisterForm};

use crate::auth::{self, AppState};
use crate::blocking;
use crate::error::AppError;
use crate::middleware::CurrentUser;

pub async fn login_page(State(state): State<AppState>) -> Result<Response, AppError> {
    Ok(state.templates.render("login.html", context! {})?.into_response())
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let username = form.username.clone();
    match auth::authenticate(&state, form).await {
        Ok(token) => Ok((jar.add(auth::session_cookie(token)), Redirect::to("/")).into_response()),
        Err(e @ AppError::AuthFailure) => {
            let page = state.templates.render(
                "login.html",
                context! { error => e.public_message(), username => username },
            )?;
            Ok((e.status(), page).into_response())
        }
        Err(e) => Err(e),
    }
}

pub async fn register_page(State(state): State<AppState>) -> Result<Response, AppError> {
    Ok(state.templates.render("register.html", context! {})?.into_response())
}

pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    let username = form.username.clone();
    match auth::register_user(&state, form).await {
        Ok(_) => Ok(Redirect::to("/login").into_response()),
        Err(e @ (AppError::DuplicateUser | AppError::BadRequest(_))) => {
            let page = state.templates.render(
                "register.html",
                context! { error => e.public_message(), username => username },
            )?;
            Ok((e.status(), page).into_response())
        }
        Err(e) => Err(e),
    }
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (jar.remove(auth::expired_session_cookie()), Redirect::to("/login"))
}

pub async fn index(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Response, AppError> {
    let uid = user.id.clone();
    let chats: Vec<ChatSummary> = blocking(&state.db, move |db| db.list_chats(&uid))
        .await?
        .into_iter()
        .map(|c| ChatSummary {
            id: c.id,
            title: c.title,
            created_at: c.created_at,
        })
        .collect();

    let page = state.templates.render(
        "index.html",
        context! { username => user.username, chats => chats },
    )?;
    Ok(page.into_response())
}
