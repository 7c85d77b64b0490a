use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::info;
use uuid::Uuid;

use nova_db::Database;
use nova_types::api::{Claims, LoginForm, RegisterForm};

use crate::blocking;
use crate::error::AppError;
use crate::templates::Templates;
use crate::turn::TurnOrchestrator;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub turns: TurnOrchestrator,
    pub templates: Templates,
    pub max_upload_bytes: usize,
}

pub const SESSION_COOKIE: &str = "nova_session";
const SESSION_DAYS: i64 = 30;

/// Lengths are counted in characters, not bytes.
fn validate_registration(form: &RegisterForm) -> Result<String, AppError> {
    let username = form.username.trim().to_string();
    if !(3..=32).contains(&username.chars().count()) {
        return Err(AppError::BadRequest("Username must be between 3 and 32 characters".into()));
    }
    if form.password.chars().count() < 8 {
        return Err(AppError::BadRequest("Password must be at least 8 characters".into()));
    }
    if form.password != form.confirm_password {
        return Err(AppError::BadRequest("Passwords do not match".into()));
    }
    Ok(username)
}

pub async fn register_user(state: &AppState, form: RegisterForm) -> Result<Uuid, AppError> {
    let username = validate_registration(&form)?;

    let password_hash = hash_password(&form.password)?;
    let user_id = Uuid::new_v4();

    let id = user_id.to_string();
    let name = username.clone();
    let created = blocking(&state.db, move |db| db.create_user(&id, &name, &password_hash)).await?;
    if !created {
        return Err(AppError::DuplicateUser);
    }

    info!(%user_id, %username, "User registered");
    Ok(user_id)
}

/// Unknown usernames and wrong passwords produce the same error.
pub async fn authenticate(state: &AppState, form: LoginForm) -> Result<String, AppError> {
    let username = form.username.trim().to_string();
    let user = blocking(&state.db, move |db| db.get_user_by_username(&username))
        .await?
        .ok_or(AppError::AuthFailure)?;

    if !verify_password(&form.password, &user.password_hash) {
        return Err(AppError::AuthFailure);
    }

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| AppError::Store(anyhow::anyhow!("corrupt user id '{}': {}", user.id, e)))?;

    let token = create_token(&state.jwt_secret, user_id, &user.username)?;
    info!(%user_id, username = %user.username, "User logged in");
    Ok(token)
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub fn expired_session_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    cookie
}
