use crate::AppState;
use crate::auth::{self, AuthError, AuthUser, TokenPair, TokenType};
use crate::error::{AppError, AppJson};
use crate::validation::{self, FieldErrors, PERSON_NAME_MAX_LEN, ValidationError};

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_macros::debug_handler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub(crate) struct RegisterRequest {
    username: Option<String>,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    password: Option<String>,
    password_confirm: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct RegisterResponse {
    message: &'static str,
    username: String,
}

#[derive(Deserialize)]
pub(crate) struct TokenRequest {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct RefreshRequest {
    refresh: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct AccessResponse {
    access: String,
}

#[derive(Serialize)]
pub(crate) struct ProfileResponse {
    id: i64,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    full_name: String,
    bottles_count: u64,
    date_joined: DateTime<Utc>,
}

/// Record `Required` for a missing value, `Blank` for an empty one.
fn required(errors: &mut FieldErrors, field: &str, value: Option<String>) -> Option<String> {
    match value {
        None => {
            errors.add(field, ValidationError::Required);
            None
        }
        Some(v) if v.is_empty() => {
            errors.add(field, ValidationError::Blank);
            None
        }
        Some(v) => Some(v),
    }
}

#[debug_handler(state = Arc<AppState>)]
pub(crate) async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut errors = FieldErrors::new();

    let username = required(&mut errors, "username", payload.username)
        .and_then(|u| errors.check("username", validation::validate_username(&u)));
    let email = errors
        .check(
            "email",
            validation::validate_email(payload.email.as_deref().unwrap_or_default()),
        )
        .unwrap_or_default();
    let first_name = errors
        .check(
            "first_name",
            validation::validate_optional_text(
                payload.first_name.as_deref(),
                Some(PERSON_NAME_MAX_LEN),
            ),
        )
        .flatten()
        .unwrap_or_default();
    let last_name = errors
        .check(
            "last_name",
            validation::validate_optional_text(
                payload.last_name.as_deref(),
                Some(PERSON_NAME_MAX_LEN),
            ),
        )
        .flatten()
        .unwrap_or_default();
    let password = required(&mut errors, "password", payload.password);
    let password_confirm = required(&mut errors, "password_confirm", payload.password_confirm);

    if let (Some(password), Some(confirm)) = (&password, &password_confirm) {
        if password != confirm {
            errors.add("non_field_errors", ValidationError::PasswordMismatch);
        }
    }

    if let Some(password) = &password {
        let attributes = [
            ("username", username.as_deref().unwrap_or_default()),
            ("email address", email.as_str()),
            ("first name", first_name.as_str()),
            ("last name", last_name.as_str()),
        ];
        for error in state.passwords.validate(password, &attributes) {
            errors.add("password", error);
        }
    }

    if let Some(username) = &username {
        if state.db.username_exists(username.clone()).await? {
            errors.add("username", ValidationError::UsernameTaken);
        }
    }

    let (Some(username), Some(password)) = (username, password) else {
        return Err(errors.into());
    };
    errors.into_result(())?;

    let password_hash = auth::hash_password_async(password).await?;
    let user = state
        .db
        .create_user(cellar_db::NewUser {
            username,
            email,
            password_hash,
            first_name,
            last_name,
        })
        .await?;

    tracing::info!(user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User created successfully",
            username: user.username,
        }),
    ))
}

#[debug_handler(state = Arc<AppState>)]
pub(crate) async fn token(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<TokenRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let mut errors = FieldErrors::new();
    let username = required(&mut errors, "username", payload.username);
    let password = required(&mut errors, "password", payload.password);
    let (Some(username), Some(password)) = (username, password) else {
        return Err(errors.into());
    };

    // Unknown usernames still go through a hash check so they are not faster
    let user = state.db.get_user_by_username(username).await?;
    let stored_hash = user.as_ref().map(|user| user.password_hash.clone());
    let verified = auth::check_password(password, stored_hash).await;
    let user = user
        .filter(|user| verified && user.is_active)
        .ok_or(AuthError::InvalidCredentials)?;

    let pair = state.tokens.issue_pair(user.id)?;
    tracing::debug!(user.id, "issued token pair");
    Ok(Json(pair))
}

#[debug_handler(state = Arc<AppState>)]
pub(crate) async fn token_refresh(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> Result<Json<AccessResponse>, AppError> {
    let mut errors = FieldErrors::new();
    let Some(refresh) = required(&mut errors, "refresh", payload.refresh) else {
        return Err(errors.into());
    };

    let claims = state.tokens.verify(&refresh, TokenType::Refresh)?;
    let user_id = claims.user_id()?;
    state
        .db
        .get_user(user_id)
        .await?
        .filter(|user| user.is_active)
        .ok_or(AuthError::UnknownUser)?;

    let access = state.tokens.issue_access(user_id)?;
    Ok(Json(AccessResponse { access }))
}

#[debug_handler(state = Arc<AppState>)]
pub(crate) async fn profile(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let bottles_count = state.db.count_bottles(user.id).await?;

    Ok(Json(ProfileResponse {
        full_name: user.full_name(),
        id: user.id,
        username: user.username,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        bottles_count,
        date_joined: user.date_joined,
    }))
}
