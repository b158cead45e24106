use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, http::StatusCode, Extension};
use serde_json::json;
use std::sync::Arc;
use tokio::task;

use crate::auth::create_token;
use crate::error::ApiError;
use crate::extract::Json;
use crate::models::{AuthUser, LoginRequest, RegisterRequest, User, UserProfile};
use crate::AppState;

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn is_reasonable_email(email: &str) -> bool {
    if email.len() < 5 || email.len() > 254 {
        return false;
    }
    let mut parts = email.split('@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    parts.next().is_none()
        && !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let email = normalize_email(&payload.email);
    if !is_reasonable_email(&email) {
        return Err(ApiError::Validation("Please provide a valid email address.".into()));
    }
    if payload.password.len() < 8 || payload.password.len() > 128 {
        return Err(ApiError::Validation(
            "Password must be between 8 and 128 characters.".into(),
        ));
    }
    let name = payload.name.trim().chars().take(128).collect::<String>();
    if name.is_empty() {
        return Err(ApiError::Validation("Please provide a name.".into()));
    }

    tracing::info!("register request for {email}");

    let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict("Email already in use.".into()));
    }

    let password = payload.password;
    let password_hash = task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await
    .map_err(|e| {
        tracing::error!("password hashing worker failed: {e}");
        ApiError::Internal
    })?
    .map_err(|e| {
        tracing::error!("password hashing failed: {e}");
        ApiError::Internal
    })?;

    let inserted = sqlx::query_as::<_, User>(
        "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(&name)
    .bind(&email)
    .bind(&password_hash)
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        // The pre-check can race with a concurrent registration; the
        // unique index is the real arbiter.
        if is_unique_violation(&e) {
            ApiError::Conflict("Email already in use.".into())
        } else {
            ApiError::Database(e)
        }
    })?;

    let token = create_token(inserted.id, &state.jwt_secret)?;
    let user = UserProfile::from(inserted);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "token": token, "data": { "user": user } })),
    ))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let invalid = || ApiError::Authentication("Incorrect email or password.".into());

    let email = normalize_email(&payload.email);
    if !is_reasonable_email(&email) || payload.password.is_empty() || payload.password.len() > 128 {
        return Err(invalid());
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(invalid)?;

    let password = payload.password;
    let hash = user.password_hash.clone();
    let is_valid = task::spawn_blocking(move || match PasswordHash::new(&hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    })
    .await
    .map_err(|e| {
        tracing::error!("password verification worker failed: {e}");
        ApiError::Internal
    })?;

    if !is_valid {
        return Err(invalid());
    }

    let token = create_token(user.id, &state.jwt_secret)?;
    let user = UserProfile::from(user);

    Ok(Json(
        json!({ "status": "success", "token": token, "data": { "user": user } }),
    ))
}

pub async fn me(Extension(user): Extension<AuthUser>) -> Json<serde_json::Value> {
    let user = UserProfile {
        id: user.id,
        name: user.name,
        email: user.email,
    };
    Json(json!({ "status": "success", "data": { "user": user } }))
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
    }

    #[test]
    fn email_sanity_check() {
        assert!(is_reasonable_email("a@x.com"));
        assert!(is_reasonable_email("first.last@sub.example.org"));
        assert!(!is_reasonable_email("a@x"));
        assert!(!is_reasonable_email("@x.com"));
        assert!(!is_reasonable_email("a@.com"));
        assert!(!is_reasonable_email("a@x.com@y.com"));
        assert!(!is_reasonable_email(""));
    }
}
