use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{AuthUser, Claims, User};
use crate::AppState;

const TOKEN_TTL_DAYS: i64 = 30;

pub fn create_token(user_id: Uuid, secret: &str) -> Result<String, ApiError> {
    let expiration = Utc::now() + Duration::days(TOKEN_TTL_DAYS);

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("token signing failed: {e}");
        ApiError::Internal
    })
}

/// Returns the user id embedded in the token, or an authentication
/// error for anything invalid or expired.
pub fn verify_token(token: &str, secret: &str) -> Result<Uuid, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            ApiError::Authentication("Your token has expired. Please log in again.".into())
        }
        _ => ApiError::Authentication("Invalid token. Please log in again.".into()),
    })?;

    Uuid::parse_str(&data.claims.sub)
        .map_err(|_| ApiError::Authentication("Invalid token. Please log in again.".into()))
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Access guard layered over every protected route. Verifies the bearer
/// token, resolves the user row, and attaches the identity to the
/// request; the downstream handler never runs on failure.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers()).ok_or_else(|| {
        ApiError::Authentication("You are not logged in. Please log in to get access.".into())
    })?;

    let user_id = verify_token(token, &state.jwt_secret)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| {
            ApiError::Authentication("The user belonging to this token no longer exists.".into())
        })?;

    request.extensions_mut().insert(AuthUser::from(user));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_round_trip() {
        let id = Uuid::new_v4();
        let token = create_token(id, "test-secret").unwrap();
        let decoded = verify_token(&token, "test-secret").unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn wrong_secret_fails() {
        let token = create_token(Uuid::new_v4(), "secret-a").unwrap();
        let result = verify_token(&token, "secret-b");
        assert!(matches!(result, Err(ApiError::Authentication(_))));
    }

    #[test]
    fn expired_token_fails() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            exp: (Utc::now() - Duration::hours(2)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let result = verify_token(&token, "test-secret");
        match result {
            Err(ApiError::Authentication(msg)) => assert!(msg.contains("expired")),
            other => panic!("expected expiry error, got {other:?}"),
        }
    }

    #[test]
    fn garbage_token_fails() {
        assert!(verify_token("not-a-jwt", "test-secret").is_err());
    }

    #[test]
    fn non_uuid_subject_fails() {
        let claims = Claims {
            sub: "42".into(),
            exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(verify_token(&token, "test-secret").is_err());
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
