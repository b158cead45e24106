use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// The shape of a user on the wire. The password hash never serializes.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

/// Identity resolved by the access guard and handed to handlers via
/// request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Ordered array of row objects (JSONB).
    pub data: serde_json::Value,
    pub columns: Vec<String>,
    pub owner_id: Uuid,
    pub file_type: Option<String>,
    pub original_filename: Option<String>,
    pub ai_insights: Option<serde_json::Value>,
    pub ai_insights_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// ── API payloads ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Manual dataset creation. Fields are optional so that missing ones
/// produce the API's own validation error rather than a body-decode
/// rejection.
#[derive(Debug, Deserialize)]
pub struct CreateDatasetRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub data: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
    pub columns: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_serializes_camel_case() {
        let dataset = Dataset {
            id: Uuid::nil(),
            name: "sales".into(),
            description: None,
            data: serde_json::json!([{"a": 1}]),
            columns: vec!["a".into()],
            owner_id: Uuid::nil(),
            file_type: Some("csv".into()),
            original_filename: Some("sales.csv".into()),
            ai_insights: None,
            ai_insights_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&dataset).unwrap();
        assert!(value.get("fileType").is_some());
        assert!(value.get("originalFilename").is_some());
        assert!(value.get("aiInsights").is_some());
        assert!(value.get("ownerId").is_some());
        assert!(value.get("file_type").is_none());
    }

    #[test]
    fn user_profile_has_no_password_hash() {
        let profile = UserProfile {
            id: Uuid::nil(),
            name: "A".into(),
            email: "a@x.com".into(),
        };
        let value = serde_json::to_value(&profile).unwrap();
        assert!(value.get("password_hash").is_none());
        assert_eq!(value.get("email").unwrap(), "a@x.com");
    }
}
