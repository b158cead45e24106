use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Every handler error funnels through this type. The response envelope
/// is `{status: "fail", message}` for client errors and
/// `{status: "error", message}` for server errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Insight service is unavailable")]
    Upstream,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Something went very wrong")]
    Internal,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Upstream | Self::Database(_) | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status_code();

        // Server-side detail stays in the log; the client gets a generic line.
        let message = match &self {
            ApiError::Database(e) => {
                tracing::error!("database error: {e}");
                "Something went very wrong".to_string()
            }
            other => other.to_string(),
        };

        let status = if code.is_server_error() { "error" } else { "fail" };

        (code, Json(json!({ "status": status, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let code = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (code, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn client_errors_use_fail_status() {
        let (code, body) = body_json(ApiError::Validation("bad file".into())).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "fail");
        assert_eq!(body["message"], "bad file");
    }

    #[tokio::test]
    async fn forbidden_and_not_found_map_to_their_codes() {
        let (code, _) = body_json(ApiError::Forbidden("no".into())).await;
        assert_eq!(code, StatusCode::FORBIDDEN);
        let (code, _) = body_json(ApiError::NotFound("gone".into())).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upstream_failure_is_a_generic_500() {
        let (code, body) = body_json(ApiError::Upstream).await;
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Insight service is unavailable");
    }

    #[tokio::test]
    async fn database_errors_do_not_leak_detail() {
        let (code, body) = body_json(ApiError::Database(sqlx::Error::PoolTimedOut)).await;
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Something went very wrong");
    }
}
