use axum::{extract::State, Extension};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::handlers::datasets::fetch_owned;
use crate::models::AuthUser;
use crate::AppState;

/// `POST /api/data/:id/insights` — forwards the dataset's rows and
/// columns to the AI service and persists the returned payload
/// verbatim. A failed upstream call leaves the stored dataset
/// untouched and surfaces one generic 500.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dataset = fetch_owned(&state, id, user.id).await?;

    let url = format!("{}/api/insights", state.ai_service_url);
    let body = json!({ "data": dataset.data, "columns": dataset.columns });

    let response = state
        .http
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(dataset = %id, "insight service request failed: {e}");
            ApiError::Upstream
        })?;

    if !response.status().is_success() {
        tracing::error!(
            dataset = %id,
            status = %response.status(),
            "insight service returned an error status"
        );
        return Err(ApiError::Upstream);
    }

    // The payload is opaque; the only requirement is that it is JSON.
    let insights: serde_json::Value = response.json().await.map_err(|e| {
        tracing::error!(dataset = %id, "insight service returned a non-JSON body: {e}");
        ApiError::Upstream
    })?;

    // Conditional on id + owner, overwriting any prior payload:
    // repeated requests are last-write-wins, observable via the
    // ai_insights_at stamp.
    let result = sqlx::query(
        "UPDATE datasets SET ai_insights = $3, ai_insights_at = now(), updated_at = now() \
         WHERE id = $1 AND owner_id = $2",
    )
    .bind(id)
    .bind(user.id)
    .bind(&insights)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        // Deleted between the read and the write.
        return Err(ApiError::NotFound("No dataset found with that ID.".into()));
    }

    tracing::info!(dataset = %id, "insights stored for {}", user.email);

    Ok(Json(
        json!({ "status": "success", "data": { "insights": insights } }),
    ))
}
