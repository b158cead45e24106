use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Extension,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::ingest;
use crate::models::{AuthUser, CreateDatasetRequest, Dataset};
use crate::AppState;

/// `POST /api/data/upload` — multipart form with `file` plus optional
/// `name` and `description` fields.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_filename: Option<String> = None;
    let mut name: Option<String> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::debug!("multipart read failed: {e}");
        ApiError::Validation("Malformed multipart body.".into())
    })? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                original_filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| {
                    tracing::debug!("file field read failed: {e}");
                    ApiError::Validation("Could not read the uploaded file.".into())
                })?;
                file_bytes = Some(bytes.to_vec());
            }
            Some("name") => {
                name = Some(text_field(field).await?);
            }
            Some("description") => {
                description = Some(text_field(field).await?);
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| ApiError::Validation("No file uploaded.".into()))?;
    let filename = original_filename
        .filter(|f| !f.is_empty())
        .ok_or_else(|| ApiError::Validation("The uploaded file has no filename.".into()))?;

    // Extension gate runs before any parsing.
    let file_type = ingest::detect_file_type(&filename)?;
    let rows = ingest::parse(&bytes, file_type)?;
    let columns = ingest::infer_columns(&rows, state.column_inference);

    let name = name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| ingest::filename_stem(&filename));

    tracing::info!(
        rows = rows.len(),
        columns = columns.len(),
        file_type = file_type.as_str(),
        "dataset upload by {}",
        user.email
    );

    let dataset = insert_dataset(
        &state,
        &name,
        description.as_deref(),
        serde_json::Value::Array(rows.into_iter().map(serde_json::Value::Object).collect()),
        &columns,
        user.id,
        Some(file_type.as_str()),
        Some(&filename),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "data": { "dataset": dataset } })),
    ))
}

/// `POST /api/data` — explicit `{name, description?, data, columns}`,
/// no parsing.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreateDatasetRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let missing = || ApiError::Validation("name, data and columns are required.".into());

    let name = payload
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(missing)?;
    let data = payload.data.ok_or_else(missing)?;
    let columns = payload.columns.ok_or_else(missing)?;

    let dataset = insert_dataset(
        &state,
        &name,
        payload.description.as_deref(),
        serde_json::Value::Array(data.into_iter().map(serde_json::Value::Object).collect()),
        &columns,
        user.id,
        Some("manual"),
        None,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "success", "data": { "dataset": dataset } })),
    ))
}

/// `GET /api/data` — the requester's datasets, newest first.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let datasets = sqlx::query_as::<_, Dataset>(
        "SELECT * FROM datasets WHERE owner_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "status": "success",
        "results": datasets.len(),
        "data": { "datasets": datasets },
    })))
}

pub async fn get_one(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let dataset = fetch_owned(&state, id, user.id).await?;
    Ok(Json(
        json!({ "status": "success", "data": { "dataset": dataset } }),
    ))
}

pub async fn delete_one(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    // Single conditional delete: the owner match happens in the same
    // statement as the removal, so there is no check-then-act window.
    let result = sqlx::query("DELETE FROM datasets WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(missing_or_forbidden(&state, id).await?);
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Loads a dataset enforcing the ownership rule via [`authorize_owner`].
pub(crate) async fn fetch_owned(
    state: &AppState,
    id: Uuid,
    owner_id: Uuid,
) -> Result<Dataset, ApiError> {
    let dataset = sqlx::query_as::<_, Dataset>("SELECT * FROM datasets WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;

    authorize_owner(dataset, owner_id)
}

/// The access decision, kept free of SQL. Not-found takes priority over
/// forbidden: existence is confirmed before the owner comparison.
fn authorize_owner(dataset: Option<Dataset>, requester: Uuid) -> Result<Dataset, ApiError> {
    let dataset =
        dataset.ok_or_else(|| ApiError::NotFound("No dataset found with that ID.".into()))?;

    if dataset.owner_id != requester {
        return Err(ApiError::Forbidden(
            "You do not have access to this dataset.".into(),
        ));
    }
    Ok(dataset)
}

/// Status for a conditional mutation that matched zero rows: the row
/// either belongs to someone else (403) or does not exist (404).
fn zero_row_outcome(exists: bool) -> ApiError {
    if exists {
        ApiError::Forbidden("You do not have access to this dataset.".into())
    } else {
        ApiError::NotFound("No dataset found with that ID.".into())
    }
}

/// Post-hoc status resolution for conditional mutations that matched
/// zero rows.
pub(crate) async fn missing_or_forbidden(state: &AppState, id: Uuid) -> Result<ApiError, ApiError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM datasets WHERE id = $1)")
        .bind(id)
        .fetch_one(&state.db)
        .await?;

    Ok(zero_row_outcome(exists))
}

#[allow(clippy::too_many_arguments)]
async fn insert_dataset(
    state: &AppState,
    name: &str,
    description: Option<&str>,
    data: serde_json::Value,
    columns: &[String],
    owner_id: Uuid,
    file_type: Option<&str>,
    original_filename: Option<&str>,
) -> Result<Dataset, ApiError> {
    let dataset = sqlx::query_as::<_, Dataset>(
        "INSERT INTO datasets (name, description, data, columns, owner_id, file_type, original_filename) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(name)
    .bind(description)
    .bind(data)
    .bind(columns)
    .bind(owner_id)
    .bind(file_type)
    .bind(original_filename)
    .fetch_one(&state.db)
    .await?;

    Ok(dataset)
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|_| ApiError::Validation("Malformed multipart body.".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dataset_owned_by(owner_id: Uuid) -> Dataset {
        Dataset {
            id: Uuid::new_v4(),
            name: "sales".into(),
            description: None,
            data: serde_json::json!([{"a": 1}]),
            columns: vec!["a".into()],
            owner_id,
            file_type: Some("csv".into()),
            original_filename: Some("sales.csv".into()),
            ai_insights: None,
            ai_insights_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn owner_gets_the_dataset() {
        let owner = Uuid::new_v4();
        let result = authorize_owner(Some(dataset_owned_by(owner)), owner);
        assert!(result.is_ok());
    }

    #[test]
    fn non_owner_of_existing_dataset_is_forbidden_never_not_found() {
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let result = authorize_owner(Some(dataset_owned_by(owner)), stranger);
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn missing_dataset_is_not_found_regardless_of_requester() {
        let result = authorize_owner(None, Uuid::new_v4());
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn zero_row_mutation_resolves_by_existence() {
        assert!(matches!(zero_row_outcome(true), ApiError::Forbidden(_)));
        assert!(matches!(zero_row_outcome(false), ApiError::NotFound(_)));
    }
}
