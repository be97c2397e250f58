//! Patient preference endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::info;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository;
use crate::models::Patient;

#[derive(Debug, Serialize)]
pub struct UpsertResponse {
    pub message: String,
}

/// `PUT /api/patients` — create or update a preference record.
pub async fn upsert(
    State(ctx): State<ApiContext>,
    Json(patient): Json<Patient>,
) -> Result<Json<UpsertResponse>, ApiError> {
    if patient.phone.is_empty() {
        return Err(ApiError::BadRequest("phone must not be empty".into()));
    }
    let conn = ctx.core.open_db()?;
    repository::upsert_patient(&conn, &patient)?;
    info!(phone = %patient.phone, "patient preferences saved");
    Ok(Json(UpsertResponse {
        message: "Preferences saved".into(),
    }))
}

/// `GET /api/patients/:phone`
pub async fn get_one(
    State(ctx): State<ApiContext>,
    Path(phone): Path<String>,
) -> Result<Json<Patient>, ApiError> {
    let conn = ctx.core.open_db()?;
    let patient = repository::get_patient(&conn, &phone)?
        .ok_or_else(|| ApiError::NotFound(format!("patient {phone} not found")))?;
    Ok(Json(patient))
}
