// src/routes/clinic_routes.rs

use axum::{
    extract::State,
    routing::{get, patch},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::ClinicContext,
    models::{AppState, ClinicRow, ClinicSettings},
    routes::appointment_routes::fetch_clinic,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/clinic", get(get_clinic))
        .route("/clinic", patch(update_clinic))
}

#[derive(Debug, Serialize)]
pub struct ClinicDto {
    pub id: Uuid,
    pub name: String,
    pub timezone: String,
    pub settings: ClinicSettings,
}

impl From<ClinicRow> for ClinicDto {
    fn from(row: ClinicRow) -> Self {
        let settings = row.parsed_settings();
        ClinicDto {
            id: row.clinic_id,
            name: row.name,
            timezone: row.timezone,
            settings,
        }
    }
}

/// The caller's own clinic, resolved from the API key.
pub async fn get_clinic(
    State(state): State<AppState>,
    ctx: ClinicContext,
) -> Result<Json<ClinicDto>, ApiError> {
    let row = fetch_clinic(&state, ctx.clinic_id).await?;
    Ok(Json(row.into()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateClinicRequest {
    pub name: Option<String>,
    pub timezone: Option<String>,
    pub settings: Option<ClinicSettings>,
}

pub async fn update_clinic(
    State(state): State<AppState>,
    ctx: ClinicContext,
    Json(req): Json<UpdateClinicRequest>,
) -> Result<Json<ClinicDto>, ApiError> {
    if let Some(name) = req.name.as_deref() {
        let name = name.trim();
        if name.is_empty() || name.len() > 128 {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "name must be 1-128 characters".into(),
            ));
        }
    }
    if let Some(tz) = req.timezone.as_deref() {
        if tz.parse::<chrono_tz::Tz>().is_err() {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "timezone must be a valid IANA timezone".into(),
            ));
        }
    }
    let settings = req
        .settings
        .map(|s| serde_json::to_value(s))
        .transpose()
        .map_err(|e| ApiError::Internal(format!("settings encode error: {e}")))?;

    let row: ClinicRow = sqlx::query_as::<_, ClinicRow>(
        r#"
        UPDATE clinic
        SET name       = COALESCE($2, name),
            timezone   = COALESCE($3, timezone),
            settings   = COALESCE($4, settings),
            updated_at = now()
        WHERE clinic_id = $1
        RETURNING clinic_id, name, timezone, settings, created_at, updated_at
        "#,
    )
    .bind(ctx.clinic_id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.timezone.as_deref().map(str::trim))
    .bind(settings)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("clinic"))?;

    Ok(Json(row.into()))
}
