// src/routes/patient_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::ClinicContext,
    models::{AppState, PatientRow, RiskProfile},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patients", post(create_patient))
        .route("/patients/lookup", get(lookup_patient))
        .route("/patients/{patient_id}", get(get_patient).patch(update_patient))
}

#[derive(Debug, Serialize)]
pub struct PatientDto {
    pub id: Uuid,
    pub phone: String,
    pub name: String,
    pub email: Option<String>,
    pub risk_profile: RiskProfile,
    pub ltv_score: f64,
    pub created_at: DateTime<Utc>,
}

impl From<PatientRow> for PatientDto {
    fn from(row: PatientRow) -> Self {
        let risk_profile = serde_json::from_value(row.risk_profile).unwrap_or_default();
        PatientDto {
            id: row.patient_id,
            phone: row.phone,
            name: row.name,
            email: row.email,
            risk_profile,
            ltv_score: row.ltv_score,
            created_at: row.created_at,
        }
    }
}

const PATIENT_COLUMNS: &str =
    r#"patient_id, phone, name, email, risk_profile, ltv_score, created_at, updated_at"#;

/// E.164: leading '+', then 8-15 digits, first digit non-zero.
fn validate_phone(phone: &str) -> Result<&str, ApiError> {
    let phone = phone.trim();
    let digits = phone.strip_prefix('+').unwrap_or("");
    let valid = (8..=15).contains(&digits.len())
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0');
    if valid {
        Ok(phone)
    } else {
        Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "phone must be E.164 (e.g. +61412345678)".into(),
        ))
    }
}

fn validate_ltv(ltv: f64) -> Result<f64, ApiError> {
    if ltv.is_finite() && ltv >= 0.0 {
        Ok(ltv)
    } else {
        Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "ltv_score must be non-negative".into(),
        ))
    }
}

fn validate_email(email: &str) -> Result<&str, ApiError> {
    let email = email.trim();
    let well_formed = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if well_formed {
        Ok(email)
    } else {
        Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "email is not valid".into(),
        ))
    }
}

/* ============================================================
   POST /patients
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreatePatientRequest {
    pub phone: String,
    pub name: String,
    pub email: Option<String>,
    pub risk_profile: Option<RiskProfile>,
    pub ltv_score: Option<f64>,
}

pub async fn create_patient(
    State(state): State<AppState>,
    _ctx: ClinicContext,
    Json(req): Json<CreatePatientRequest>,
) -> Result<(StatusCode, Json<PatientDto>), ApiError> {
    let phone = validate_phone(&req.phone)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "name is required".into(),
        ));
    }
    let email = req.email.as_deref().map(validate_email).transpose()?;
    let ltv_score = validate_ltv(req.ltv_score.unwrap_or(0.0))?;
    let risk_profile = serde_json::to_value(req.risk_profile.unwrap_or_default())
        .map_err(|e| ApiError::Internal(format!("risk_profile encode error: {e}")))?;

    let row: PatientRow = sqlx::query_as::<_, PatientRow>(&format!(
        r#"
        INSERT INTO patient (phone, name, email, risk_profile, ltv_score)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {PATIENT_COLUMNS}
        "#
    ))
    .bind(phone)
    .bind(name)
    .bind(email)
    .bind(&risk_profile)
    .bind(ltv_score)
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if let Some(db) = e.as_database_error() {
            if db.code().as_deref() == Some("23505") {
                return ApiError::Conflict(
                    "DUPLICATE_PHONE",
                    "a patient with this phone number already exists".into(),
                );
            }
        }
        ApiError::db(e)
    })?;

    Ok((StatusCode::CREATED, Json(row.into())))
}

/* ============================================================
   GET /patients/lookup?phone=
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub phone: String,
}

pub async fn lookup_patient(
    State(state): State<AppState>,
    _ctx: ClinicContext,
    Query(q): Query<LookupQuery>,
) -> Result<Json<PatientDto>, ApiError> {
    let phone = validate_phone(&q.phone)?;

    let row: PatientRow = sqlx::query_as::<_, PatientRow>(&format!(
        r#"SELECT {PATIENT_COLUMNS} FROM patient WHERE phone = $1"#
    ))
    .bind(phone)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("patient"))?;

    Ok(Json(row.into()))
}

/* ============================================================
   GET /patients/{id}
   ============================================================ */

pub async fn get_patient(
    State(state): State<AppState>,
    _ctx: ClinicContext,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<PatientDto>, ApiError> {
    let row: PatientRow = sqlx::query_as::<_, PatientRow>(&format!(
        r#"SELECT {PATIENT_COLUMNS} FROM patient WHERE patient_id = $1"#
    ))
    .bind(patient_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("patient"))?;

    Ok(Json(row.into()))
}

/* ============================================================
   PATCH /patients/{id}
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdatePatientRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub risk_profile: Option<RiskProfile>,
    pub ltv_score: Option<f64>,
}

pub async fn update_patient(
    State(state): State<AppState>,
    _ctx: ClinicContext,
    Path(patient_id): Path<Uuid>,
    Json(req): Json<UpdatePatientRequest>,
) -> Result<Json<PatientDto>, ApiError> {
    if let Some(name) = req.name.as_deref() {
        if name.trim().is_empty() {
            return Err(ApiError::BadRequest(
                "VALIDATION_ERROR",
                "name must not be empty".into(),
            ));
        }
    }
    let email = req.email.as_deref().map(validate_email).transpose()?;
    let ltv_score = req.ltv_score.map(validate_ltv).transpose()?;
    let risk_profile = req
        .risk_profile
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| ApiError::Internal(format!("risk_profile encode error: {e}")))?;

    let row: PatientRow = sqlx::query_as::<_, PatientRow>(&format!(
        r#"
        UPDATE patient
        SET name         = COALESCE($2, name),
            email        = COALESCE($3, email),
            risk_profile = COALESCE($4, risk_profile),
            ltv_score    = COALESCE($5, ltv_score),
            updated_at   = now()
        WHERE patient_id = $1
        RETURNING {PATIENT_COLUMNS}
        "#
    ))
    .bind(patient_id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(email)
    .bind(risk_profile)
    .bind(ltv_score)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("patient"))?;

    Ok(Json(row.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_validation_is_e164() {
        assert!(validate_phone("+61412345678").is_ok());
        assert!(validate_phone(" +14155552671 ").is_ok());
        assert!(validate_phone("0412345678").is_err()); // no plus
        assert!(validate_phone("+0412345678").is_err()); // leading zero
        assert!(validate_phone("+61 412 345 678").is_err()); // spaces
        assert!(validate_phone("+123").is_err()); // too short
    }

    #[test]
    fn ltv_must_be_non_negative_and_finite() {
        assert!(validate_ltv(0.0).is_ok());
        assert!(validate_ltv(2500.5).is_ok());
        assert!(validate_ltv(-1.0).is_err());
        assert!(validate_ltv(f64::NAN).is_err());
    }

    #[test]
    fn email_needs_local_part_and_dotted_domain() {
        assert!(validate_email("jo@example.com").is_ok());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("jo@localhost").is_err());
        assert!(validate_email("not-an-email").is_err());
    }
}
