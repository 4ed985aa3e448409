// src/routes/heuristic_routes.rs

use axum::{
    extract::State,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    heuristics::{self, BookedSnapshot, CandidateProcedure, MoveSuggestion, Recommendation},
    middleware::auth_context::ClinicContext,
    models::{AppState, AppointmentStatus},
    routes::appointment_routes::{clinic_tz, fetch_clinic},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/heuristics/move-score", post(calculate_move_score))
        .route("/heuristics/optimize-day", post(optimize_day))
}

/* ============================================================
   POST /heuristics/move-score
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct MoveScoreRequest {
    /// Kept as a string so a malformed id is a 400, not a routing miss.
    pub appointment_id: String,
    pub new_procedure_value: f64,
}

#[derive(Debug, Serialize)]
pub struct MoveScoreResponse {
    pub move_score: i32,
    pub recommendation: Recommendation,
    pub incentive_needed: String,
    pub revenue_difference: f64,
}

#[derive(Debug, sqlx::FromRow)]
struct ScoreInputRow {
    start_time: DateTime<Utc>,
    estimated_value: f64,
    ltv_score: f64,
}

pub async fn calculate_move_score(
    State(state): State<AppState>,
    _ctx: ClinicContext,
    Json(req): Json<MoveScoreRequest>,
) -> Result<Json<MoveScoreResponse>, ApiError> {
    let appointment_id = Uuid::parse_str(req.appointment_id.trim()).map_err(|_| {
        ApiError::BadRequest("VALIDATION_ERROR", "appointment_id must be a UUID".into())
    })?;

    let row: ScoreInputRow = sqlx::query_as::<_, ScoreInputRow>(
        r#"
        SELECT a.start_time, a.estimated_value, p.ltv_score
        FROM appointment a
        JOIN patient p ON p.patient_id = a.patient_id
        WHERE a.appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("appointment"))?;

    let days = heuristics::days_until(row.start_time, Utc::now());
    let decision = heuristics::score_move(
        row.estimated_value,
        req.new_procedure_value,
        row.ltv_score,
        days,
    );

    Ok(Json(MoveScoreResponse {
        move_score: decision.score,
        recommendation: decision.recommendation,
        incentive_needed: decision.incentive.to_string(),
        revenue_difference: req.new_procedure_value - row.estimated_value,
    }))
}

/* ============================================================
   POST /heuristics/optimize-day
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct OptimizeDayRequest {
    pub clinic_id: Uuid,
    /// Clinic-local calendar date.
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct OptimizeDayResponse {
    pub suggestions: Vec<MoveSuggestion>,
}

#[derive(Debug, sqlx::FromRow)]
struct DayAppointmentRow {
    appointment_id: Uuid,
    start_time: DateTime<Utc>,
    estimated_value: f64,
    ltv_score: f64,
}

pub async fn optimize_day(
    State(state): State<AppState>,
    _ctx: ClinicContext,
    Json(req): Json<OptimizeDayRequest>,
) -> Result<Json<OptimizeDayResponse>, ApiError> {
    let clinic = fetch_clinic(&state, req.clinic_id).await?;
    let tz = clinic_tz(&clinic)?;

    // The clinic-local day as a UTC interval.
    let day_start = req
        .date
        .and_hms_opt(0, 0, 0)
        .and_then(|t| tz.from_local_datetime(&t).earliest())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| {
            ApiError::BadRequest("VALIDATION_ERROR", "date is out of range".into())
        })?;
    let day_end = day_start + Duration::days(1);

    let rows: Vec<DayAppointmentRow> = sqlx::query_as::<_, DayAppointmentRow>(
        r#"
        SELECT a.appointment_id, a.start_time, a.estimated_value, p.ltv_score
        FROM appointment a
        JOIN patient p ON p.patient_id = a.patient_id
        WHERE a.clinic_id = $1
          AND a.status = $2
          AND a.start_time >= $3
          AND a.start_time < $4
        ORDER BY a.start_time
        "#,
    )
    .bind(clinic.clinic_id)
    .bind(AppointmentStatus::Booked as i16)
    .bind(day_start)
    .bind(day_end)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    if rows.is_empty() {
        return Ok(Json(OptimizeDayResponse { suggestions: vec![] }));
    }

    let catalog: Vec<CandidateProcedure> = sqlx::query_as::<_, (String, String, f64)>(
        r#"SELECT code, name, base_value FROM procedure ORDER BY code"#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?
    .into_iter()
    .map(|(code, name, base_value)| CandidateProcedure { code, name, base_value })
    .collect();

    let appointments: Vec<BookedSnapshot> = rows
        .into_iter()
        .map(|r| BookedSnapshot {
            appointment_id: r.appointment_id,
            estimated_value: r.estimated_value,
            patient_ltv: r.ltv_score,
            start_time: r.start_time,
        })
        .collect();

    let suggestions = heuristics::suggest_moves(&appointments, &catalog, Utc::now());
    Ok(Json(OptimizeDayResponse { suggestions }))
}
