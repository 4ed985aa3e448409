// src/routes/appointment_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::ClinicContext,
    models::{AppState, AppointmentRow, AppointmentStatus, ClinicRow, DentistRow, ProcedureRow},
    slots::{self, BusyInterval},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments/available", get(get_available_slots))
        .route("/appointments", post(create_appointment))
        .route("/appointments/{appointment_id}", get(get_appointment))
        .route("/appointments/{appointment_id}", put(update_appointment))
        .route("/appointments/{appointment_id}", delete(cancel_appointment))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct SlotDto {
    /// Opaque, round-trippable: "<dentist_id>@<rfc3339 start>".
    pub id: String,
    pub dentist_id: Uuid,
    pub dentist_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentDto {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub dentist_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_mins: i32,
    pub procedure_code: String,
    pub procedure_name: String,
    pub estimated_value: f64,
    pub status: AppointmentStatus,
}

impl From<AppointmentRow> for AppointmentDto {
    fn from(row: AppointmentRow) -> Self {
        let end_time = row.end_time();
        AppointmentDto {
            id: row.appointment_id,
            patient_id: row.patient_id,
            clinic_id: row.clinic_id,
            dentist_id: row.dentist_id,
            start_time: row.start_time,
            end_time,
            duration_mins: row.duration_mins,
            procedure_code: row.procedure_code,
            procedure_name: row.procedure_name,
            estimated_value: row.estimated_value,
            status: row.status,
        }
    }
}

/* ============================================================
   Shared lookups and validation
   ============================================================ */

const MAX_WINDOW_DAYS: i64 = 31;

fn parse_window(start: &str, end: &str) -> Result<(DateTime<Utc>, DateTime<Utc>), ApiError> {
    let parse = |raw: &str, field: &str| {
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| {
                ApiError::BadRequest(
                    "VALIDATION_ERROR",
                    format!("{field} must be an RFC 3339 datetime"),
                )
            })
    };
    let start = parse(start, "start")?;
    let end = parse(end, "end")?;
    if end <= start {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "end must be after start".into(),
        ));
    }
    if end - start > Duration::days(MAX_WINDOW_DAYS) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            format!("window must be at most {MAX_WINDOW_DAYS} days"),
        ));
    }
    Ok((start, end))
}

pub(crate) async fn fetch_clinic(state: &AppState, clinic_id: Uuid) -> Result<ClinicRow, ApiError> {
    sqlx::query_as::<_, ClinicRow>(
        r#"
        SELECT clinic_id, name, timezone, settings, created_at, updated_at
        FROM clinic
        WHERE clinic_id = $1
        "#,
    )
    .bind(clinic_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("clinic"))
}

pub(crate) async fn fetch_appointment(
    state: &AppState,
    appointment_id: Uuid,
) -> Result<AppointmentRow, ApiError> {
    sqlx::query_as::<_, AppointmentRow>(
        r#"
        SELECT appointment_id, patient_id, clinic_id, dentist_id, start_time,
               duration_mins, procedure_code, procedure_name, estimated_value,
               status, notes, created_at, updated_at
        FROM appointment
        WHERE appointment_id = $1
        "#,
    )
    .bind(appointment_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("appointment"))
}

pub(crate) fn clinic_tz(clinic: &ClinicRow) -> Result<chrono_tz::Tz, ApiError> {
    clinic
        .timezone
        .parse::<chrono_tz::Tz>()
        .map_err(|_| ApiError::Internal(format!("clinic has invalid timezone '{}'", clinic.timezone)))
}

/// The exclusion constraint on appointment intervals fires as an expected
/// outcome when two bookings race; surface it as a 409, not a 500.
fn map_booking_db_error(e: sqlx::Error) -> ApiError {
    if let Some(db) = e.as_database_error() {
        if let Some(code) = db.code() {
            // 23P01 exclusion_violation, 23505 unique_violation
            if code == "23P01" || code == "23505" {
                return ApiError::slot_taken();
            }
        }
    }
    ApiError::db(e)
}

/* ============================================================
   GET /appointments/available
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct AvailableQuery {
    pub clinic_id: Uuid,
    /// RFC 3339.
    pub start: String,
    pub end: String,
    pub procedure_code: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct BusyRow {
    dentist_id: Uuid,
    start_time: DateTime<Utc>,
    duration_mins: i32,
}

pub async fn get_available_slots(
    State(state): State<AppState>,
    _ctx: ClinicContext,
    Query(q): Query<AvailableQuery>,
) -> Result<Json<ApiOk<Vec<SlotDto>>>, ApiError> {
    let (window_start, window_end) = parse_window(&q.start, &q.end)?;

    let clinic = fetch_clinic(&state, q.clinic_id).await?;
    let tz = clinic_tz(&clinic)?;
    let settings = clinic.parsed_settings();

    let dentists: Vec<DentistRow> = sqlx::query_as::<_, DentistRow>(
        r#"
        SELECT dentist_id, clinic_id, name, specializations, schedule,
               is_active, created_at, updated_at
        FROM dentist
        WHERE clinic_id = $1 AND is_active = true
        ORDER BY dentist_id
        "#,
    )
    .bind(clinic.clinic_id)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    if dentists.is_empty() {
        return Ok(Json(ApiOk { data: vec![] }));
    }

    // Stride: catalog duration when the code resolves, otherwise the clinic
    // or server default granularity.
    let stride_mins = match q.procedure_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => {
            let duration: Option<i32> = sqlx::query_scalar(
                r#"SELECT default_duration_mins FROM procedure WHERE code = $1"#,
            )
            .bind(code)
            .fetch_optional(&state.db)
            .await
            .map_err(ApiError::db)?;
            duration.map(|d| d as i64).unwrap_or(state.default_slot_mins)
        }
        None => settings.slot_duration_mins.unwrap_or(state.default_slot_mins),
    };

    // Non-cancelled appointments starting inside the window, grouped per
    // dentist for the overlap test.
    let busy_rows: Vec<BusyRow> = sqlx::query_as::<_, BusyRow>(
        r#"
        SELECT dentist_id, start_time, duration_mins
        FROM appointment
        WHERE clinic_id = $1
          AND status <> $2
          AND start_time >= $3
          AND start_time <= $4
        "#,
    )
    .bind(clinic.clinic_id)
    .bind(AppointmentStatus::Cancelled as i16)
    .bind(window_start)
    .bind(window_end)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    let mut busy_by_dentist: HashMap<Uuid, Vec<BusyInterval>> = HashMap::new();
    for row in busy_rows {
        busy_by_dentist.entry(row.dentist_id).or_default().push(BusyInterval {
            start: row.start_time,
            end: row.start_time + Duration::minutes(row.duration_mins as i64),
        });
    }

    let now = Utc::now();
    let first_day = window_start.with_timezone(&tz).date_naive();
    let last_day = window_end.with_timezone(&tz).date_naive();

    let mut out: Vec<SlotDto> = Vec::new();
    for dentist in &dentists {
        let schedule = dentist.parsed_schedule();
        let busy = busy_by_dentist
            .get(&dentist.dentist_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let mut day = first_day;
        while day <= last_day {
            if let Some(hours) =
                slots::resolve_day_hours(&settings.operating_hours, &schedule, day.weekday())
            {
                for (start, end) in slots::day_slots(day, hours, stride_mins, tz, busy, now) {
                    if start < window_start || start > window_end {
                        continue;
                    }
                    out.push(SlotDto {
                        id: slots::encode_slot_id(dentist.dentist_id, start),
                        dentist_id: dentist.dentist_id,
                        dentist_name: dentist.name.clone(),
                        start_time: start,
                        end_time: end,
                    });
                }
            }
            day = day.succ_opt().ok_or_else(|| {
                ApiError::BadRequest("VALIDATION_ERROR", "window extends beyond supported dates".into())
            })?;
        }
    }

    out.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then(a.dentist_id.cmp(&b.dentist_id))
    });

    Ok(Json(ApiOk { data: out }))
}

/* ============================================================
   POST /appointments (book a slot)
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    /// Slot id exactly as returned by the availability endpoint.
    pub slot_id: String,
    pub procedure_code: String,
    pub notes: Option<String>,
}

pub async fn create_appointment(
    State(state): State<AppState>,
    _ctx: ClinicContext,
    Json(req): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<ApiOk<AppointmentDto>>), ApiError> {
    let (dentist_id, start_time) = slots::parse_slot_id(&req.slot_id)
        .map_err(|e| ApiError::BadRequest("VALIDATION_ERROR", e.to_string()))?;

    if start_time < Utc::now() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "slot start is in the past".into(),
        ));
    }

    let patient_exists: Option<Uuid> =
        sqlx::query_scalar(r#"SELECT patient_id FROM patient WHERE patient_id = $1"#)
            .bind(req.patient_id)
            .fetch_optional(&state.db)
            .await
            .map_err(ApiError::db)?;
    if patient_exists.is_none() {
        return Err(ApiError::not_found("patient"));
    }

    let dentist: DentistRow = sqlx::query_as::<_, DentistRow>(
        r#"
        SELECT dentist_id, clinic_id, name, specializations, schedule,
               is_active, created_at, updated_at
        FROM dentist
        WHERE dentist_id = $1 AND is_active = true
        "#,
    )
    .bind(dentist_id)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("practitioner"))?;

    let procedure: ProcedureRow = sqlx::query_as::<_, ProcedureRow>(
        r#"
        SELECT procedure_id, code, name, category, default_duration_mins,
               base_value, priority_weight, created_at, updated_at
        FROM procedure
        WHERE code = $1
        "#,
    )
    .bind(req.procedure_code.trim())
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?
    .ok_or_else(|| ApiError::not_found("procedure"))?;

    let end_time = start_time + Duration::minutes(procedure.default_duration_mins as i64);

    // Re-validate the slot inside one transaction: an advisory slot id may
    // have been consumed by a concurrent caller since it was listed.
    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    let conflicting: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT appointment_id
        FROM appointment
        WHERE dentist_id = $1
          AND status <> $2
          AND start_time < $3
          AND start_time + make_interval(mins => duration_mins) > $4
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(dentist.dentist_id)
    .bind(AppointmentStatus::Cancelled as i16)
    .bind(end_time)
    .bind(start_time)
    .fetch_optional(&mut *tx)
    .await
    .map_err(ApiError::db)?;

    if conflicting.is_some() {
        return Err(ApiError::slot_taken());
    }

    // Snapshot name and value from the catalog at booking time.
    let row: AppointmentRow = sqlx::query_as::<_, AppointmentRow>(
        r#"
        INSERT INTO appointment (
          patient_id, clinic_id, dentist_id, start_time, duration_mins,
          procedure_code, procedure_name, estimated_value, status, notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING appointment_id, patient_id, clinic_id, dentist_id, start_time,
                  duration_mins, procedure_code, procedure_name, estimated_value,
                  status, notes, created_at, updated_at
        "#,
    )
    .bind(req.patient_id)
    .bind(dentist.clinic_id)
    .bind(dentist.dentist_id)
    .bind(start_time)
    .bind(procedure.default_duration_mins)
    .bind(&procedure.code)
    .bind(&procedure.name)
    .bind(procedure.base_value)
    .bind(AppointmentStatus::Booked as i16)
    .bind(req.notes.as_deref())
    .fetch_one(&mut *tx)
    .await
    .map_err(map_booking_db_error)?;

    tx.commit().await.map_err(map_booking_db_error)?;

    tracing::info!(
        appointment_id = %row.appointment_id,
        dentist_id = %row.dentist_id,
        start_time = %row.start_time,
        "appointment booked"
    );

    Ok((StatusCode::CREATED, Json(ApiOk { data: row.into() })))
}

/* ============================================================
   GET /appointments/{id}
   ============================================================ */

pub async fn get_appointment(
    State(state): State<AppState>,
    _ctx: ClinicContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let row = fetch_appointment(&state, appointment_id).await?;
    Ok(Json(ApiOk { data: row.into() }))
}

/* ============================================================
   PUT /appointments/{id}
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub status: Option<AppointmentStatus>,
    pub start_time: Option<DateTime<Utc>>,
}

pub async fn update_appointment(
    State(state): State<AppState>,
    _ctx: ClinicContext,
    Path(appointment_id): Path<Uuid>,
    Json(req): Json<UpdateAppointmentRequest>,
) -> Result<Json<ApiOk<AppointmentDto>>, ApiError> {
    let current = fetch_appointment(&state, appointment_id).await?;

    if let Some(next) = req.status {
        if !current.status.can_transition_to(next) {
            return Err(ApiError::BadRequest(
                "INVALID_STATUS_TRANSITION",
                format!("cannot transition {:?} -> {:?}", current.status, next),
            ));
        }
    }

    let mut tx = state.db.begin().await.map_err(ApiError::db)?;

    if let Some(new_start) = req.start_time {
        let new_end = new_start + Duration::minutes(current.duration_mins as i64);
        let conflicting: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT appointment_id
            FROM appointment
            WHERE dentist_id = $1
              AND appointment_id <> $2
              AND status <> $3
              AND start_time < $4
              AND start_time + make_interval(mins => duration_mins) > $5
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(current.dentist_id)
        .bind(current.appointment_id)
        .bind(AppointmentStatus::Cancelled as i16)
        .bind(new_end)
        .bind(new_start)
        .fetch_optional(&mut *tx)
        .await
        .map_err(ApiError::db)?;

        if conflicting.is_some() {
            return Err(ApiError::slot_taken());
        }
    }

    // Guard on the status the transition was validated against: a writer that
    // raced us past the read above matches zero rows instead of overwriting a
    // terminal status.
    let row: Option<AppointmentRow> = sqlx::query_as::<_, AppointmentRow>(
        r#"
        UPDATE appointment
        SET start_time = COALESCE($2, start_time),
            status     = COALESCE($3, status),
            updated_at = now()
        WHERE appointment_id = $1
          AND status = $4
        RETURNING appointment_id, patient_id, clinic_id, dentist_id, start_time,
                  duration_mins, procedure_code, procedure_name, estimated_value,
                  status, notes, created_at, updated_at
        "#,
    )
    .bind(current.appointment_id)
    .bind(req.start_time)
    .bind(req.status.map(|s| s as i16))
    .bind(current.status as i16)
    .fetch_optional(&mut *tx)
    .await
    .map_err(map_booking_db_error)?;

    let row = row.ok_or_else(ApiError::appointment_state_changed)?;

    tx.commit().await.map_err(map_booking_db_error)?;

    Ok(Json(ApiOk { data: row.into() }))
}

/* ============================================================
   DELETE /appointments/{id} (cancel)
   ============================================================ */

pub async fn cancel_appointment(
    State(state): State<AppState>,
    _ctx: ClinicContext,
    Path(appointment_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let current = fetch_appointment(&state, appointment_id).await?;

    match current.status {
        // Cancelling twice is a no-op success; the slot is already free.
        AppointmentStatus::Cancelled => return Ok(StatusCode::NO_CONTENT),
        AppointmentStatus::Completed | AppointmentStatus::NoShow => {
            return Err(ApiError::BadRequest(
                "INVALID_STATUS_TRANSITION",
                format!("cannot cancel a {:?} appointment", current.status),
            ));
        }
        AppointmentStatus::Booked | AppointmentStatus::OfferingMove => {}
    }

    // Same guard as the update path: only cancel the status we validated.
    let result = sqlx::query(
        r#"
        UPDATE appointment
        SET status = $2, updated_at = now()
        WHERE appointment_id = $1 AND status = $3
        "#,
    )
    .bind(appointment_id)
    .bind(AppointmentStatus::Cancelled as i16)
    .bind(current.status as i16)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    if result.rows_affected() == 0 {
        return Err(ApiError::appointment_state_changed());
    }

    tracing::info!(appointment_id = %appointment_id, "appointment cancelled");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_accepts_rfc3339_and_orders_endpoints() {
        let (s, e) =
            parse_window("2025-01-15T00:00:00Z", "2025-01-17T00:00:00+00:00").unwrap();
        assert!(s < e);

        assert!(parse_window("2025-01-17T00:00:00Z", "2025-01-15T00:00:00Z").is_err());
        assert!(parse_window("2025-01-15T00:00:00Z", "2025-01-15T00:00:00Z").is_err());
        assert!(parse_window("next tuesday", "2025-01-17T00:00:00Z").is_err());
    }

    #[test]
    fn window_rejects_oversized_range() {
        assert!(parse_window("2025-01-01T00:00:00Z", "2025-03-15T00:00:00Z").is_err());
        assert!(parse_window("2025-01-01T00:00:00Z", "2025-01-31T00:00:00Z").is_ok());
    }

    // Database-backed coverage below; #[sqlx::test] provisions a throwaway
    // database per test from DATABASE_URL.

    use crate::test_support;

    fn book_request(seed: &test_support::Seed, start: DateTime<Utc>) -> BookAppointmentRequest {
        BookAppointmentRequest {
            patient_id: seed.patient_id,
            slot_id: slots::encode_slot_id(seed.dentist_id, start),
            procedure_code: seed.procedure_code.clone(),
            notes: None,
        }
    }

    async fn listed_slot_ids(
        state: &AppState,
        ctx: &ClinicContext,
        clinic_id: Uuid,
        around: DateTime<Utc>,
    ) -> Vec<String> {
        let Json(res) = get_available_slots(
            State(state.clone()),
            ctx.clone(),
            Query(AvailableQuery {
                clinic_id,
                start: (around - Duration::hours(1)).to_rfc3339(),
                end: (around + Duration::hours(1)).to_rfc3339(),
                procedure_code: None,
            }),
        )
        .await
        .unwrap();
        res.data.into_iter().map(|s| s.id).collect()
    }

    #[sqlx::test]
    async fn double_booking_same_slot_is_rejected(pool: sqlx::PgPool) {
        let state = test_support::state(pool).await;
        let seed = test_support::seed(&state.db).await;
        let ctx = ClinicContext {
            clinic_id: seed.clinic_id,
        };
        let start = test_support::next_weekday_at(10);

        let (status, Json(first)) = create_appointment(
            State(state.clone()),
            ctx.clone(),
            Json(book_request(&seed, start)),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first.data.status, AppointmentStatus::Booked);

        let second = create_appointment(
            State(state.clone()),
            ctx.clone(),
            Json(book_request(&seed, start)),
        )
        .await;
        match second {
            Err(ApiError::Conflict(code, _)) => assert_eq!(code, "SLOT_NOT_AVAILABLE"),
            other => panic!("expected a slot conflict, got {other:?}"),
        }

        // The winner is untouched and remains the only live row.
        let live: i64 = sqlx::query_scalar(
            r#"SELECT count(*) FROM appointment WHERE dentist_id = $1 AND status <> $2"#,
        )
        .bind(seed.dentist_id)
        .bind(AppointmentStatus::Cancelled as i16)
        .fetch_one(&state.db)
        .await
        .unwrap();
        assert_eq!(live, 1);
        let winner = fetch_appointment(&state, first.data.id).await.unwrap();
        assert_eq!(winner.status, AppointmentStatus::Booked);
    }

    #[sqlx::test]
    async fn cancellation_returns_slot_to_availability(pool: sqlx::PgPool) {
        let state = test_support::state(pool).await;
        let seed = test_support::seed(&state.db).await;
        let ctx = ClinicContext {
            clinic_id: seed.clinic_id,
        };
        let start = test_support::next_weekday_at(10);
        let slot_id = slots::encode_slot_id(seed.dentist_id, start);

        let before = listed_slot_ids(&state, &ctx, seed.clinic_id, start).await;
        assert!(before.contains(&slot_id));

        let (_, Json(booked)) = create_appointment(
            State(state.clone()),
            ctx.clone(),
            Json(book_request(&seed, start)),
        )
        .await
        .unwrap();

        let while_booked = listed_slot_ids(&state, &ctx, seed.clinic_id, start).await;
        assert!(!while_booked.contains(&slot_id));

        let status = cancel_appointment(State(state.clone()), ctx.clone(), Path(booked.data.id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let after = listed_slot_ids(&state, &ctx, seed.clinic_id, start).await;
        assert!(after.contains(&slot_id));
    }

    #[sqlx::test]
    async fn overlap_constraint_surfaces_as_slot_conflict(pool: sqlx::PgPool) {
        let state = test_support::state(pool).await;
        let seed = test_support::seed(&state.db).await;
        let start = test_support::next_weekday_at(10);

        test_support::insert_appointment(&state.db, &seed, start, 30, AppointmentStatus::Booked as i16)
            .await
            .unwrap();

        // A straight insert that skips the advisory check still loses at
        // commit; the constraint violation must surface as a 409.
        let err = test_support::insert_appointment(
            &state.db,
            &seed,
            start + Duration::minutes(15),
            30,
            AppointmentStatus::Booked as i16,
        )
        .await
        .unwrap_err();
        match map_booking_db_error(err) {
            ApiError::Conflict(code, _) => assert_eq!(code, "SLOT_NOT_AVAILABLE"),
            other => panic!("expected a slot conflict, got {other:?}"),
        }

        // Cancelled rows are outside the constraint.
        test_support::insert_appointment(
            &state.db,
            &seed,
            start + Duration::minutes(15),
            30,
            AppointmentStatus::Cancelled as i16,
        )
        .await
        .unwrap();
    }

    #[sqlx::test]
    async fn racing_status_updates_have_one_winner(pool: sqlx::PgPool) {
        let state = test_support::state(pool).await;
        let seed = test_support::seed(&state.db).await;
        let ctx = ClinicContext {
            clinic_id: seed.clinic_id,
        };
        let start = test_support::next_weekday_at(10);
        let (_, Json(booked)) = create_appointment(
            State(state.clone()),
            ctx.clone(),
            Json(book_request(&seed, start)),
        )
        .await
        .unwrap();
        let id = booked.data.id;

        let complete = update_appointment(
            State(state.clone()),
            ctx.clone(),
            Path(id),
            Json(UpdateAppointmentRequest {
                status: Some(AppointmentStatus::Completed),
                start_time: None,
            }),
        );
        let cancel = update_appointment(
            State(state.clone()),
            ctx.clone(),
            Path(id),
            Json(UpdateAppointmentRequest {
                status: Some(AppointmentStatus::Cancelled),
                start_time: None,
            }),
        );
        let (a, b) = tokio::join!(complete, cancel);

        // Both validated against BOOKED; the status guard on the write lets
        // exactly one through, never a COMPLETED -> CANCELLED overwrite.
        assert!(
            a.is_ok() != b.is_ok(),
            "exactly one concurrent status change may win: {a:?} / {b:?}"
        );
        let expected = if a.is_ok() {
            AppointmentStatus::Completed
        } else {
            AppointmentStatus::Cancelled
        };
        let row = fetch_appointment(&state, id).await.unwrap();
        assert_eq!(row.status, expected);
    }
}
