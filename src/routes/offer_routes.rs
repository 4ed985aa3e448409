// src/routes/offer_routes.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::auth_context::ClinicContext,
    models::{AppState, IncentiveType, MoveOfferRow, MoveOfferStatus},
    routes::appointment_routes::fetch_appointment,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/offers", post(create_offer))
        .route("/offers/{offer_id}/respond", post(respond_to_offer))
        .route("/offers/sweep", post(sweep_expired_offers))
        .route("/offers/pending", get(list_pending_offers))
        .route("/offers/expired", get(list_expired_offers))
}

/* ============================================================
   DTOs
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct ApiOk<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct MoveOfferDto {
    pub id: Uuid,
    pub original_appointment_id: Uuid,
    pub target_appointment_id: Option<Uuid>,
    pub incentive_type: IncentiveType,
    pub incentive_description: String,
    pub move_score: i32,
    pub status: MoveOfferStatus,
    pub offered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl From<MoveOfferRow> for MoveOfferDto {
    fn from(row: MoveOfferRow) -> Self {
        MoveOfferDto {
            id: row.move_offer_id,
            original_appointment_id: row.original_appointment_id,
            target_appointment_id: row.target_appointment_id,
            incentive_type: row.incentive_type,
            incentive_description: row.incentive_description,
            move_score: row.move_score,
            status: row.status,
            offered_at: row.offered_at,
            expires_at: row.expires_at,
            responded_at: row.responded_at,
        }
    }
}

const OFFER_COLUMNS: &str = r#"move_offer_id, original_appointment_id, target_appointment_id,
incentive_type, incentive_description, move_score, status, offered_at, expires_at, responded_at"#;

/* ============================================================
   POST /offers
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateOfferRequest {
    pub appointment_id: Uuid,
    pub incentive_type: IncentiveType,
    pub incentive_description: String,
    pub move_score: i32,
}

pub async fn create_offer(
    State(state): State<AppState>,
    _ctx: ClinicContext,
    Json(req): Json<CreateOfferRequest>,
) -> Result<(StatusCode, Json<ApiOk<MoveOfferDto>>), ApiError> {
    if !(0..=100).contains(&req.move_score) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "move_score must be between 0 and 100".into(),
        ));
    }
    let description = req.incentive_description.trim();
    if description.is_empty() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "incentive_description is required".into(),
        ));
    }

    // The original appointment must exist; marking it OFFERING_MOVE is the
    // caller's decision, not ours.
    let appointment = fetch_appointment(&state, req.appointment_id).await?;

    let offered_at = Utc::now();
    let expires_at = offered_at + Duration::hours(state.offer_ttl_hours);

    let row: MoveOfferRow = sqlx::query_as::<_, MoveOfferRow>(&format!(
        r#"
        INSERT INTO move_offer (
          original_appointment_id, incentive_type, incentive_description,
          move_score, status, offered_at, expires_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {OFFER_COLUMNS}
        "#
    ))
    .bind(appointment.appointment_id)
    .bind(req.incentive_type as i16)
    .bind(description)
    .bind(req.move_score)
    .bind(MoveOfferStatus::Pending as i16)
    .bind(offered_at)
    .bind(expires_at)
    .fetch_one(&state.db)
    .await
    .map_err(ApiError::db)?;

    tracing::info!(
        offer_id = %row.move_offer_id,
        appointment_id = %row.original_appointment_id,
        expires_at = %row.expires_at,
        "move offer created"
    );

    Ok((StatusCode::CREATED, Json(ApiOk { data: row.into() })))
}

/* ============================================================
   POST /offers/{id}/respond
   ============================================================ */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferDecision {
    Accepted,
    Declined,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub decision: OfferDecision,
    /// The replacement appointment, linked only on acceptance.
    pub target_appointment_id: Option<Uuid>,
}

pub async fn respond_to_offer(
    State(state): State<AppState>,
    _ctx: ClinicContext,
    Path(offer_id): Path<Uuid>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<ApiOk<MoveOfferDto>>, ApiError> {
    let next_status = match req.decision {
        OfferDecision::Accepted => MoveOfferStatus::Accepted,
        OfferDecision::Declined => MoveOfferStatus::Declined,
    };
    if req.decision == OfferDecision::Declined && req.target_appointment_id.is_some() {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "target_appointment_id only applies to an accepted offer".into(),
        ));
    }

    // Overdue PENDING offers must be swept before they are treated as
    // actionable; do it lazily for this row so the caller sees InvalidState,
    // not a successful response to a dead offer.
    sqlx::query(
        r#"
        UPDATE move_offer
        SET status = $2, responded_at = now()
        WHERE move_offer_id = $1 AND status = $3 AND expires_at < now()
        "#,
    )
    .bind(offer_id)
    .bind(MoveOfferStatus::Expired as i16)
    .bind(MoveOfferStatus::Pending as i16)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;

    // Single conditional update: only a live PENDING offer can transition,
    // so a respond racing a concurrent sweep has exactly one winner.
    let row: Option<MoveOfferRow> = sqlx::query_as::<_, MoveOfferRow>(&format!(
        r#"
        UPDATE move_offer
        SET status = $2,
            responded_at = now(),
            target_appointment_id = $3
        WHERE move_offer_id = $1
          AND status = $4
          AND expires_at > now()
        RETURNING {OFFER_COLUMNS}
        "#
    ))
    .bind(offer_id)
    .bind(next_status as i16)
    .bind(req.target_appointment_id)
    .bind(MoveOfferStatus::Pending as i16)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::db)?;

    match row {
        Some(row) => {
            tracing::info!(offer_id = %offer_id, decision = ?req.decision, "move offer resolved");
            Ok(Json(ApiOk { data: row.into() }))
        }
        None => {
            // Distinguish a missing offer from one already terminal.
            let exists: Option<Uuid> =
                sqlx::query_scalar(r#"SELECT move_offer_id FROM move_offer WHERE move_offer_id = $1"#)
                    .bind(offer_id)
                    .fetch_optional(&state.db)
                    .await
                    .map_err(ApiError::db)?;
            match exists {
                Some(_) => Err(ApiError::offer_not_pending()),
                None => Err(ApiError::not_found("move offer")),
            }
        }
    }
}

/* ============================================================
   POST /offers/sweep
   ============================================================ */

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub expired_count: i64,
}

/// Expire every overdue PENDING offer. One statement, one transaction:
/// re-running after a partial failure starts from scratch, and a quiet run
/// reports zero and changes nothing.
pub async fn sweep_expired_offers(
    State(state): State<AppState>,
    _ctx: ClinicContext,
) -> Result<Json<ApiOk<SweepResponse>>, ApiError> {
    let expired_count = sweep_expired(&state).await?;
    if expired_count > 0 {
        tracing::info!(expired_count, "move offer sweep expired offers");
    }
    Ok(Json(ApiOk {
        data: SweepResponse { expired_count },
    }))
}

pub(crate) async fn sweep_expired(state: &AppState) -> Result<i64, ApiError> {
    let result = sqlx::query(
        r#"
        UPDATE move_offer
        SET status = $1, responded_at = now()
        WHERE status = $2 AND expires_at < now()
        "#,
    )
    .bind(MoveOfferStatus::Expired as i16)
    .bind(MoveOfferStatus::Pending as i16)
    .execute(&state.db)
    .await
    .map_err(ApiError::db)?;
    Ok(result.rows_affected() as i64)
}

/* ============================================================
   GET /offers/pending, GET /offers/expired
   ============================================================ */

pub async fn list_pending_offers(
    State(state): State<AppState>,
    _ctx: ClinicContext,
) -> Result<Json<ApiOk<Vec<MoveOfferDto>>>, ApiError> {
    // Lazy sweep so the pending list never shows overdue offers.
    sweep_expired(&state).await?;
    list_by_status(&state, MoveOfferStatus::Pending).await
}

pub async fn list_expired_offers(
    State(state): State<AppState>,
    _ctx: ClinicContext,
) -> Result<Json<ApiOk<Vec<MoveOfferDto>>>, ApiError> {
    list_by_status(&state, MoveOfferStatus::Expired).await
}

async fn list_by_status(
    state: &AppState,
    status: MoveOfferStatus,
) -> Result<Json<ApiOk<Vec<MoveOfferDto>>>, ApiError> {
    // Soonest-expiring first, for operator triage.
    let rows: Vec<MoveOfferRow> = sqlx::query_as::<_, MoveOfferRow>(&format!(
        r#"
        SELECT {OFFER_COLUMNS}
        FROM move_offer
        WHERE status = $1
        ORDER BY expires_at ASC
        "#
    ))
    .bind(status as i16)
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(ApiOk {
        data: rows.into_iter().map(MoveOfferDto::from).collect(),
    }))
}
