use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::slots::WeekHours;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub offer_ttl_hours: i64,
    pub default_slot_mins: i64,
}

/* -------------------------
   Status enums
--------------------------*/

/// Stored as smallint. API representation is the upper-case string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum AppointmentStatus {
    Booked = 0,
    Cancelled = 1,
    OfferingMove = 2,
    Completed = 3,
    NoShow = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum MoveOfferStatus {
    Pending = 0,
    Accepted = 1,
    Declined = 2,
    Expired = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum IncentiveType {
    Discount = 0,
    PrioritySlot = 1,
    Gift = 2,
}

impl AppointmentStatus {
    /// Lifecycle rules: transitions are one-way except the offer round trip
    /// BOOKED -> OFFERING_MOVE -> BOOKED (declined) or -> CANCELLED (accepted).
    /// CANCELLED, COMPLETED and NO_SHOW are terminal.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        if self == next {
            // no-op update
            return true;
        }
        match self {
            Booked => matches!(next, OfferingMove | Cancelled | Completed | NoShow),
            OfferingMove => matches!(next, Booked | Cancelled),
            Cancelled | Completed | NoShow => false,
        }
    }
}

/* -------------------------
   Structured configuration
--------------------------*/

/// Clinic `settings` JSONB, with named fields instead of a free-form map.
/// Unknown keys survive round trips in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicSettings {
    #[serde(default)]
    pub operating_hours: WeekHours,
    /// Overrides the server-wide default slot granularity when set.
    pub slot_duration_mins: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Patient `risk_profile` JSONB.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskProfile {
    pub pain_tolerance: Option<String>,
    pub anxiety_level: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, FromRow)]
pub struct ClinicRow {
    pub clinic_id: Uuid,
    pub name: String,
    /// IANA timezone string, e.g. "Australia/Sydney".
    pub timezone: String,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClinicRow {
    /// Malformed stored settings fall back to defaults rather than failing
    /// every scheduling request.
    pub fn parsed_settings(&self) -> ClinicSettings {
        serde_json::from_value(self.settings.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DentistRow {
    pub dentist_id: Uuid,
    pub clinic_id: Uuid,
    pub name: String,
    pub specializations: Vec<String>,
    /// Weekly availability; overrides clinic hours on days where present.
    pub schedule: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DentistRow {
    pub fn parsed_schedule(&self) -> WeekHours {
        serde_json::from_value(self.schedule.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProcedureRow {
    pub procedure_id: Uuid,
    pub code: String,
    pub name: String,
    pub category: String,
    pub default_duration_mins: i32,
    pub base_value: f64,
    pub priority_weight: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AppointmentRow {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub dentist_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_mins: i32,
    // Snapshot of the procedure at booking time; never re-joined, so catalog
    // edits do not rewrite history.
    pub procedure_code: String,
    pub procedure_name: String,
    pub estimated_value: f64,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentRow {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_mins as i64)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MoveOfferRow {
    pub move_offer_id: Uuid,
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

#[derive(Debug, Clone, FromRow)]
pub struct PatientRow {
    pub patient_id: Uuid,
    /// E.164, unique.
    pub phone: String,
    pub name: String,
    pub email: Option<String>,
    pub risk_profile: serde_json::Value,
    pub ltv_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
