// src/test_support.rs
//
// Shared seeding for the database-backed tests. Each #[sqlx::test] database
// starts empty; apply the schema, then insert one clinic (UTC, so wall-clock
// arithmetic in assertions stays simple) with a dentist, a patient, and one
// catalog procedure.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::AppState;

pub struct Seed {
    pub clinic_id: Uuid,
    pub dentist_id: Uuid,
    pub patient_id: Uuid,
    pub procedure_code: String,
}

pub async fn state(pool: PgPool) -> AppState {
    sqlx::raw_sql(include_str!("../schema.sql"))
        .execute(&pool)
        .await
        .expect("schema applies");
    AppState {
        db: pool,
        offer_ttl_hours: 24,
        default_slot_mins: 30,
    }
}

pub async fn seed(db: &PgPool) -> Seed {
    let clinic_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO clinic (name, timezone, api_key_hash)
        VALUES ('Test Clinic', 'UTC', $1)
        RETURNING clinic_id
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .fetch_one(db)
    .await
    .expect("clinic row");

    let dentist_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO dentist (clinic_id, name)
        VALUES ($1, 'Dr. Test')
        RETURNING dentist_id
        "#,
    )
    .bind(clinic_id)
    .fetch_one(db)
    .await
    .expect("dentist row");

    let patient_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO patient (phone, name, ltv_score)
        VALUES ('+14155550100', 'Pat Test', 0)
        RETURNING patient_id
        "#,
    )
    .fetch_one(db)
    .await
    .expect("patient row");

    sqlx::query(
        r#"
        INSERT INTO procedure (code, name, category, default_duration_mins, base_value)
        VALUES ('D0120', 'Periodic exam', 'diagnostic', 30, 150)
        "#,
    )
    .execute(db)
    .await
    .expect("procedure row");

    Seed {
        clinic_id,
        dentist_id,
        patient_id,
        procedure_code: "D0120".into(),
    }
}

pub async fn insert_appointment(
    db: &PgPool,
    seed: &Seed,
    start_time: DateTime<Utc>,
    duration_mins: i32,
    status: i16,
) -> sqlx::Result<Uuid> {
    sqlx::query_scalar(
        r#"
        INSERT INTO appointment (patient_id, clinic_id, dentist_id, start_time, duration_mins,
                                 procedure_code, procedure_name, estimated_value, status)
        VALUES ($1, $2, $3, $4, $5, 'D0120', 'Periodic exam', 150, $6)
        RETURNING appointment_id
        "#,
    )
    .bind(seed.patient_id)
    .bind(seed.clinic_id)
    .bind(seed.dentist_id)
    .bind(start_time)
    .bind(duration_mins)
    .bind(status)
    .fetch_one(db)
    .await
}

/// The first Mon-Fri strictly after today, at the given UTC hour. Always in
/// the future, and inside the 9-17 standard operating day for hours 9..17.
pub fn next_weekday_at(hour: u32) -> DateTime<Utc> {
    let mut day = (Utc::now() + Duration::days(1)).date_naive();
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day = day.succ_opt().expect("date in range");
    }
    Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).expect("valid time"))
}
