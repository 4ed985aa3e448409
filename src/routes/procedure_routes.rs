// src/routes/procedure_routes.rs

use axum::{Json, Router, extract::State, routing::get};

use crate::{
    error::ApiError,
    middleware::auth_context::ClinicContext,
    models::{AppState, ProcedureRow},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/procedures", get(list_procedures))
}

/// Read-only reference data for scheduling and the day optimizer.
pub async fn list_procedures(
    State(state): State<AppState>,
    _ctx: ClinicContext,
) -> Result<Json<Vec<ProcedureRow>>, ApiError> {
    let rows: Vec<ProcedureRow> = sqlx::query_as::<_, ProcedureRow>(
        r#"
        SELECT
          procedure_id,
          code,
          name,
          category,
          default_duration_mins,
          base_value,
          priority_weight,
          created_at,
          updated_at
        FROM procedure
        ORDER BY code ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(ApiError::db)?;

    Ok(Json(rows))
}
