use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use uuid::Uuid;

use crate::auth::hash_api_key;
use crate::error::ApiError;
use crate::models::AppState;

/// The clinic behind the presented API key. This is the whole of the auth
/// boundary: a valid key identifies a clinic, nothing finer-grained.
#[derive(Debug, Clone)]
pub struct ClinicContext {
    pub clinic_id: Uuid,
}

#[derive(Debug, sqlx::FromRow)]
struct ClinicLookupRow {
    clinic_id: Uuid,
}

impl FromRequestParts<AppState> for ClinicContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            // Extract Authorization: Bearer <clinic api key>
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::invalid_api_key())?;

            let key_hash = hash_api_key(authz.token());

            let row: ClinicLookupRow = sqlx::query_as::<_, ClinicLookupRow>(
                r#"
                SELECT clinic_id
                FROM clinic
                WHERE api_key_hash = $1
                "#,
            )
            .bind(&key_hash)
            .fetch_optional(&state.db)
            .await
            .map_err(ApiError::db)?
            .ok_or_else(ApiError::invalid_api_key)?;

            Ok(ClinicContext {
                clinic_id: row.clinic_id,
            })
        }
    }
}
