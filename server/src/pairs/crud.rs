use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::db::models::Pair;
use crate::error::{api_error, store_error, ApiError};
use crate::state::AppState;
use crate::store::{self, pairs};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePairRequest {
    #[serde(default)]
    pub partner_code: String,
}

/// POST /api/v1/pairs
/// Pair the caller with the owner of `partner_code`. Both members are told
/// over their live connection, if they have one.
pub async fn create_pair(
    State(state): State<AppState>,
    claims: Claims,
    body: Result<Json<CreatePairRequest>, JsonRejection>,
) -> Result<Json<Pair>, ApiError> {
    let Json(req) = body.map_err(|_| api_error(StatusCode::BAD_REQUEST, "Invalid request body"))?;

    let code = req.partner_code.trim().to_string();
    if code.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "partner_code is required"));
    }
    if code.chars().count() != 6 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "partner_code must be 6 characters",
        ));
    }

    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let pair = store::blocking(move || pairs::create_pair(&db, &user_id, &code))
        .await
        .map_err(|e| {
            tracing::warn!(user_id = %claims.sub, error = %e, "Failed to create pair");
            store_error(e)
        })?;

    tracing::info!(user_id = %claims.sub, pair_id = %pair.id, "Pair created");
    state.registry.notifier().pair_created(pair.clone());

    Ok(Json(pair))
}

/// DELETE /api/v1/pairs/{pair_id}
/// Dissolve a pair the caller belongs to.
pub async fn delete_pair(
    State(state): State<AppState>,
    claims: Claims,
    Path(pair_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let db = state.db.clone();
    let user_id = claims.sub.clone();
    let pid = pair_id.clone();
    let pair = store::blocking(move || pairs::delete_pair(&db, &pid, &user_id))
        .await
        .map_err(|e| {
            tracing::warn!(user_id = %claims.sub, pair_id = %pair_id, error = %e, "Failed to delete pair");
            store_error(e)
        })?;

    tracing::info!(user_id = %claims.sub, pair_id = %pair.id, "Pair deleted");
    state.registry.notifier().pair_deleted(pair);

    Ok(StatusCode::NO_CONTENT)
}
