use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::auth::jwt;
use crate::error::{api_error, ApiError};
use crate::state::AppState;
use crate::store::{self, users};

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserResponse {
    pub id: String,
    /// Short code a partner enters to pair with this user
    pub code: String,
    /// Bearer token; returned only here
    pub token: String,
    pub created_at: String,
}

/// POST /api/v1/users
/// Create an anonymous user and issue its long-lived access token.
pub async fn create_user(
    State(state): State<AppState>,
) -> Result<Json<CreateUserResponse>, ApiError> {
    let db = state.db.clone();
    let user = store::blocking(move || users::create_user(&db))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create user");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user")
        })?;

    let token = jwt::issue_access_token(&state.jwt_secret, &user.id).map_err(|e| {
        tracing::error!(user_id = %user.id, error = %e, "Failed to issue token");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user")
    })?;

    tracing::info!(user_id = %user.id, code = %user.code, "User created");

    Ok(Json(CreateUserResponse {
        id: user.id,
        code: user.code,
        token,
        created_at: user.created_at,
    }))
}
